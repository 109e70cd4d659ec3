//! Reference-set normalization.
//!
//! Every version claims backing nodes. A tree reference (or a literal
//! subtree equal to its backing subtree) claims the whole subtree at its
//! target; anything else at a backing key, and every backing ancestor of a
//! claimed node, is *prohibited*: some version materializes it, so no
//! version may keep pointing at it whole. A prohibited node is split, and
//! the claims on it pass to its children. What is left is a partition of
//! the backing tree into prohibited inner nodes and whole-subtree leaves,
//! each leaf tagged with the versions allowed to reference it.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::debug;

use reftree_core::{subtree_mismatch, IdAddressable};
use reftree_types::{Key, KeyMap, Payload, TreeError, TreeResult};

/// References one version may keep.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RefSets {
    /// Backing keys whose whole subtree the version may reference.
    pub tree_refs: HashSet<Key>,
    /// Backing keys whose content the version may borrow.
    pub node_refs: HashSet<Key>,
}

/// Result of [`normalize`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Normalized {
    /// One entry per input tree, in input order.
    pub sets: Vec<RefSets>,
    /// Front keys of literal nodes that no reference can stand for, in any
    /// of the trees.
    pub expanded: HashSet<Key>,
}

impl Normalized {
    /// Back keys shared whole by tree number `tree`.
    pub fn tree_refs(&self, tree: usize) -> Option<&HashSet<Key>> {
        self.sets.get(tree).map(|sets| &sets.tree_refs)
    }

    /// Back keys whose content alone tree number `tree` shares.
    pub fn node_refs(&self, tree: usize) -> Option<&HashSet<Key>> {
        self.sets.get(tree).map(|sets| &sets.node_refs)
    }
}

/// How a node of an input tree relates to the backing tree.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Role {
    /// Stands for the whole backing subtree at the key.
    Whole(Key),
    /// Same content as the backing node, own children.
    Content(Key),
    /// Backing node exists but the content differs.
    Changed(Key),
    /// No backing counterpart.
    Fresh,
}

impl Role {
    fn back_key(&self) -> Option<&Key> {
        match self {
            Role::Whole(key) | Role::Content(key) | Role::Changed(key) => Some(key),
            Role::Fresh => None,
        }
    }
}

/// Compute, for each tree, the references it can use against `base`.
///
/// Literal nodes are matched to backing nodes through `keymap`; pass
/// [`UNMAPPABLE`](reftree_types::UNMAPPABLE) to consider explicit
/// references only. Fails with `NotFound` when a reference targets a key
/// the backing tree does not hold.
pub fn normalize<C: PartialEq>(
    base: &dyn IdAddressable<C>,
    trees: &[&dyn IdAddressable<C>],
    keymap: &dyn KeyMap,
) -> TreeResult<Normalized> {
    let mut partition = Partition::new(base);
    let mut roles = Vec::with_capacity(trees.len());
    for (tag, tree) in trees.iter().enumerate() {
        roles.push(partition.scan(*tree, tag, keymap)?);
    }

    let mut out = Normalized::default();
    for (tag, tree) in trees.iter().enumerate() {
        let tree_refs: HashSet<Key> = partition
            .leaves
            .iter()
            .filter(|(_, tags)| tags.contains(&tag))
            .map(|(key, _)| key.clone())
            .collect();
        let node_refs = content_refs(*tree, base, &roles[tag], &tree_refs, &mut out.expanded)?;
        out.sets.push(RefSets {
            tree_refs,
            node_refs,
        });
    }
    debug!(
        trees = trees.len(),
        inner = partition.inner.len(),
        leaves = partition.leaves.len(),
        expanded = out.expanded.len(),
        "normalized reference sets"
    );
    Ok(out)
}

struct Partition<'b, C> {
    base: &'b dyn IdAddressable<C>,
    /// Unsplit backing subtrees and the trees allowed to reference them.
    leaves: HashMap<Key, BTreeSet<usize>>,
    /// Prohibited backing nodes. Closed under taking parents.
    inner: HashSet<Key>,
}

impl<'b, C: PartialEq> Partition<'b, C> {
    fn new(base: &'b dyn IdAddressable<C>) -> Self {
        Self {
            base,
            leaves: HashMap::new(),
            inner: HashSet::new(),
        }
    }

    fn scan(
        &mut self,
        tree: &dyn IdAddressable<C>,
        tag: usize,
        keymap: &dyn KeyMap,
    ) -> TreeResult<HashMap<Key, Role>> {
        let mut roles = HashMap::new();
        let Some(root) = tree.root() else {
            return Ok(roles);
        };
        let mut stack = vec![(root, 0usize)];
        // Backing keys of the nodes above the current one.
        let mut path: Vec<Option<Key>> = Vec::new();
        while let Some((key, depth)) = stack.pop() {
            path.truncate(depth);
            let role = classify(tree, &key, self.base, keymap)?;
            let (descend, claims_path) = match &role {
                Role::Whole(target) if self.inner.contains(target) => {
                    self.downscan(target, tag)?;
                    (false, false)
                }
                Role::Whole(target) => {
                    self.add_leaf(target, tag)?;
                    (false, true)
                }
                Role::Content(target) | Role::Changed(target) => {
                    self.prohibit(target)?;
                    (true, true)
                }
                Role::Fresh => (true, false),
            };
            if claims_path {
                for ancestor in path.iter().flatten() {
                    self.prohibit(ancestor)?;
                }
            }
            if descend {
                path.push(role.back_key().cloned());
                for child in tree.children(&key)?.into_iter().rev() {
                    stack.push((child, depth + 1));
                }
            }
            roles.insert(key, role);
        }
        Ok(roles)
    }

    /// Split `key` and every unsplit ancestor, top down.
    fn prohibit(&mut self, key: &Key) -> TreeResult<()> {
        let mut chain = Vec::new();
        let mut cursor = Some(key.clone());
        while let Some(current) = cursor {
            if self.inner.contains(&current) || !self.base.contains(&current) {
                break;
            }
            cursor = self.base.parent(&current)?;
            chain.push(current);
        }
        for node in chain.into_iter().rev() {
            let tags = self.leaves.remove(&node).unwrap_or_default();
            for child in self.base.children(&node)? {
                self.leaves.entry(child).or_default().extend(tags.iter().copied());
            }
            self.inner.insert(node);
        }
        Ok(())
    }

    fn add_leaf(&mut self, key: &Key, tag: usize) -> TreeResult<()> {
        if let Some(parent) = self.base.parent(key)? {
            self.prohibit(&parent)?;
        }
        self.leaves.entry(key.clone()).or_default().insert(tag);
        Ok(())
    }

    /// Claim a whole subtree that is already split: tag every leaf below it.
    fn downscan(&mut self, key: &Key, tag: usize) -> TreeResult<()> {
        let mut stack = vec![key.clone()];
        while let Some(current) = stack.pop() {
            if self.inner.contains(&current) {
                for child in self.base.children(&current)? {
                    if self.inner.contains(&child) || self.leaves.contains_key(&child) {
                        stack.push(child);
                    } else {
                        self.leaves.insert(child, BTreeSet::from([tag]));
                    }
                }
            } else if let Some(tags) = self.leaves.get_mut(&current) {
                tags.insert(tag);
            }
        }
        Ok(())
    }
}

fn classify<C: PartialEq>(
    tree: &dyn IdAddressable<C>,
    key: &Key,
    base: &dyn IdAddressable<C>,
    keymap: &dyn KeyMap,
) -> TreeResult<Role> {
    let require = |target: Key| {
        if base.contains(&target) {
            Ok(target)
        } else {
            Err(TreeError::NotFound(target))
        }
    };
    match tree.node(key)? {
        Payload::TreeRef(target) => Ok(Role::Whole(require(target)?)),
        Payload::NodeRef(target) => Ok(Role::Content(require(target)?)),
        Payload::Literal(content) => {
            let Some(back) = keymap.back_key(key).filter(|back| base.contains(back)) else {
                return Ok(Role::Fresh);
            };
            if subtree_mismatch(tree, key, base, &back, keymap)?.is_none() {
                Ok(Role::Whole(back))
            } else if base.payload(&back) == Some(Payload::Literal(content)) {
                Ok(Role::Content(back))
            } else {
                Ok(Role::Changed(back))
            }
        }
    }
}

enum Visit {
    Tree(Key),
    Base(Key),
}

/// Backing keys a tree may borrow content from once its tree references are
/// fixed, and the literal nodes nothing stands for.
fn content_refs<C>(
    tree: &dyn IdAddressable<C>,
    base: &dyn IdAddressable<C>,
    roles: &HashMap<Key, Role>,
    tree_refs: &HashSet<Key>,
    expanded: &mut HashSet<Key>,
) -> TreeResult<HashSet<Key>> {
    let mut node_refs = HashSet::new();
    let mut pending: Vec<Visit> = tree.root().map(Visit::Tree).into_iter().collect();
    while let Some(visit) = pending.pop() {
        match visit {
            Visit::Tree(key) => {
                let role = roles
                    .get(&key)
                    .ok_or_else(|| TreeError::internal(format!("node {key} was not scanned")))?;
                match role {
                    Role::Whole(target) if tree_refs.contains(target) => {}
                    // Split by another tree: the region below is backing content.
                    Role::Whole(target) => {
                        node_refs.insert(target.clone());
                        pending.extend(base.children(target)?.into_iter().map(Visit::Base));
                    }
                    Role::Content(target) => {
                        node_refs.insert(target.clone());
                        pending.extend(tree.children(&key)?.into_iter().map(Visit::Tree));
                    }
                    Role::Changed(_) | Role::Fresh => {
                        pending.extend(tree.children(&key)?.into_iter().map(Visit::Tree));
                        expanded.insert(key);
                    }
                }
            }
            Visit::Base(key) => {
                if !tree_refs.contains(&key) {
                    pending.extend(base.children(&key)?.into_iter().map(Visit::Base));
                    node_refs.insert(key);
                }
            }
        }
    }
    Ok(node_refs)
}
