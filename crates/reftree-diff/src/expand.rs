//! Expansion of references into literal content, and its inverse.

use std::collections::HashSet;

use reftree_core::{IdAddressable, MemTree, MutableRefTree};
use reftree_types::{Key, KeyMap, Payload, Position, TreeError, TreeResult};

use crate::normalize::RefSets;

/// Where the next output node comes from.
enum Source {
    /// A node of the input tree.
    Tree(Key),
    /// A backing node inside an expanded tree reference.
    Base(Key),
}

/// Literal content of a backing node.
fn base_content<C: Clone>(base: &dyn IdAddressable<C>, key: &Key) -> TreeResult<C> {
    match base.node(key)? {
        Payload::Literal(content) => Ok(content.clone()),
        _ => Err(TreeError::invalid(format!(
            "backing node {key} is a reference; expand against a resolved tree"
        ))),
    }
}

fn allowed<C>(set: &HashSet<Key>, base: &dyn IdAddressable<C>, target: &Key) -> TreeResult<()> {
    if set.contains(target) && base.contains(target) {
        Ok(())
    } else {
        Err(TreeError::not_found(target))
    }
}

/// Build the fully literal tree `tree` stands for.
///
/// Every reference must target a key in the matching allow-list and present
/// in `base`, otherwise the call fails with `NotFound` for that target. A
/// reference node keeps its own key; nodes copied from a backing subtree
/// keep their backing keys.
pub fn expand_refs<C: Clone + PartialEq>(
    tree: &dyn IdAddressable<C>,
    tree_refs: &HashSet<Key>,
    node_refs: &HashSet<Key>,
    base: &dyn IdAddressable<C>,
) -> TreeResult<MemTree<C>> {
    let root = tree.root_key()?;
    let mut out = None;
    let mut pending = vec![(None::<Key>, Source::Tree(root))];
    while let Some((parent, source)) = pending.pop() {
        let (key, content, children) = match source {
            Source::Tree(key) => match tree.node(&key)? {
                Payload::Literal(content) => {
                    let children = tree.children(&key)?.into_iter().map(Source::Tree).collect();
                    (key, content.clone(), children)
                }
                Payload::NodeRef(target) => {
                    allowed(node_refs, base, &target)?;
                    let children = tree.children(&key)?.into_iter().map(Source::Tree).collect();
                    (key, base_content(base, &target)?, children)
                }
                Payload::TreeRef(target) => {
                    allowed(tree_refs, base, &target)?;
                    let children = base.children(&target)?.into_iter().map(Source::Base).collect();
                    (key, base_content(base, &target)?, children)
                }
            },
            Source::Base(key) => {
                let children = base.children(&key)?.into_iter().map(Source::Base).collect();
                let content = base_content(base, &key)?;
                (key, content, children)
            }
        };
        place(&mut out, parent, key.clone(), Payload::Literal(content))?;
        push_children(&mut pending, &key, children);
    }
    out.ok_or_else(|| TreeError::internal("expansion produced no root"))
}

/// Rewrite `tree` so that it uses the references in `sets`.
///
/// `sets` must come from normalizing `tree` against `base` with the same
/// key map. Literal nodes whose backing key is allowed whole become tree
/// references; literal nodes whose backing key may be borrowed become node
/// references; a tree reference that is not allowed is split into its
/// backing children. Expanding the result with the same sets gives back a
/// tree equal to `tree`.
pub fn substitute_refs<C: Clone + PartialEq>(
    tree: &dyn IdAddressable<C>,
    sets: &RefSets,
    base: &dyn IdAddressable<C>,
    keymap: &dyn KeyMap,
) -> TreeResult<MemTree<C>> {
    let root = tree.root_key()?;
    let mut out = None;
    let mut pending = vec![(None::<Key>, Source::Tree(root))];
    while let Some((parent, source)) = pending.pop() {
        let (key, payload, children) = match source {
            Source::Tree(key) => {
                let own_children = || -> TreeResult<Vec<Source>> {
                    Ok(tree.children(&key)?.into_iter().map(Source::Tree).collect())
                };
                match tree.node(&key)? {
                    Payload::Literal(content) => {
                        let back = keymap.back_key(&key).filter(|back| base.contains(back));
                        match back {
                            Some(back) if sets.tree_refs.contains(&back) => {
                                (key.clone(), Payload::TreeRef(back), Vec::new())
                            }
                            Some(back) if sets.node_refs.contains(&back) => {
                                (key.clone(), Payload::NodeRef(back), own_children()?)
                            }
                            _ => (key.clone(), Payload::Literal(content.clone()), own_children()?),
                        }
                    }
                    Payload::NodeRef(target) => (key.clone(), Payload::NodeRef(target), own_children()?),
                    Payload::TreeRef(target) if sets.tree_refs.contains(&target) => {
                        (key.clone(), Payload::TreeRef(target), Vec::new())
                    }
                    Payload::TreeRef(target) => {
                        let payload = borrowed_or_copied(sets, base, &target)?;
                        let children = base.children(&target)?.into_iter().map(Source::Base).collect();
                        (key.clone(), payload, children)
                    }
                }
            }
            Source::Base(back) => {
                let key = keymap
                    .front_key(&back)
                    .ok_or_else(|| TreeError::not_found(&back))?;
                if sets.tree_refs.contains(&back) {
                    (key, Payload::TreeRef(back), Vec::new())
                } else {
                    let payload = borrowed_or_copied(sets, base, &back)?;
                    let children = base.children(&back)?.into_iter().map(Source::Base).collect();
                    (key, payload, children)
                }
            }
        };
        place(&mut out, parent, key.clone(), payload)?;
        push_children(&mut pending, &key, children);
    }
    out.ok_or_else(|| TreeError::internal("substitution produced no root"))
}

fn borrowed_or_copied<C: Clone>(
    sets: &RefSets,
    base: &dyn IdAddressable<C>,
    key: &Key,
) -> TreeResult<Payload<C>> {
    if sets.node_refs.contains(key) {
        Ok(Payload::NodeRef(key.clone()))
    } else {
        Ok(Payload::Literal(base_content(base, key)?))
    }
}

fn place<C: PartialEq>(
    out: &mut Option<MemTree<C>>,
    parent: Option<Key>,
    key: Key,
    payload: Payload<C>,
) -> TreeResult<()> {
    match parent {
        None if out.is_none() => {
            *out = Some(MemTree::rooted(key, payload));
            Ok(())
        }
        Some(parent) => {
            let tree = out
                .as_mut()
                .ok_or_else(|| TreeError::internal("child placed before its root"))?;
            let at = tree.children(&parent)?.len();
            tree.insert(&parent, Position::At(at), Some(key), payload)?;
            Ok(())
        }
        None => Err(TreeError::internal("second root in output tree")),
    }
}

fn push_children(pending: &mut Vec<(Option<Key>, Source)>, parent: &Key, children: Vec<Source>) {
    pending.extend(
        children
            .into_iter()
            .rev()
            .map(|child| (Some(parent.clone()), child)),
    );
}
