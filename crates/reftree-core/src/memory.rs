//! In-memory mutable reftree.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use reftree_types::{Key, KeyGen, Payload, Position, TreeError, TreeResult};

use crate::traits::{BatchMutable, ChangeTree, IdAddressable, MutableRefTree};

/// Placement used for [`Position::Natural`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChildOrder {
    /// Append after the existing children.
    #[default]
    Append,
    /// Keep children sorted by key.
    ByKey,
}

#[derive(Clone, Debug)]
struct Slot<C> {
    payload: Payload<C>,
    parent: Option<Key>,
    children: Vec<Key>,
}

/// A raw reftree held in a key index.
///
/// Lookups, parent walks, and edits are O(1) apart from the child-list
/// splice. Payloads are stored as given; references are not resolved.
#[derive(Clone, Debug)]
pub struct MemTree<C> {
    root: Option<Key>,
    slots: HashMap<Key, Slot<C>>,
    order: ChildOrder,
    keygen: KeyGen,
}

impl<C> MemTree<C> {
    /// An empty tree.
    pub fn new() -> Self {
        Self {
            root: None,
            slots: HashMap::new(),
            order: ChildOrder::default(),
            keygen: KeyGen::new(),
        }
    }

    /// A tree holding only a root.
    pub fn rooted(key: Key, payload: Payload<C>) -> Self {
        let mut tree = Self::new();
        tree.reroot(key, payload);
        tree
    }

    /// A one-node tree standing for the whole backing subtree at `target`.
    pub fn reference_to(target: Key) -> Self {
        Self::rooted(target.clone(), Payload::TreeRef(target))
    }

    /// Use `order` for natural inserts.
    pub fn with_order(mut self, order: ChildOrder) -> Self {
        self.order = order;
        self
    }

    /// Draw automatic keys from `keygen`.
    pub fn with_keygen(mut self, keygen: KeyGen) -> Self {
        self.keygen = keygen;
        self
    }

    /// Placement used for natural inserts.
    pub fn order(&self) -> ChildOrder {
        self.order
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the tree has no root.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Drop every node and install a single root.
    pub fn reroot(&mut self, key: Key, payload: Payload<C>) {
        self.slots.clear();
        self.slots.insert(
            key.clone(),
            Slot {
                payload,
                parent: None,
                children: Vec::new(),
            },
        );
        self.root = Some(key);
    }

    /// Append a child. Shorthand for building fixtures.
    pub fn append(
        &mut self,
        parent: &Key,
        key: impl Into<Key>,
        payload: Payload<C>,
    ) -> TreeResult<Key> {
        self.place(parent, Position::At(self.child_count(parent)?), Some(key.into()), payload)
    }

    fn child_count(&self, key: &Key) -> TreeResult<usize> {
        self.slot(key).map(|slot| slot.children.len())
    }

    fn slot(&self, key: &Key) -> TreeResult<&Slot<C>> {
        self.slots.get(key).ok_or_else(|| TreeError::not_found(key))
    }

    fn slot_mut(&mut self, key: &Key) -> TreeResult<&mut Slot<C>> {
        self.slots.get_mut(key).ok_or_else(|| TreeError::not_found(key))
    }

    fn index_for(&self, siblings: &[Key], key: &Key, pos: Position) -> TreeResult<usize> {
        match pos {
            Position::At(index) if index <= siblings.len() => Ok(index),
            Position::At(index) => Err(TreeError::invalid(format!(
                "position {index} out of range for {} children",
                siblings.len()
            ))),
            Position::Natural => Ok(match self.order {
                ChildOrder::Append => siblings.len(),
                ChildOrder::ByKey => siblings.partition_point(|sibling| sibling < key),
            }),
        }
    }

    fn accepts_children(&self, parent: &Key) -> TreeResult<()> {
        if self.slot(parent)?.payload.is_tree_ref() {
            return Err(TreeError::invalid(format!(
                "tree reference {parent} cannot have children"
            )));
        }
        Ok(())
    }

    fn place(
        &mut self,
        parent: &Key,
        pos: Position,
        key: Option<Key>,
        payload: Payload<C>,
    ) -> TreeResult<Key> {
        self.accepts_children(parent)?;
        let key = match key {
            Some(key) => key,
            None => self.fresh_key(),
        };
        if self.slots.contains_key(&key) {
            return Err(TreeError::duplicate(&key));
        }
        let index = self.index_for(&self.slot(parent)?.children, &key, pos)?;
        self.slot_mut(parent)?.children.insert(index, key.clone());
        self.slots.insert(
            key.clone(),
            Slot {
                payload,
                parent: Some(parent.clone()),
                children: Vec::new(),
            },
        );
        Ok(key)
    }

    fn fresh_key(&mut self) -> Key {
        loop {
            let key = self.keygen.next_key();
            if !self.slots.contains_key(&key) {
                return key;
            }
        }
    }

    fn detach(&mut self, key: &Key) -> TreeResult<()> {
        if let Some(parent) = self.slot(key)?.parent.clone() {
            self.slot_mut(&parent)?.children.retain(|child| child != key);
        }
        Ok(())
    }
}

impl<C: Clone> MemTree<C> {
    /// Copy any tree's raw payloads into a new `MemTree`.
    pub fn copy_of(tree: &dyn IdAddressable<C>) -> TreeResult<Self> {
        let mut copy = Self::new();
        copy.fill_from(tree)?;
        Ok(copy)
    }

    fn fill_from(&mut self, tree: &dyn IdAddressable<C>) -> TreeResult<()> {
        self.slots.clear();
        self.root = tree.root();
        let mut stack: Vec<(Key, Option<Key>)> =
            tree.root().into_iter().map(|root| (root, None)).collect();
        while let Some((key, parent)) = stack.pop() {
            let payload = tree.node(&key)?.cloned();
            let children = tree.children(&key)?;
            if payload.is_tree_ref() && !children.is_empty() {
                return Err(TreeError::invalid(format!(
                    "tree reference {key} cannot have children"
                )));
            }
            stack.extend(children.iter().rev().map(|child| (child.clone(), Some(key.clone()))));
            let slot = Slot {
                payload,
                parent,
                children,
            };
            if self.slots.insert(key.clone(), slot).is_some() {
                return Err(TreeError::duplicate(&key));
            }
        }
        Ok(())
    }
}

impl<C> Default for MemTree<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> IdAddressable<C> for MemTree<C> {
    fn root(&self) -> Option<Key> {
        self.root.clone()
    }

    fn contains(&self, key: &Key) -> bool {
        self.slots.contains_key(key)
    }

    fn payload(&self, key: &Key) -> Option<Payload<&C>> {
        self.slots.get(key).map(|slot| slot.payload.as_ref())
    }

    fn parent(&self, key: &Key) -> TreeResult<Option<Key>> {
        Ok(self.slot(key)?.parent.clone())
    }

    fn children(&self, key: &Key) -> TreeResult<Vec<Key>> {
        Ok(self.slot(key)?.children.clone())
    }
}

impl<C: PartialEq> MutableRefTree<C> for MemTree<C> {
    fn insert(
        &mut self,
        parent: &Key,
        pos: Position,
        key: Option<Key>,
        payload: Payload<C>,
    ) -> TreeResult<Key> {
        self.place(parent, pos, key, payload)
    }

    /// Deleting the root empties the tree.
    fn delete(&mut self, key: &Key) -> TreeResult<()> {
        self.slot(key)?;
        self.detach(key)?;
        let mut doomed = vec![key.clone()];
        while let Some(next) = doomed.pop() {
            if let Some(slot) = self.slots.remove(&next) {
                doomed.extend(slot.children);
            }
        }
        if self.root.as_ref() == Some(key) {
            self.root = None;
        }
        debug!(key = %key, remaining = self.slots.len(), "deleted subtree");
        Ok(())
    }

    fn move_node(&mut self, key: &Key, parent: &Key, pos: Position) -> TreeResult<Key> {
        self.slot(key)?;
        self.accepts_children(parent)?;
        if self.root.as_ref() == Some(key) {
            return Err(TreeError::invalid("cannot move the root"));
        }
        if self.is_within(parent, key)? {
            return Err(TreeError::invalid(format!(
                "cannot move {key} below itself"
            )));
        }
        let mut siblings = self.slot(parent)?.children.clone();
        siblings.retain(|sibling| sibling != key);
        let index = self.index_for(&siblings, key, pos)?;
        self.detach(key)?;
        self.slot_mut(parent)?.children.insert(index, key.clone());
        self.slot_mut(key)?.parent = Some(parent.clone());
        Ok(key.clone())
    }

    fn update(&mut self, key: &Key, payload: Payload<C>) -> TreeResult<bool> {
        let slot = self.slot_mut(key)?;
        if payload.is_tree_ref() && !slot.children.is_empty() {
            return Err(TreeError::invalid(format!(
                "tree reference {key} cannot have children"
            )));
        }
        if slot.payload == payload {
            return Ok(false);
        }
        slot.payload = payload;
        Ok(true)
    }
}

impl<C: Clone> BatchMutable<C> for MemTree<C> {
    /// Replace the whole tree. A failed copy leaves the tree unchanged.
    fn apply_tree(&mut self, tree: &dyn IdAddressable<C>) -> TreeResult<()> {
        let mut next = Self::new()
            .with_order(self.order)
            .with_keygen(self.keygen.clone());
        next.fill_from(tree)?;
        *self = next;
        Ok(())
    }
}

impl<C: Clone + PartialEq> ChangeTree<C> for MemTree<C> {
    fn reroot(&mut self, key: Key, payload: Payload<C>) {
        MemTree::reroot(self, key, payload);
    }

    fn as_batch(&mut self) -> Option<&mut dyn BatchMutable<C>> {
        Some(self)
    }
}
