//! Deletion tracking for backing nodes.
//!
//! Deleted backing content is recorded in two sets of back keys:
//!
//! - `roots`: whole backing subtrees that are gone;
//! - `nodes`: single backing nodes whose content is gone while their
//!   children are accounted for separately.
//!
//! A backing key is deleted when it is in `nodes`, or when a walk up its
//! backing ancestors meets a `roots` entry before it meets a node the change
//! tree holds. Keys the change tree holds are never looked up here.

use std::collections::HashSet;

use reftree_core::{IdAddressable, Resolver, Tombstones};
use reftree_types::{Key, KeyMap, Payload, Reference, TreeError, TreeResult};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Deletia {
    roots: HashSet<Key>,
    nodes: HashSet<Key>,
}

impl Deletia {
    /// Back keys of deleted backing subtrees.
    pub fn roots(&self) -> &HashSet<Key> {
        &self.roots
    }

    /// Back keys of deleted single backing nodes.
    pub fn nodes(&self) -> &HashSet<Key> {
        &self.nodes
    }

    /// Whether nothing of the backing tree is deleted.
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty() && self.nodes.is_empty()
    }

    /// Forget every deletion.
    pub fn clear(&mut self) {
        self.roots.clear();
        self.nodes.clear();
    }

    pub(crate) fn from_sets(roots: HashSet<Key>, nodes: HashSet<Key>) -> Self {
        Self { roots, nodes }
    }

    /// Whether a backing key the change tree does not hold is deleted.
    ///
    /// A key the backing tree cannot place under its root counts as deleted,
    /// since no resolved read may reach it.
    pub fn is_deleted<C>(&self, view: &Resolver<'_, C>, back_key: &Key) -> bool {
        if self.nodes.contains(back_key) {
            return true;
        }
        let back = view.back();
        let mut cursor = back_key.clone();
        loop {
            if !back.contains(&cursor) || self.roots.contains(&cursor) {
                return true;
            }
            match back.parent(&cursor) {
                Ok(Some(parent)) if view.is_live(&parent) => return false,
                Ok(Some(parent)) => cursor = parent,
                Ok(None) => return false,
                Err(_) => return true,
            }
        }
    }

    /// Record everything below and including `front_key` in the change tree
    /// as deleted backing content.
    pub(crate) fn record_subtree<C>(
        &mut self,
        change_tree: &dyn IdAddressable<C>,
        back: &dyn IdAddressable<C>,
        keymap: &dyn KeyMap,
        front_key: &Key,
    ) -> TreeResult<()> {
        let mut pending = vec![front_key.clone()];
        while let Some(key) = pending.pop() {
            match change_tree.node(&key)? {
                Payload::TreeRef(target) => {
                    self.roots.insert(target);
                }
                Payload::NodeRef(target) => {
                    self.nodes.insert(target);
                }
                Payload::Literal(_) => {
                    if let Some(backed) = keymap.back_key(&key).filter(|k| back.contains(k)) {
                        self.nodes.insert(backed);
                    }
                }
            }
            pending.extend(change_tree.children(&key)?);
        }
        Ok(())
    }

    /// Bring back the backing content a new reference points at.
    pub(crate) fn undelete<C>(
        &mut self,
        view: &Resolver<'_, C>,
        reference: &Reference,
    ) -> TreeResult<()> {
        let target = reference.target();
        if !view.back().contains(target) {
            return Err(TreeError::not_found(target));
        }
        match reference {
            Reference::Node(_) => self.undelete_node(view, target),
            Reference::Tree(_) => self.undelete_tree(view, target),
        }
    }

    /// The node itself is alive again; its backing children are not.
    pub(crate) fn undelete_node<C>(&mut self, view: &Resolver<'_, C>, target: &Key) -> TreeResult<()> {
        let was_node = self.nodes.remove(target);
        let was_root = self.roots.remove(target);
        if was_root || (!was_node && self.covered_by_root(view, target)?) {
            for child in view.back().children(target)? {
                if !view.is_live(&child) {
                    self.roots.insert(child);
                }
            }
        }
        Ok(())
    }

    /// The whole backing subtree is alive again, including any finer
    /// deletions recorded beneath it.
    pub(crate) fn undelete_tree<C>(&mut self, view: &Resolver<'_, C>, target: &Key) -> TreeResult<()> {
        let back = view.back();
        let mut beneath = Vec::new();
        for key in self.roots.iter().chain(&self.nodes) {
            if back.is_within(key, target)? {
                beneath.push(key.clone());
            }
        }
        for key in beneath {
            self.roots.remove(&key);
            self.nodes.remove(&key);
        }
        Ok(())
    }

    /// Drop entries for backing nodes the change tree holds. A live entry in
    /// `roots` is replaced by the topmost backing nodes below it that are not
    /// live. A live node inside a deleted subtree keeps its own children
    /// deleted.
    pub(crate) fn release_live<C>(&mut self, view: &Resolver<'_, C>) -> TreeResult<()> {
        let back = view.back();
        let mut exposed = Vec::new();
        for root in &self.roots {
            let mut pending = back.children(root)?;
            while let Some(key) = pending.pop() {
                let children = back.children(&key)?;
                if view.is_live(&key) {
                    exposed.extend(children.iter().filter(|child| !view.is_live(child)).cloned());
                }
                pending.extend(children);
            }
        }
        self.roots.extend(exposed);

        let live: Vec<Key> = self
            .roots
            .iter()
            .chain(&self.nodes)
            .filter(|key| view.is_live(key))
            .cloned()
            .collect();
        for key in live {
            self.nodes.remove(&key);
            if !self.roots.remove(&key) {
                continue;
            }
            let mut pending = view.back().children(&key)?;
            while let Some(child) = pending.pop() {
                if view.is_live(&child) {
                    pending.extend(view.back().children(&child)?);
                } else {
                    self.roots.insert(child);
                }
            }
        }
        Ok(())
    }

    /// Whether a strict ancestor of `target` in `roots` hides it.
    fn covered_by_root<C>(&self, view: &Resolver<'_, C>, target: &Key) -> TreeResult<bool> {
        let back = view.back();
        let mut cursor = back.parent(target)?;
        while let Some(ancestor) = cursor {
            if self.roots.contains(&ancestor) {
                return Ok(true);
            }
            if view.is_live(&ancestor) {
                return Ok(false);
            }
            cursor = back.parent(&ancestor)?;
        }
        Ok(false)
    }
}

impl<C> Tombstones<C> for Deletia {
    fn is_deleted(&self, view: &Resolver<'_, C>, back_key: &Key) -> bool {
        Deletia::is_deleted(self, view, back_key)
    }
}
