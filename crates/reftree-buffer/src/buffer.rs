//! The change buffer.
//!
//! A [`ChangeBuffer`] edits a backing tree without touching it. Edits land in
//! a change tree that starts as a single tree reference to the backing root
//! and is opened up one level at a time, only along the paths that edits
//! reach. Backing content the edits remove is tracked in a [`Deletia`].

use std::collections::HashSet;
use std::marker::PhantomData;

use tracing::{debug, trace};

use reftree_core::{
    BatchMutable, ChangeTree, IdAddressable, MemTree, MutableRefTree, Resolver,
};
use reftree_diff::{apply_edits, normalize};
use reftree_types::{
    Key, KeyGen, KeyMap, Payload, Position, Reference, TreeError, TreeResult, IDENTITY,
    UNMAPPABLE,
};

use crate::config::BufferConfig;
use crate::deletia::Deletia;

/// The caller's key map with the change-tree root pinned to the backing root.
#[derive(Debug)]
struct RootedMap {
    inner: Box<dyn KeyMap>,
    front_root: Key,
    back_root: Key,
}

impl KeyMap for RootedMap {
    fn back_key(&self, front: &Key) -> Option<Key> {
        if *front == self.front_root {
            return Some(self.back_root.clone());
        }
        self.inner
            .back_key(front)
            .filter(|back| *back != self.back_root)
    }

    fn front_key(&self, back: &Key) -> Option<Key> {
        if *back == self.back_root {
            return Some(self.front_root.clone());
        }
        self.inner
            .front_key(back)
            .filter(|front| *front != self.front_root)
    }
}

/// Mutable view of a backing tree that records edits in a change tree.
///
/// Reads through [`IdAddressable`] see the edited tree. The change tree
/// itself is raw: references in it name backing keys, and
/// [`change_tree`](Self::change_tree) exposes it as stored.
///
/// Every reference in the change tree targets the back key of its own front
/// key. No backing node is reachable both through a tree reference and as a
/// node of the change tree.
pub struct ChangeBuffer<C, B, T = MemTree<C>> {
    backing: B,
    change_tree: T,
    keymap: RootedMap,
    deletia: Deletia,
    keygen: KeyGen,
    config: BufferConfig,
    _content: PhantomData<fn() -> C>,
}

impl<C, B> ChangeBuffer<C, B>
where
    C: Clone + PartialEq,
    B: IdAddressable<C>,
{
    /// Buffer over `backing` with identical key spaces and default settings.
    pub fn new(backing: B) -> TreeResult<Self> {
        Self::with_config(backing, BufferConfig::default())
    }

    /// Buffer over `backing` with identical key spaces.
    pub fn with_config(backing: B, config: BufferConfig) -> TreeResult<Self> {
        Self::with_keymap(backing, IDENTITY, config)
    }

    /// Buffer whose front keys map to backing keys through `keymap`.
    pub fn with_keymap(
        backing: B,
        keymap: impl KeyMap + 'static,
        config: BufferConfig,
    ) -> TreeResult<Self> {
        let change_tree = MemTree::new().with_order(config.child_order);
        Self::with_change_tree(change_tree, backing, keymap, config)
    }
}

impl<C, B, T> ChangeBuffer<C, B, T>
where
    C: Clone + PartialEq,
    B: IdAddressable<C>,
    T: ChangeTree<C>,
{
    /// Buffer that records edits in a caller-supplied change tree. Whatever
    /// the change tree holds is discarded.
    pub fn with_change_tree(
        change_tree: T,
        backing: B,
        keymap: impl KeyMap + 'static,
        config: BufferConfig,
    ) -> TreeResult<Self> {
        let back_root = backing
            .root()
            .ok_or_else(|| TreeError::invalid("backing tree is empty"))?;
        let front_root = match &config.root_key {
            Some(key) => key.clone(),
            None => keymap.front_key(&back_root).ok_or_else(|| {
                TreeError::invalid(format!("backing root {back_root} has no front key"))
            })?,
        };
        let mut buffer = Self {
            backing,
            change_tree,
            keymap: RootedMap {
                inner: Box::new(keymap),
                front_root,
                back_root,
            },
            deletia: Deletia::default(),
            keygen: KeyGen::starting_at(config.first_auto_key),
            config,
            _content: PhantomData,
        };
        buffer.reset();
        Ok(buffer)
    }

    /// The backing tree. Edits never touch it.
    pub fn backing(&self) -> &B {
        &self.backing
    }

    /// The raw change tree.
    pub fn change_tree(&self) -> &T {
        &self.change_tree
    }

    /// Backing content the edits removed.
    pub fn deletia(&self) -> &Deletia {
        &self.deletia
    }

    /// Settings the buffer was built with.
    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    /// Whether the edits removed the backing node `back_key`. A backing key
    /// the change tree holds again is not deleted.
    pub fn is_deleted(&self, back_key: &Key) -> bool {
        let view = self.view();
        !view.is_live(back_key) && view.is_deleted(back_key)
    }

    /// Drop every edit.
    pub fn reset(&mut self) {
        let root = self.keymap.front_root.clone();
        let target = self.keymap.back_root.clone();
        self.change_tree.reroot(root.clone(), Payload::TreeRef(target));
        self.deletia.clear();
        debug!(root = %root, "reset change buffer");
    }

    fn view(&self) -> Resolver<'_, C> {
        Resolver::new(&self.change_tree, &self.backing, &self.keymap).with_tombstones(&self.deletia)
    }

    /// Materialize the path from the nearest tree reference above `key` down
    /// to `key`, so that `key` is a node of the change tree. With
    /// `with_children` the node itself is opened too and lists its children.
    pub fn expand(&mut self, key: &Key, with_children: bool) -> TreeResult<()> {
        match self.change_tree.payload(key) {
            Some(Payload::TreeRef(_)) if with_children => {}
            Some(_) => return Ok(()),
            None if self.contains(key) => {}
            None => return Err(TreeError::not_found(key)),
        }

        let mut pending = Vec::new();
        let mut cursor = key.clone();
        let mut open = with_children;
        loop {
            match self.change_tree.payload(&cursor) {
                Some(Payload::TreeRef(_)) => break,
                Some(_) => {
                    return Err(TreeError::internal(format!(
                        "{cursor} is materialized but does not list the path to {key}"
                    )))
                }
                None => {}
            }
            if open {
                pending.push(cursor.clone());
            } else {
                open = true;
            }
            let back = self
                .keymap
                .back_key(&cursor)
                .ok_or_else(|| TreeError::not_found(&cursor))?;
            let parent = self
                .backing
                .parent(&back)?
                .ok_or_else(|| TreeError::not_found(&cursor))?;
            cursor = self
                .keymap
                .front_key(&parent)
                .ok_or(TreeError::NotFound(parent))?;
        }

        if open {
            self.pry_open(&cursor)?;
        }
        while let Some(next) = pending.pop() {
            self.pry_open(&next)?;
        }
        Ok(())
    }

    /// Turn a tree reference into a node reference that lists the target's
    /// children as tree references.
    fn pry_open(&mut self, key: &Key) -> TreeResult<()> {
        let back = self
            .keymap
            .back_key(key)
            .ok_or_else(|| TreeError::not_found(key))?;
        self.change_tree
            .update(key, Payload::NodeRef(back.clone()))?;
        let children = self.backing.children(&back)?;
        for (index, child) in children.iter().enumerate() {
            let front = self
                .keymap
                .front_key(child)
                .ok_or_else(|| TreeError::not_found(child))?;
            self.change_tree.insert(
                key,
                Position::At(index),
                Some(front),
                Payload::TreeRef(child.clone()),
            )?;
        }
        trace!(key = %key, children = children.len(), "opened tree reference");
        Ok(())
    }

    fn fresh_key(&mut self) -> Key {
        loop {
            let key = self.keygen.next_key();
            if !self.contains(&key) {
                return key;
            }
        }
    }

    fn is_root(&self, key: &Key) -> bool {
        self.change_tree.root().as_ref() == Some(key)
    }

    /// A reference at `key` must point at the back key of `key`.
    fn check_reference(&self, key: &Key, target: &Key) -> TreeResult<()> {
        if self.keymap.back_key(key).as_ref() != Some(target) {
            return Err(TreeError::invalid(format!(
                "reference at {key} cannot target {target}"
            )));
        }
        if !self.backing.contains(target) {
            return Err(TreeError::not_found(target));
        }
        Ok(())
    }

    /// A tree reference to `target` may not cover a node the change tree
    /// already holds, other than nodes below `own`.
    fn check_tree_ref_free(&self, target: &Key, own: Option<&Key>) -> TreeResult<()> {
        for key in self.change_tree.keys()? {
            if let Some(own) = own {
                if self.change_tree.is_within(&key, own)? {
                    continue;
                }
            }
            let Some(back) = self.keymap.back_key(&key) else {
                continue;
            };
            if self.backing.contains(&back) && self.backing.is_within(&back, target)? {
                return Err(TreeError::invalid(format!(
                    "{key} is already in the tree below {target}"
                )));
            }
        }
        Ok(())
    }

    /// Bring back deleted backing content that the node at `key` now holds.
    fn resurrect(&mut self, key: &Key, reference: Option<Reference>) -> TreeResult<()> {
        let view: Resolver<'_, C> = Resolver::new(&self.change_tree, &self.backing, &self.keymap);
        match reference {
            Some(reference) => self.deletia.undelete(&view, &reference),
            None => match self
                .keymap
                .back_key(key)
                .filter(|back| self.backing.contains(back))
            {
                Some(back) => self.deletia.undelete_node(&view, &back),
                None => Ok(()),
            },
        }
    }

    fn update_content(&mut self, key: &Key, content: C) -> TreeResult<bool> {
        self.expand(key, true)?;
        let borrowed = match self.change_tree.node(key)? {
            Payload::NodeRef(target) => Some(target),
            Payload::Literal(_) => None,
            Payload::TreeRef(_) => {
                return Err(TreeError::internal(format!("{key} is still a tree reference")))
            }
        };
        if let Some(target) = borrowed {
            let same = matches!(
                self.backing.payload(&target),
                Some(Payload::Literal(backed)) if *backed == content
            );
            if same {
                if self.config.update_loads_content {
                    self.change_tree.update(key, Payload::Literal(content))?;
                }
                return Ok(false);
            }
        }
        self.change_tree.update(key, Payload::Literal(content))
    }

    /// Replace the subtree at `key` by the backing subtree it stands for.
    fn collapse(&mut self, key: &Key, target: Key) -> TreeResult<bool> {
        self.check_reference(key, &target)?;
        match self.change_tree.payload(key) {
            Some(Payload::TreeRef(_)) | None => return Ok(false),
            Some(_) => {}
        }
        self.check_tree_ref_free(&target, Some(key))?;
        for child in self.change_tree.children(key)? {
            self.deletia
                .record_subtree::<C>(&self.change_tree, &self.backing, &self.keymap, &child)?;
            self.change_tree.delete(&child)?;
        }
        self.change_tree.update(key, Payload::TreeRef(target.clone()))?;
        self.resurrect(key, Some(Reference::Tree(target)))?;
        Ok(true)
    }

    /// Make the edited tree equal to the resolved view of `tree`.
    ///
    /// `tree` is raw: its references name backing keys and must be aligned
    /// with their own keys the same way the change tree's are. Its root
    /// becomes the change-tree root and stands for the backing root.
    pub fn apply(&mut self, tree: &dyn IdAddressable<C>) -> TreeResult<()> {
        if self.change_tree.as_batch().is_none() {
            self.reset();
            apply_edits(tree, self)?;
            debug!("applied tree through single edits");
            return Ok(());
        }

        let root = tree.root_key()?;
        let back_root = self.keymap.back_root.clone();
        for key in tree.keys()? {
            let Some(target) = tree.payload(&key).and_then(|p| p.target().cloned()) else {
                continue;
            };
            let back = if key == root {
                Some(back_root.clone())
            } else {
                self.keymap.inner.back_key(&key).filter(|back| *back != back_root)
            };
            if back.as_ref() != Some(&target) {
                return Err(TreeError::invalid(format!(
                    "reference at {key} cannot target {target}"
                )));
            }
        }

        let whole: MemTree<C> = MemTree::reference_to(back_root.clone());
        let normalized = normalize(&self.backing, &[tree, &whole], &UNMAPPABLE)?;
        let missing = || TreeError::internal("normalize dropped a tree");
        let used = normalized.tree_refs(0).ok_or_else(missing)?;
        let allowed = normalized.tree_refs(1).ok_or_else(missing)?;

        let mut nodes = HashSet::new();
        let mut pending = vec![back_root];
        while let Some(key) = pending.pop() {
            if allowed.contains(&key) {
                continue;
            }
            pending.extend(self.backing.children(&key)?);
            nodes.insert(key);
        }
        for key in tree.keys()? {
            if let Some(Payload::NodeRef(target)) = tree.payload(&key) {
                nodes.remove(&target);
            }
        }
        let roots: HashSet<Key> = allowed.difference(used).cloned().collect();

        self.keymap.front_root = root;
        self.reset();
        self.expand_targets(tree)?;
        self.change_tree
            .as_batch()
            .ok_or_else(|| TreeError::internal("change tree lost batch support"))?
            .apply_tree(tree)?;
        self.deletia = Deletia::from_sets(roots, nodes);
        let view: Resolver<'_, C> = Resolver::new(&self.change_tree, &self.backing, &self.keymap);
        self.deletia.release_live(&view)?;
        debug!(
            shared = used.len(),
            deleted_roots = self.deletia.roots().len(),
            deleted_nodes = self.deletia.nodes().len(),
            "applied tree"
        );
        Ok(())
    }

    /// Check that every reference target of `tree` can be reached.
    fn expand_targets(&mut self, tree: &dyn IdAddressable<C>) -> TreeResult<()> {
        for key in tree.keys()? {
            if let Some(target) = tree.payload(&key).and_then(|p| p.target().cloned()) {
                let front = self
                    .keymap
                    .front_key(&target)
                    .ok_or(TreeError::NotFound(target))?;
                self.expand(&front, false)?;
            }
        }
        Ok(())
    }
}

impl<C, B, T> IdAddressable<C> for ChangeBuffer<C, B, T>
where
    C: Clone + PartialEq,
    B: IdAddressable<C>,
    T: ChangeTree<C>,
{
    fn root(&self) -> Option<Key> {
        self.change_tree.root()
    }

    fn contains(&self, key: &Key) -> bool {
        self.view().contains(key)
    }

    fn payload(&self, key: &Key) -> Option<Payload<&C>> {
        self.view().payload(key)
    }

    fn parent(&self, key: &Key) -> TreeResult<Option<Key>> {
        self.view().parent(key)
    }

    fn children(&self, key: &Key) -> TreeResult<Vec<Key>> {
        self.view().children(key)
    }
}

impl<C, B, T> MutableRefTree<C> for ChangeBuffer<C, B, T>
where
    C: Clone + PartialEq,
    B: IdAddressable<C>,
    T: ChangeTree<C>,
{
    fn insert(
        &mut self,
        parent: &Key,
        pos: Position,
        key: Option<Key>,
        payload: Payload<C>,
    ) -> TreeResult<Key> {
        let key = match key {
            Some(key) => key,
            None => self.fresh_key(),
        };
        if self.contains(&key) {
            return Err(TreeError::duplicate(&key));
        }
        if !self.contains(parent) {
            return Err(TreeError::not_found(parent));
        }
        let reference = payload.reference();
        if let Some(reference) = &reference {
            self.check_reference(&key, reference.target())?;
            if let Reference::Tree(target) = reference {
                self.check_tree_ref_free(target, None)?;
            }
        }
        self.expand(parent, true)?;
        let key = self.change_tree.insert(parent, pos, Some(key), payload)?;
        self.resurrect(&key, reference)?;
        debug!(key = %key, parent = %parent, "inserted node");
        Ok(key)
    }

    fn delete(&mut self, key: &Key) -> TreeResult<()> {
        if self.is_root(key) {
            return Err(TreeError::invalid("cannot delete the root"));
        }
        if !self.contains(key) {
            return Err(TreeError::not_found(key));
        }
        self.expand(key, false)?;
        self.deletia
            .record_subtree::<C>(&self.change_tree, &self.backing, &self.keymap, key)?;
        self.change_tree.delete(key)?;
        debug!(key = %key, "deleted node");
        Ok(())
    }

    fn move_node(&mut self, key: &Key, parent: &Key, pos: Position) -> TreeResult<Key> {
        if self.is_root(key) {
            return Err(TreeError::invalid("cannot move the root"));
        }
        if !self.contains(key) {
            return Err(TreeError::not_found(key));
        }
        if !self.contains(parent) {
            return Err(TreeError::not_found(parent));
        }
        if self.is_within(parent, key)? {
            return Err(TreeError::invalid(format!("cannot move {key} below itself")));
        }
        self.expand(key, false)?;
        self.expand(parent, true)?;
        let key = self.change_tree.move_node(key, parent, pos)?;
        debug!(key = %key, parent = %parent, "moved node");
        Ok(key)
    }

    /// Returns whether the resolved content changed. Updating to a tree
    /// reference drops the node's materialized subtree.
    fn update(&mut self, key: &Key, payload: Payload<C>) -> TreeResult<bool> {
        if !self.contains(key) {
            return Err(TreeError::not_found(key));
        }
        let changed = match payload {
            Payload::Literal(content) => self.update_content(key, content)?,
            Payload::NodeRef(target) => {
                self.check_reference(key, &target)?;
                self.expand(key, true)?;
                let changed = self
                    .change_tree
                    .update(key, Payload::NodeRef(target.clone()))?;
                self.resurrect(key, Some(Reference::Node(target)))?;
                changed
            }
            Payload::TreeRef(target) => self.collapse(key, target)?,
        };
        debug!(key = %key, changed, "updated node");
        Ok(changed)
    }
}

impl<C, B, T> BatchMutable<C> for ChangeBuffer<C, B, T>
where
    C: Clone + PartialEq,
    B: IdAddressable<C>,
    T: ChangeTree<C>,
{
    fn apply_tree(&mut self, tree: &dyn IdAddressable<C>) -> TreeResult<()> {
        self.apply(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reftree_core::{find_mismatch, parse_outline, render_outline, tree_eq, ChildOrder};
    use reftree_types::AUTO_KEY;

    type Buffer = ChangeBuffer<String, MemTree<String>>;

    fn k(s: &str) -> Key {
        Key::name(s)
    }

    fn lit(s: &str) -> Payload<String> {
        Payload::Literal(s.to_string())
    }

    fn set(names: &[&str]) -> HashSet<Key> {
        names.iter().map(|n| k(n)).collect()
    }

    fn outline(text: &str) -> MemTree<String> {
        parse_outline(text).unwrap()
    }

    fn buffer(backing: &str) -> Buffer {
        ChangeBuffer::new(outline(backing)).unwrap()
    }

    fn raw(buffer: &Buffer) -> String {
        render_outline(buffer.change_tree()).unwrap()
    }

    fn resolved(buffer: &Buffer) -> String {
        render_outline(buffer).unwrap()
    }

    const BACKING: &str = "r{a{b},c{d{e}}}";

    #[test]
    fn fresh_buffer_shows_the_backing_tree() {
        let buffer = buffer(BACKING);
        assert_eq!(raw(&buffer), "r*");
        assert!(buffer.deletia().is_empty());
        assert!(tree_eq::<String>(&buffer, buffer.backing()).unwrap());
        assert_eq!(buffer.parent(&k("e")).unwrap(), Some(k("d")));
    }

    #[test]
    fn edits_open_only_the_path_they_reach() {
        let mut buffer = buffer(BACKING);
        assert!(buffer.update(&k("e"), lit("E")).unwrap());
        assert_eq!(raw(&buffer), "r'{a*,c'{d'{e:E}}}");
        assert_eq!(resolved(&buffer), "r{a{b},c{d{e:E}}}");
    }

    #[test]
    fn expand_without_children_keeps_the_node_shared() {
        let mut buffer = buffer(BACKING);
        buffer.expand(&k("d"), false).unwrap();
        assert_eq!(raw(&buffer), "r'{a*,c'{d*}}");
        buffer.expand(&k("d"), true).unwrap();
        assert_eq!(raw(&buffer), "r'{a*,c'{d'{e*}}}");
        assert_eq!(
            buffer.expand(&k("zz"), true).unwrap_err(),
            TreeError::NotFound(k("zz"))
        );
    }

    #[test]
    fn unchanged_content_keeps_the_node_reference() {
        let mut buffer = buffer(BACKING);
        assert!(!buffer.update(&k("d"), lit("d")).unwrap());
        assert_eq!(raw(&buffer), "r'{a*,c'{d'{e*}}}");

        let config = BufferConfig::default().with_update_loads_content(true);
        let mut buffer = Buffer::with_config(outline(BACKING), config).unwrap();
        assert!(!buffer.update(&k("d"), lit("d")).unwrap());
        assert_eq!(raw(&buffer), "r'{a*,c'{d{e*}}}");
    }

    #[test]
    fn insert_checks_keys_and_parents() {
        let mut buffer = buffer(BACKING);
        let err = buffer
            .insert(&k("a"), Position::Natural, Some(k("e")), lit("x"))
            .unwrap_err();
        assert!(err.is_invalid_argument());
        let err = buffer
            .insert(&k("zz"), Position::Natural, Some(k("x")), lit("x"))
            .unwrap_err();
        assert_eq!(err, TreeError::NotFound(k("zz")));

        let key = buffer
            .insert(&k("b"), Position::Natural, AUTO_KEY, lit("gen"))
            .unwrap();
        assert_eq!(key, Key::id(1_000_000));
        assert_eq!(buffer.children(&k("b")).unwrap(), vec![key]);
    }

    #[test]
    fn root_cannot_be_deleted_or_moved() {
        let mut buffer = buffer(BACKING);
        assert!(buffer.delete(&k("r")).unwrap_err().is_invalid_argument());
        assert!(buffer
            .move_node(&k("r"), &k("a"), Position::Natural)
            .unwrap_err()
            .is_invalid_argument());
    }

    #[test]
    fn cyclic_move_is_rejected() {
        let mut buffer = buffer(BACKING);
        let err = buffer
            .move_node(&k("c"), &k("e"), Position::Natural)
            .unwrap_err();
        assert!(err.is_invalid_argument());
        assert_eq!(raw(&buffer), "r*");
    }

    #[test]
    fn move_keeps_shared_subtrees() {
        let mut buffer = buffer(BACKING);
        buffer.move_node(&k("d"), &k("a"), Position::At(0)).unwrap();
        assert_eq!(resolved(&buffer), "r{a{d{e},b},c}");
        assert_eq!(raw(&buffer), "r'{a'{d*,b*},c'}");
        assert!(buffer.deletia().is_empty());
    }

    #[test]
    fn delete_records_shared_subtrees_as_roots() {
        let mut buffer = buffer(BACKING);
        buffer.delete(&k("c")).unwrap();
        assert_eq!(buffer.deletia().roots(), &set(&["c"]));
        assert!(buffer.deletia().nodes().is_empty());
        assert!(!buffer.contains(&k("d")));
        assert!(buffer.is_deleted(&k("d")));
        assert!(!buffer.is_deleted(&k("b")));
    }

    #[test]
    fn delete_records_opened_nodes_individually() {
        let mut buffer = buffer(BACKING);
        buffer.update(&k("d"), lit("D")).unwrap();
        buffer.delete(&k("c")).unwrap();
        assert_eq!(buffer.deletia().roots(), &set(&["e"]));
        assert_eq!(buffer.deletia().nodes(), &set(&["c", "d"]));
        assert_eq!(resolved(&buffer), "r{a{b}}");
    }

    #[test]
    fn tree_reference_brings_a_deleted_subtree_back() {
        let mut buffer = buffer(BACKING);
        buffer.delete(&k("c")).unwrap();
        buffer
            .insert(&k("b"), Position::Natural, Some(k("c")), Payload::TreeRef(k("c")))
            .unwrap();
        assert!(buffer.deletia().is_empty());
        assert_eq!(resolved(&buffer), "r{a{b{c{d{e}}}}}");
    }

    #[test]
    fn node_reference_brings_back_content_only() {
        let mut buffer = buffer(BACKING);
        buffer.delete(&k("c")).unwrap();
        buffer
            .insert(&k("a"), Position::Natural, Some(k("c")), Payload::NodeRef(k("c")))
            .unwrap();
        assert_eq!(buffer.deletia().roots(), &set(&["d"]));
        assert_eq!(resolved(&buffer), "r{a{b,c}}");
        assert!(buffer.is_deleted(&k("e")));
    }

    #[test]
    fn literal_with_a_backing_key_is_resurrected() {
        let mut buffer = buffer(BACKING);
        buffer.delete(&k("c")).unwrap();
        buffer
            .insert(&k("a"), Position::Natural, Some(k("c")), lit("C"))
            .unwrap();
        assert_eq!(buffer.deletia().roots(), &set(&["d"]));
        buffer
            .insert(&k("c"), Position::Natural, Some(k("d")), lit("D"))
            .unwrap();
        assert_eq!(buffer.deletia().roots(), &set(&["e"]));
        assert!(buffer.deletia().nodes().is_empty());
        assert_eq!(resolved(&buffer), "r{a{b,c:C{d:D}}}");
    }

    #[test]
    fn references_must_target_their_own_key() {
        let mut buffer = buffer(BACKING);
        buffer.delete(&k("c")).unwrap();
        let err = buffer
            .insert(&k("a"), Position::Natural, Some(k("x")), Payload::TreeRef(k("c")))
            .unwrap_err();
        assert!(err.is_invalid_argument());
        let err = buffer
            .update(&k("a"), Payload::NodeRef(k("b")))
            .unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn tree_reference_may_not_duplicate_a_live_node() {
        let mut buffer = buffer(BACKING);
        buffer.move_node(&k("e"), &k("a"), Position::Natural).unwrap();
        buffer.delete(&k("c")).unwrap();
        let err = buffer
            .insert(&k("r"), Position::Natural, Some(k("c")), Payload::TreeRef(k("c")))
            .unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(buffer.contains(&k("e")));
    }

    #[test]
    fn update_to_tree_reference_restores_the_backing_subtree() {
        let mut buffer = buffer(BACKING);
        buffer.update(&k("e"), lit("E")).unwrap();
        buffer.move_node(&k("a"), &k("d"), Position::Natural).unwrap();
        assert_eq!(resolved(&buffer), "r{c{d{e:E,a{b}}}}");

        assert!(buffer.update(&k("c"), Payload::TreeRef(k("c"))).unwrap());
        assert_eq!(raw(&buffer), "r'{c*}");
        assert_eq!(resolved(&buffer), "r{c{d{e}}}");
        assert_eq!(buffer.deletia().roots(), &set(&["a"]));
        assert!(buffer.deletia().nodes().is_empty());

        assert!(!buffer.update(&k("c"), Payload::TreeRef(k("c"))).unwrap());
        assert!(!buffer.update(&k("d"), Payload::TreeRef(k("d"))).unwrap());
    }

    #[test]
    fn update_to_tree_reference_may_not_duplicate_a_live_node() {
        let mut buffer = buffer(BACKING);
        buffer.move_node(&k("e"), &k("a"), Position::Natural).unwrap();
        let err = buffer
            .update(&k("c"), Payload::TreeRef(k("c")))
            .unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn reset_drops_every_edit() {
        let mut buffer = buffer(BACKING);
        buffer.delete(&k("a")).unwrap();
        buffer.update(&k("e"), lit("E")).unwrap();
        buffer.reset();
        assert_eq!(raw(&buffer), "r*");
        assert!(buffer.deletia().is_empty());
    }

    #[test]
    fn custom_root_key() {
        let config = BufferConfig::default().with_root_key(k("top"));
        let mut buffer = Buffer::with_config(outline(BACKING), config).unwrap();
        assert_eq!(buffer.root(), Some(k("top")));
        assert!(!buffer.contains(&k("r")));
        assert_eq!(buffer.parent(&k("a")).unwrap(), Some(k("top")));
        buffer.update(&k("b"), lit("B")).unwrap();
        assert_eq!(raw(&buffer), "top'r{a'{b:B},c*}");
    }

    #[test]
    fn empty_backing_is_rejected() {
        let err = Buffer::new(MemTree::new()).err().unwrap();
        assert!(err.is_invalid_argument());
    }

    #[derive(Debug)]
    struct Prefixed;

    impl KeyMap for Prefixed {
        fn back_key(&self, front: &Key) -> Option<Key> {
            front.as_name()?.strip_prefix("f.").map(Key::name)
        }

        fn front_key(&self, back: &Key) -> Option<Key> {
            back.as_name().map(|name| Key::name(format!("f.{name}")))
        }
    }

    #[test]
    fn key_map_translates_between_key_spaces() {
        let mut buffer =
            Buffer::with_keymap(outline(BACKING), Prefixed, BufferConfig::default()).unwrap();
        assert_eq!(buffer.root(), Some(k("f.r")));
        assert!(buffer.contains(&k("f.e")));
        assert!(!buffer.contains(&k("e")));
        buffer.update(&k("f.e"), lit("E")).unwrap();
        assert_eq!(raw(&buffer), "f.r'r{f.a*a,f.c'c{f.d'd{f.e:E}}}");
        buffer.delete(&k("f.a")).unwrap();
        assert_eq!(buffer.deletia().roots(), &set(&["a"]));
    }

    #[test]
    fn natural_position_follows_child_order() {
        let config = BufferConfig::default().with_child_order(ChildOrder::ByKey);
        let mut buffer = Buffer::with_config(outline("r{b,d}"), config).unwrap();
        buffer
            .insert(&k("r"), Position::Natural, Some(k("c")), lit("c"))
            .unwrap();
        assert_eq!(resolved(&buffer), "r{b,c,d}");
    }

    #[test]
    fn apply_reproduces_an_edited_buffer() {
        let mut edited = buffer(BACKING);
        edited.update(&k("e"), lit("E")).unwrap();
        edited.move_node(&k("b"), &k("c"), Position::At(0)).unwrap();
        edited.delete(&k("a")).unwrap();
        edited
            .insert(&k("d"), Position::Natural, Some(k("n")), lit("N"))
            .unwrap();

        let snapshot = MemTree::copy_of(edited.change_tree()).unwrap();
        let mut fresh = buffer(BACKING);
        fresh.apply(&snapshot).unwrap();
        assert_eq!(find_mismatch::<String>(&fresh, &edited).unwrap(), None);
        for key in edited.backing().keys().unwrap() {
            assert_eq!(fresh.is_deleted(&key), edited.is_deleted(&key), "{key}");
        }

        fresh.apply(&snapshot).unwrap();
        assert_eq!(find_mismatch::<String>(&fresh, &edited).unwrap(), None);
    }

    #[test]
    fn apply_of_an_untouched_change_tree_stays_shared() {
        let mut buffer = buffer(BACKING);
        let snapshot = MemTree::copy_of(buffer.change_tree()).unwrap();
        buffer.apply(&snapshot).unwrap();
        assert_eq!(raw(&buffer), "r*");
        assert!(buffer.deletia().is_empty());
    }

    #[test]
    fn apply_computes_deletion_sets() {
        let mut buffer = buffer("r{a{b,c},d{e}}");
        buffer.apply(&outline("r'{a'{c*},x}")).unwrap();
        assert_eq!(resolved(&buffer), "r{a{c},x}");
        assert_eq!(buffer.deletia().roots(), &set(&["b", "d"]));
        assert!(buffer.deletia().nodes().is_empty());
        assert!(buffer.is_deleted(&k("e")));
    }

    #[test]
    fn apply_keeps_children_of_reinserted_keys_deleted() {
        let mut edited = buffer("r{a{b{c}}}");
        edited.delete(&k("a")).unwrap();
        edited
            .insert(&k("r"), Position::Natural, Some(k("b")), lit("B"))
            .unwrap();
        assert!(edited.is_deleted(&k("c")));

        let snapshot = MemTree::copy_of(edited.change_tree()).unwrap();
        let mut fresh = buffer("r{a{b{c}}}");
        fresh.apply(&snapshot).unwrap();
        assert_eq!(resolved(&fresh), "r{b:B}");
        assert_eq!(fresh.deletia().roots(), &set(&["a", "c"]));
        for key in ["a", "b", "c"] {
            assert_eq!(fresh.is_deleted(&k(key)), edited.is_deleted(&k(key)), "{key}");
        }
    }

    #[test]
    fn tree_ref_resurrection_clears_finer_deletions() {
        let mut buffer = buffer("r{a{b{c,d}},e}");
        buffer.delete(&k("a")).unwrap();
        buffer
            .insert(&k("r"), Position::Natural, Some(k("b")), Payload::NodeRef(k("b")))
            .unwrap();
        assert_eq!(buffer.deletia().roots(), &set(&["a", "c", "d"]));
        buffer.delete(&k("b")).unwrap();
        assert_eq!(buffer.deletia().nodes(), &set(&["b"]));

        buffer
            .insert(&k("r"), Position::At(0), Some(k("a")), Payload::TreeRef(k("a")))
            .unwrap();
        assert!(buffer.deletia().is_empty());
        assert_eq!(resolved(&buffer), "r{a{b{c,d}},e}");
    }

    #[test]
    fn apply_rejects_misaligned_and_missing_references() {
        let mut buffer = buffer(BACKING);
        let err = buffer.apply(&outline("r'{x*a}")).unwrap_err();
        assert!(err.is_invalid_argument());
        let err = buffer.apply(&outline("r'{zz*}")).unwrap_err();
        assert!(err.is_not_found());
    }

    /// Change tree that only takes single edits.
    struct NoBatch(MemTree<String>);

    impl IdAddressable<String> for NoBatch {
        fn root(&self) -> Option<Key> {
            self.0.root()
        }

        fn contains(&self, key: &Key) -> bool {
            self.0.contains(key)
        }

        fn payload(&self, key: &Key) -> Option<Payload<&String>> {
            self.0.payload(key)
        }

        fn parent(&self, key: &Key) -> TreeResult<Option<Key>> {
            self.0.parent(key)
        }

        fn children(&self, key: &Key) -> TreeResult<Vec<Key>> {
            self.0.children(key)
        }
    }

    impl MutableRefTree<String> for NoBatch {
        fn insert(
            &mut self,
            parent: &Key,
            pos: Position,
            key: Option<Key>,
            payload: Payload<String>,
        ) -> TreeResult<Key> {
            self.0.insert(parent, pos, key, payload)
        }

        fn delete(&mut self, key: &Key) -> TreeResult<()> {
            self.0.delete(key)
        }

        fn move_node(&mut self, key: &Key, parent: &Key, pos: Position) -> TreeResult<Key> {
            self.0.move_node(key, parent, pos)
        }

        fn update(&mut self, key: &Key, payload: Payload<String>) -> TreeResult<bool> {
            self.0.update(key, payload)
        }
    }

    impl ChangeTree<String> for NoBatch {
        fn reroot(&mut self, key: Key, payload: Payload<String>) {
            self.0.reroot(key, payload);
        }
    }

    #[test]
    fn apply_without_batch_support_replays_edits() {
        let mut buffer: ChangeBuffer<String, _, NoBatch> = ChangeBuffer::with_change_tree(
            NoBatch(MemTree::new()),
            outline(BACKING),
            IDENTITY,
            BufferConfig::default(),
        )
        .unwrap();
        let tree = outline("r'{c'{d'{e:E},b:B},a'}");
        buffer.apply(&tree).unwrap();
        assert_eq!(render_outline(&buffer).unwrap(), "r{c{d{e:E},b:B},a}");
        assert!(buffer.deletia().is_empty());
    }
}
