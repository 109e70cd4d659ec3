//! Transparent reference resolution.
//!
//! A [`Resolver`] reads a raw front tree as if every reference in it had
//! been replaced by the backing tree's nodes:
//!
//! - a node present in the front tree answers from the front, except that a
//!   reference's content comes from its backing target;
//! - a tree reference's children are its target's backing children, named
//!   through the key map;
//! - a key absent from the front tree is found in the backing tree when it
//!   lies under a front tree reference and is not tombstoned.

use reftree_types::{Key, KeyMap, Payload, TreeError, TreeResult, IDENTITY};

use crate::traits::IdAddressable;

/// Deletion hook consulted for backing keys that the front tree does not
/// hold itself.
pub trait Tombstones<C> {
    fn is_deleted(&self, view: &Resolver<'_, C>, back_key: &Key) -> bool;
}

/// Nothing is deleted.
impl<C> Tombstones<C> for () {
    fn is_deleted(&self, _view: &Resolver<'_, C>, _back_key: &Key) -> bool {
        false
    }
}

/// Borrowed resolved view over a front tree and a backing tree.
pub struct Resolver<'a, C> {
    front: &'a dyn IdAddressable<C>,
    back: &'a dyn IdAddressable<C>,
    keymap: &'a dyn KeyMap,
    tombstones: &'a dyn Tombstones<C>,
}

impl<'a, C> Resolver<'a, C> {
    /// Resolve `front` against `back` with nothing deleted.
    pub fn new(
        front: &'a dyn IdAddressable<C>,
        back: &'a dyn IdAddressable<C>,
        keymap: &'a dyn KeyMap,
    ) -> Self {
        Self {
            front,
            back,
            keymap,
            tombstones: &(),
        }
    }

    /// Hide the backing keys `tombstones` reports deleted.
    pub fn with_tombstones(mut self, tombstones: &'a dyn Tombstones<C>) -> Self {
        self.tombstones = tombstones;
        self
    }

    /// The front tree.
    pub fn front(&self) -> &'a dyn IdAddressable<C> {
        self.front
    }

    /// The backing tree.
    pub fn back(&self) -> &'a dyn IdAddressable<C> {
        self.back
    }

    /// Translation between front and back keys.
    pub fn keymap(&self) -> &'a dyn KeyMap {
        self.keymap
    }

    /// Back key for a front key.
    pub fn back_key(&self, front: &Key) -> Option<Key> {
        self.keymap.back_key(front)
    }

    /// Front key for a back key.
    pub fn front_key(&self, back: &Key) -> Option<Key> {
        self.keymap.front_key(back)
    }

    /// Whether the front tree holds the node for a backing key.
    pub fn is_live(&self, back: &Key) -> bool {
        self.front_key(back)
            .is_some_and(|front| self.front.contains(&front))
    }

    /// Whether a backing key is gone: absent from the backing tree or
    /// tombstoned.
    pub fn is_deleted(&self, back: &Key) -> bool {
        !self.back.contains(back) || self.tombstones.is_deleted(self, back)
    }

    /// Whether the nearest front-held ancestor of a backing key is a tree
    /// reference to that ancestor.
    ///
    /// A backing key whose ancestry cannot be read is not covered, so reads
    /// report it as absent.
    fn is_covered(&self, back: &Key) -> bool {
        let mut cursor = match self.back.parent(back) {
            Ok(parent) => parent,
            Err(_) => return false,
        };
        while let Some(ancestor) = cursor {
            let Some(front) = self.front_key(&ancestor) else {
                return false;
            };
            if let Some(payload) = self.front.payload(&front) {
                return matches!(payload, Payload::TreeRef(target) if target == ancestor);
            }
            cursor = match self.back.parent(&ancestor) {
                Ok(parent) => parent,
                Err(_) => return false,
            };
        }
        false
    }

    /// Back key of a front key that only the backing tree holds.
    fn backed(&self, front: &Key) -> Option<Key> {
        if self.front.contains(front) {
            return None;
        }
        let back = self.back_key(front)?;
        if self.is_deleted(&back) || !self.is_covered(&back) {
            return None;
        }
        Some(back)
    }

    fn to_front(&self, back: Key) -> TreeResult<Key> {
        self.front_key(&back).ok_or(TreeError::NotFound(back))
    }

    fn back_children(&self, back: &Key) -> TreeResult<Vec<Key>> {
        self.back
            .children(back)?
            .into_iter()
            .map(|child| self.to_front(child))
            .collect()
    }

    /// Root of the resolved tree, the front root.
    pub fn root(&self) -> Option<Key> {
        self.front.root()
    }

    /// Whether the resolved tree holds `key`.
    pub fn contains(&self, key: &Key) -> bool {
        self.front.contains(key) || self.backed(key).is_some()
    }

    /// Resolved payload; references read through to backing content.
    pub fn payload(&self, key: &Key) -> Option<Payload<&'a C>> {
        let front = self.front;
        let back = self.back;
        match front.payload(key) {
            Some(Payload::Literal(content)) => Some(Payload::Literal(content)),
            Some(Payload::NodeRef(target)) => back.payload(&target).map(content_only),
            Some(Payload::TreeRef(target)) => back.payload(&target),
            None => back.payload(&self.backed(key)?),
        }
    }

    /// Resolved parent of `key`.
    pub fn parent(&self, key: &Key) -> TreeResult<Option<Key>> {
        if self.front.contains(key) {
            return self.front.parent(key);
        }
        let back = self.backed(key).ok_or_else(|| TreeError::not_found(key))?;
        self.back
            .parent(&back)?
            .map(|parent| self.to_front(parent))
            .transpose()
    }

    /// Resolved children of `key`, in order.
    pub fn children(&self, key: &Key) -> TreeResult<Vec<Key>> {
        match self.front.payload(key) {
            Some(Payload::TreeRef(target)) => self.back_children(&target),
            Some(_) => self.front.children(key),
            None => {
                let back = self.backed(key).ok_or_else(|| TreeError::not_found(key))?;
                self.back_children(&back)
            }
        }
    }
}

/// A node reference borrows content only.
fn content_only<C>(payload: Payload<C>) -> Payload<C> {
    match payload {
        Payload::TreeRef(target) => Payload::NodeRef(target),
        other => other,
    }
}

impl<C> IdAddressable<C> for Resolver<'_, C> {
    fn root(&self) -> Option<Key> {
        Resolver::root(self)
    }

    fn contains(&self, key: &Key) -> bool {
        Resolver::contains(self, key)
    }

    fn payload(&self, key: &Key) -> Option<Payload<&C>> {
        Resolver::payload(self, key)
    }

    fn parent(&self, key: &Key) -> TreeResult<Option<Key>> {
        Resolver::parent(self, key)
    }

    fn children(&self, key: &Key) -> TreeResult<Vec<Key>> {
        Resolver::children(self, key)
    }
}

/// Owned resolved view: a front reftree read through its backing tree.
#[derive(Debug)]
pub struct DerefTree<F, B> {
    front: F,
    back: B,
    keymap: Box<dyn KeyMap>,
}

impl<F, B> DerefTree<F, B> {
    /// Resolve with both trees in the same key space.
    pub fn new(front: F, back: B) -> Self {
        Self::with_keymap(front, back, IDENTITY)
    }

    /// Resolve with front keys translated through `keymap`.
    pub fn with_keymap(front: F, back: B, keymap: impl KeyMap + 'static) -> Self {
        Self {
            front,
            back,
            keymap: Box::new(keymap),
        }
    }

    /// The front tree.
    pub fn front(&self) -> &F {
        &self.front
    }

    /// The backing tree.
    pub fn back(&self) -> &B {
        &self.back
    }

    /// Give back both trees.
    pub fn into_parts(self) -> (F, B) {
        (self.front, self.back)
    }

    /// Borrowed view for reads.
    pub fn resolver<C>(&self) -> Resolver<'_, C>
    where
        F: IdAddressable<C>,
        B: IdAddressable<C>,
    {
        Resolver::new(&self.front, &self.back, self.keymap.as_ref())
    }
}

impl<C, F, B> IdAddressable<C> for DerefTree<F, B>
where
    F: IdAddressable<C>,
    B: IdAddressable<C>,
{
    fn root(&self) -> Option<Key> {
        self.front.root()
    }

    fn contains(&self, key: &Key) -> bool {
        self.resolver::<C>().contains(key)
    }

    fn payload(&self, key: &Key) -> Option<Payload<&C>> {
        self.resolver::<C>().payload(key)
    }

    fn parent(&self, key: &Key) -> TreeResult<Option<Key>> {
        self.resolver::<C>().parent(key)
    }

    fn children(&self, key: &Key) -> TreeResult<Vec<Key>> {
        self.resolver::<C>().children(key)
    }
}
