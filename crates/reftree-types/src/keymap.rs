//! Translation between front keys and back keys.
//!
//! A change tree is keyed in its own ("front") key space; the tree it edits
//! ("back") may use another. A [`KeyMap`] translates in both directions and
//! may decline either way.

use std::fmt;

use crate::key::Key;

/// Bidirectional, partial translation of keys.
pub trait KeyMap: fmt::Debug {
    /// Back key for a front key, if one exists.
    fn back_key(&self, front: &Key) -> Option<Key>;

    /// Front key for a back key, if one exists.
    fn front_key(&self, back: &Key) -> Option<Key>;
}

/// Both key spaces are the same.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IdentityMap;

/// No key translates; every comparison with the back tree fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Unmappable;

/// Shared [`IdentityMap`].
pub const IDENTITY: IdentityMap = IdentityMap;
/// Shared [`Unmappable`].
pub const UNMAPPABLE: Unmappable = Unmappable;

/// Swaps the direction of the wrapped map.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReverseMap<M>(pub M);

impl KeyMap for IdentityMap {
    fn back_key(&self, front: &Key) -> Option<Key> {
        Some(front.clone())
    }

    fn front_key(&self, back: &Key) -> Option<Key> {
        Some(back.clone())
    }
}

impl KeyMap for Unmappable {
    fn back_key(&self, _front: &Key) -> Option<Key> {
        None
    }

    fn front_key(&self, _back: &Key) -> Option<Key> {
        None
    }
}

impl<M: KeyMap> KeyMap for ReverseMap<M> {
    fn back_key(&self, front: &Key) -> Option<Key> {
        self.0.front_key(front)
    }

    fn front_key(&self, back: &Key) -> Option<Key> {
        self.0.back_key(back)
    }
}

impl<M: KeyMap + ?Sized> KeyMap for &M {
    fn back_key(&self, front: &Key) -> Option<Key> {
        (**self).back_key(front)
    }

    fn front_key(&self, back: &Key) -> Option<Key> {
        (**self).front_key(back)
    }
}

impl<M: KeyMap + ?Sized> KeyMap for Box<M> {
    fn back_key(&self, front: &Key) -> Option<Key> {
        (**self).back_key(front)
    }

    fn front_key(&self, back: &Key) -> Option<Key> {
        (**self).front_key(back)
    }
}
