use std::fmt;

use serde::{Deserialize, Serialize};

/// Request a generated key on insert.
pub const AUTO_KEY: Option<Key> = None;

/// Opaque identifier of a tree node.
///
/// Keys are unique within one addressable tree and stable across versions of
/// the same logical node: a node keeps its key when it is moved, updated, or
/// expressed through a reference. Keys are either numeric ids or names; ids
/// order before names.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(Repr);

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
enum Repr {
    Id(u64),
    Name(String),
}

impl Key {
    /// Numeric key.
    pub fn id(id: u64) -> Self {
        Self(Repr::Id(id))
    }

    /// Named key.
    pub fn name(name: impl Into<String>) -> Self {
        Self(Repr::Name(name.into()))
    }

    /// The number of a numeric key.
    pub fn as_id(&self) -> Option<u64> {
        match &self.0 {
            Repr::Id(id) => Some(*id),
            Repr::Name(_) => None,
        }
    }

    /// The text of a named key.
    pub fn as_name(&self) -> Option<&str> {
        match &self.0 {
            Repr::Id(_) => None,
            Repr::Name(name) => Some(name),
        }
    }
}

impl From<u64> for Key {
    fn from(id: u64) -> Self {
        Self::id(id)
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Self::name(name)
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Self::name(name)
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Repr::Id(id) => write!(f, "Key({id})"),
            Repr::Name(name) => write!(f, "Key({name:?})"),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Repr::Id(id) => write!(f, "#{id}"),
            Repr::Name(name) => f.write_str(name),
        }
    }
}

/// Generator of fresh numeric keys.
///
/// Generators are plain values handed to the trees that need them; there is
/// no process-wide key source. A generator does not know which keys a tree
/// already holds, so callers skip collisions themselves.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyGen {
    next: u64,
}

impl KeyGen {
    /// Generator that starts at 1.
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Generator whose first key is `first`.
    pub fn starting_at(first: u64) -> Self {
        Self { next: first }
    }

    /// The key the next call to [`next_key`](Self::next_key) returns.
    pub fn peek(&self) -> Key {
        Key::id(self.next)
    }

    /// Hand out the next numeric key.
    pub fn next_key(&mut self) -> Key {
        let key = Key::id(self.next);
        self.next = self.next.wrapping_add(1);
        key
    }
}

impl Default for KeyGen {
    fn default() -> Self {
        Self::new()
    }
}
