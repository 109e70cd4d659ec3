//! Node payloads and sibling positions.

use serde::{Deserialize, Serialize};

use crate::key::Key;

/// What a node carries.
///
/// A node holds either its own content or a reference into the backing tree.
/// A tree reference stands for the whole backing subtree at its target and
/// therefore has no children of its own. A node reference borrows only the
/// target's content; its children are listed explicitly.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Payload<C> {
    Literal(C),
    TreeRef(Key),
    NodeRef(Key),
}

impl<C> Payload<C> {
    /// Whether the node carries its own content.
    pub fn is_literal(&self) -> bool {
        matches!(self, Self::Literal(_))
    }

    /// Whether the node borrows from the backing tree.
    pub fn is_reference(&self) -> bool {
        !self.is_literal()
    }

    /// Whether the node stands for a whole backing subtree.
    pub fn is_tree_ref(&self) -> bool {
        matches!(self, Self::TreeRef(_))
    }

    /// Whether the node borrows only backing content.
    pub fn is_node_ref(&self) -> bool {
        matches!(self, Self::NodeRef(_))
    }

    /// The referenced back key, for references.
    pub fn target(&self) -> Option<&Key> {
        match self {
            Self::Literal(_) => None,
            Self::TreeRef(key) | Self::NodeRef(key) => Some(key),
        }
    }

    /// The payload as a [`Reference`], for references.
    pub fn reference(&self) -> Option<Reference> {
        match self {
            Self::Literal(_) => None,
            Self::TreeRef(key) => Some(Reference::Tree(key.clone())),
            Self::NodeRef(key) => Some(Reference::Node(key.clone())),
        }
    }

    /// Borrow the content.
    pub fn as_ref(&self) -> Payload<&C> {
        match self {
            Self::Literal(content) => Payload::Literal(content),
            Self::TreeRef(key) => Payload::TreeRef(key.clone()),
            Self::NodeRef(key) => Payload::NodeRef(key.clone()),
        }
    }

    /// The content of a literal.
    pub fn into_literal(self) -> Option<C> {
        match self {
            Self::Literal(content) => Some(content),
            _ => None,
        }
    }

    /// Transform the content of a literal.
    pub fn map<D>(self, f: impl FnOnce(C) -> D) -> Payload<D> {
        match self {
            Self::Literal(content) => Payload::Literal(f(content)),
            Self::TreeRef(key) => Payload::TreeRef(key),
            Self::NodeRef(key) => Payload::NodeRef(key),
        }
    }
}

impl<C: Clone> Payload<&C> {
    /// Clone borrowed content.
    pub fn cloned(self) -> Payload<C> {
        self.map(C::clone)
    }
}

/// A reference payload without content.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Reference {
    /// The whole backing subtree.
    Tree(Key),
    /// The backing node's content only.
    Node(Key),
}

impl Reference {
    /// The referenced back key.
    pub fn target(&self) -> &Key {
        match self {
            Self::Tree(key) | Self::Node(key) => key,
        }
    }

    /// Whether this is a tree reference.
    pub fn is_tree(&self) -> bool {
        matches!(self, Self::Tree(_))
    }
}

impl<C> From<Reference> for Payload<C> {
    fn from(reference: Reference) -> Self {
        match reference {
            Reference::Tree(key) => Payload::TreeRef(key),
            Reference::Node(key) => Payload::NodeRef(key),
        }
    }
}

/// Where a node lands among its new siblings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    /// The tree's own placement policy (append, or key order).
    #[default]
    Natural,
    /// Zero-based index in the child list after insertion.
    At(usize),
}
