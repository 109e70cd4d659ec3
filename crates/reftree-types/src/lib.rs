//! Foundation types for reference-sharing trees.
//!
//! A reftree is an ordered tree of keyed nodes in which a node may stand for
//! content held by another, backing, tree. Every other `reftree-*` crate
//! depends on `reftree-types`.
//!
//! # Key Types
//!
//! - [`Key`]: Opaque, ordered node identifier, stable across versions
//! - [`KeyGen`]: Explicit generator for fresh keys
//! - [`Payload`]: Literal content, a tree reference, or a node reference
//! - [`Position`]: Placement of a node among its siblings
//! - [`KeyMap`]: Translation between front (change) and back (backing) keys
//! - [`TreeError`]: Error taxonomy shared by all tree operations

pub mod error;
pub mod key;
pub mod keymap;
pub mod payload;

pub use error::{TreeError, TreeResult};
pub use key::{Key, KeyGen, AUTO_KEY};
pub use keymap::{IdentityMap, KeyMap, ReverseMap, Unmappable, IDENTITY, UNMAPPABLE};
pub use payload::{Payload, Position, Reference};
