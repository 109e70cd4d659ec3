//! Reftree core: the tree interfaces, an in-memory mutable tree, and the
//! resolver that reads a reference-bearing front tree through its backing
//! tree.
//!
//! # Architecture
//!
//! - A **raw** tree reports payloads as stored: literal content or a
//!   reference to a backing key.
//! - A **resolved** view ([`Resolver`], [`DerefTree`]) answers every read as
//!   if all references had been copied in: a tree reference exposes the
//!   backing subtree, a node reference exposes the backing content with the
//!   front node's own children.
//! - Edits go through [`MutableRefTree`]; trees that can take a whole new
//!   version at once also implement [`BatchMutable`].
//!
//! # Modules
//!
//! - [`traits`]: [`IdAddressable`], [`MutableRefTree`], [`BatchMutable`], [`ChangeTree`]
//! - [`memory`]: [`MemTree`], the default mutable reftree
//! - [`resolve`]: [`Resolver`], [`DerefTree`], and the [`Tombstones`] hook
//! - [`compare`]: Structural equality after resolution
//! - [`outline`]: Compact text notation for fixtures and diagnostics

pub mod compare;
pub mod memory;
pub mod outline;
pub mod resolve;
pub mod traits;

pub use compare::{find_mismatch, subtree_mismatch, tree_eq, Mismatch};
pub use memory::{ChildOrder, MemTree};
pub use outline::{parse_outline, render_outline};
pub use resolve::{DerefTree, Resolver, Tombstones};
pub use traits::{BatchMutable, ChangeTree, IdAddressable, MutableRefTree};
