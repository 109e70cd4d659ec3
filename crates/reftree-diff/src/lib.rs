//! Moving between literal trees and reference-sharing trees.
//!
//! - [`normalize`] decides, for several versions of a tree that share one
//!   backing tree, which backing subtrees each version can point at whole
//!   (tree references) and which backing nodes it can borrow content from
//!   (node references), such that no backing node is claimed whole by one
//!   version while another version changes it.
//! - [`expand_refs`] turns a reftree back into a fully literal tree.
//! - [`substitute_refs`] rewrites a tree to use the references normalize
//!   allowed; expanding the result gives back the original tree.
//! - [`apply_edits`] replays one tree onto a mutable tree through the four
//!   single-node edits.
//!
//! # Modules
//!
//! - [`normalize`]: [`normalize()`], [`RefSets`], [`Normalized`]
//! - [`expand`]: [`expand_refs`], [`substitute_refs`]
//! - [`apply`]: [`apply_edits`]

pub mod apply;
pub mod expand;
pub mod normalize;

pub use apply::apply_edits;
pub use expand::{expand_refs, substitute_refs};
pub use normalize::{normalize, Normalized, RefSets};
