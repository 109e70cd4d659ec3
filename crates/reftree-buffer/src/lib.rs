//! Change buffer over a backing reftree.
//!
//! A [`ChangeBuffer`] presents a backing tree as a mutable tree. Edits are
//! kept in a change tree that holds only the nodes the edits touched, plus
//! the path to them; everything else is a tree reference into the backing
//! tree. Removed backing content is tracked in a [`Deletia`] so that reads
//! never see it.
//!
//! ```
//! use reftree_buffer::ChangeBuffer;
//! use reftree_core::{parse_outline, render_outline, IdAddressable, MutableRefTree};
//! use reftree_types::{Key, Payload};
//!
//! let backing = parse_outline("r{a{b},c{d}}").unwrap();
//! let mut buffer: ChangeBuffer<String, _> = ChangeBuffer::new(backing).unwrap();
//! buffer.update(&Key::name("d"), Payload::Literal("D".to_string())).unwrap();
//! assert_eq!(render_outline(&buffer).unwrap(), "r{a{b},c{d:D}}");
//! assert_eq!(render_outline(buffer.change_tree()).unwrap(), "r'{a*,c'{d:D}}");
//! assert!(buffer.contains(&Key::name("b")));
//! ```
//!
//! # Modules
//!
//! - [`buffer`]: [`ChangeBuffer`]
//! - [`deletia`]: [`Deletia`], the deleted backing keys
//! - [`config`]: [`BufferConfig`], loadable from TOML
//! - [`error`]: [`ConfigError`]

pub mod buffer;
pub mod config;
pub mod deletia;
pub mod error;

#[cfg(test)]
mod laps;

pub use buffer::ChangeBuffer;
pub use config::{BufferConfig, DEFAULT_FIRST_AUTO_KEY};
pub use deletia::Deletia;
pub use error::{ConfigError, ConfigResult};
