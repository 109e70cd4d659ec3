//! Change-buffer configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use reftree_core::ChildOrder;
use reftree_types::Key;

use crate::error::ConfigResult;

/// First key handed out for [`AUTO_KEY`](reftree_types::AUTO_KEY) inserts.
pub const DEFAULT_FIRST_AUTO_KEY: u64 = 1_000_000;

/// Settings of a [`ChangeBuffer`](crate::ChangeBuffer).
///
/// ```toml
/// root_key = "root"
/// child_order = "by-key"
/// update_loads_content = true
/// first_auto_key = 500
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Key of the change-tree root. `None` uses the front key of the backing
    /// root.
    pub root_key: Option<Key>,
    /// Where [`Position::Natural`](reftree_types::Position::Natural) places
    /// a node in the change tree.
    pub child_order: ChildOrder,
    /// When an update leaves a node reference's content unchanged, copy the
    /// backing content in instead of keeping the reference.
    pub update_loads_content: bool,
    /// First value of the key generator for generated keys.
    pub first_auto_key: u64,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            root_key: None,
            child_order: ChildOrder::Append,
            update_loads_content: false,
            first_auto_key: DEFAULT_FIRST_AUTO_KEY,
        }
    }
}

impl BufferConfig {
    /// Parse TOML text; absent fields keep their defaults.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Use `key` as the front key of the root.
    pub fn with_root_key(mut self, key: Key) -> Self {
        self.root_key = Some(key);
        self
    }

    /// Placement for natural inserts into the change tree.
    pub fn with_child_order(mut self, order: ChildOrder) -> Self {
        self.child_order = order;
        self
    }

    /// Whether an update may turn a changed node back into a node reference.
    pub fn with_update_loads_content(mut self, enabled: bool) -> Self {
        self.update_loads_content = enabled;
        self
    }
}
