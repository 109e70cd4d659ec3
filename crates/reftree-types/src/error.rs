//! Error taxonomy shared by all tree operations.

use thiserror::Error;

use crate::key::Key;

/// Errors raised by reftree reads and edits.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TreeError {
    /// A key, reference target, or backing ancestor is absent.
    #[error("not found: {0}")]
    NotFound(Key),

    /// The operation is structurally illegal: key collision, root move or
    /// delete, cyclic move, malformed reference, position out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An internal invariant did not hold.
    #[error("internal consistency violation: {0}")]
    Internal(String),
}

impl TreeError {
    /// `NotFound` for a borrowed key.
    pub fn not_found(key: &Key) -> Self {
        Self::NotFound(key.clone())
    }

    /// `InvalidArgument` with a reason.
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidArgument(reason.into())
    }

    /// `Internal` with a reason.
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal(reason.into())
    }

    /// Key collision on insert.
    pub fn duplicate(key: &Key) -> Self {
        Self::InvalidArgument(format!("key {key} is already in the tree"))
    }

    /// Whether this is `NotFound`.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Whether this is `InvalidArgument`.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }

    /// The missing key, for `NotFound`.
    pub fn missing_key(&self) -> Option<&Key> {
        match self {
            Self::NotFound(key) => Some(key),
            _ => None,
        }
    }
}

/// Convenience type alias for tree operations.
pub type TreeResult<T> = std::result::Result<T, TreeError>;
