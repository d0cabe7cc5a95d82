//! Unified error types for the Trellis dispatch engine.
//!
//! Two error families live here:
//!
//! - [`DispatchError`] - the value threaded through continuations while a
//!   dispatch is in flight. Once one is raised, only error handlers run
//!   until some handler consumes it.
//! - [`RouterError`] - build-time violations of the mount tree rules.

use std::str::Utf8Error;

use thiserror::Error;

// =============================================================================
// Dispatch Errors
// =============================================================================

/// The error value carried by an in-flight dispatch.
///
/// A `DispatchError` is what handlers pass to their continuation (or return
/// from their future) to signal failure. It is cheap to clone because the
/// same value travels through every remaining frame of the dispatch tree.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    /// A captured path segment contained malformed percent-encoding.
    ///
    /// Raised only at capture-extraction time; carries the offending raw
    /// segment and the underlying decode failure.
    #[error("bad request: malformed path segment '{raw}'")]
    Decode {
        /// The raw, still-encoded segment that failed to decode.
        raw: String,
        /// The decoding failure.
        #[source]
        source: Utf8Error,
    },

    /// A handler or parameter precondition reported failure.
    #[error("{0}")]
    Handler(String),
}

impl DispatchError {
    /// Creates a handler failure from any displayable message.
    pub fn message(msg: impl Into<String>) -> Self {
        Self::Handler(msg.into())
    }

    /// Returns `true` for the decode (client error) kind.
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }
}

impl From<&str> for DispatchError {
    fn from(msg: &str) -> Self {
        Self::Handler(msg.to_owned())
    }
}

impl From<String> for DispatchError {
    fn from(msg: String) -> Self {
        Self::Handler(msg)
    }
}

// =============================================================================
// Router Errors
// =============================================================================

/// Errors raised while building the router tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    /// The child router already has a parent; a router is mounted at most once.
    #[error("router is already mounted at '{subpath}'")]
    AlreadyMounted {
        /// The subpath the router was first mounted at.
        subpath: String,
    },

    /// Mounting the child would make it its own ancestor.
    #[error("mounting this router would create a cycle")]
    MountCycle,
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for in-flight dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// The completion value of a single handler invocation.
pub type HandlerResult = DispatchResult<()>;

/// Result type for router-building operations.
pub type RouterResult<T> = Result<T, RouterError>;
