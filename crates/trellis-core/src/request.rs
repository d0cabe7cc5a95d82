//! Request and response boundary views consumed by the dispatch core.
//!
//! The engine only ever reads these objects: the path and method (or event
//! type) drive matching, and the free-form context maps are passed through
//! untouched for handlers and boundary collaborators to communicate. All
//! per-dispatch state (merged parameters, route slot, base path) lives in the
//! per-frame context built by the router crate, never on the request itself.

use std::collections::HashMap;
use std::str::FromStr;

use parking_lot::RwLock;
use serde_json::Value;

// ============================================================================
// Method
// ============================================================================

/// The HTTP verbs a route can bind handlers for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET
    Get,
    /// PUT
    Put,
    /// DELETE
    Delete,
    /// POST
    Post,
}

impl Method {
    /// All verbs a route can carry, in declaration order.
    pub const ALL: [Method; 4] = [Method::Get, Method::Put, Method::Delete, Method::Post];

    /// The canonical upper-case name of the verb.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Post => "POST",
        }
    }
}

impl FromStr for Method {
    type Err = ();

    /// Parses a verb case-insensitively. Unknown verbs are an error, which
    /// callers treat the same as an absent verb: no exact-entry match.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "get" => Ok(Method::Get),
            "put" => Ok(Method::Put),
            "delete" => Ok(Method::Delete),
            "post" => Ok(Method::Post),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Context map
// ============================================================================

/// A free-form, lock-guarded map the core never touches.
///
/// Handlers use it to stash arbitrary state across a dispatch.
#[derive(Debug, Default)]
pub struct ContextMap {
    entries: RwLock<HashMap<String, Value>>,
}

impl ContextMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, replacing any previous entry for the key.
    pub fn insert(&self, key: impl Into<String>, value: Value) {
        self.entries.write().insert(key.into(), value);
    }

    /// Returns a clone of the value stored under `key`, if any.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().get(key).cloned()
    }

    /// Returns the number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` when no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Snapshots the whole map.
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.entries.read().clone()
    }
}

// ============================================================================
// HTTP request view
// ============================================================================

/// The immutable HTTP-shaped request view the engine dispatches on.
#[derive(Debug)]
pub struct HttpRequest {
    method: Option<Method>,
    path: String,
    context: ContextMap,
}

impl HttpRequest {
    /// Creates a request with a verb and path.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method: Some(method),
            path: path.into(),
            context: ContextMap::new(),
        }
    }

    /// Creates a request with no verb; it never matches an exact route entry.
    pub fn without_method(path: impl Into<String>) -> Self {
        Self {
            method: None,
            path: path.into(),
            context: ContextMap::new(),
        }
    }

    /// The request verb, if one was set.
    pub fn method(&self) -> Option<Method> {
        self.method
    }

    /// The request path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The free-form context map.
    pub fn context(&self) -> &ContextMap {
        &self.context
    }
}

// ============================================================================
// Event request view
// ============================================================================

/// The generic event-shaped request view for the event dispatch flavor.
#[derive(Debug)]
pub struct EventRequest {
    event_type: String,
    context: ContextMap,
}

impl EventRequest {
    /// Creates an event request with a resolved event type.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            context: ContextMap::new(),
        }
    }

    /// The resolved event type descriptor.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// The free-form context map.
    pub fn context(&self) -> &ContextMap {
        &self.context
    }
}

// ============================================================================
// Response boundary object
// ============================================================================

/// Opaque response collaborator.
///
/// The core never reads it; handlers record whatever response state the
/// excluded response-finalization component will render.
#[derive(Debug, Default)]
pub struct Response {
    context: ContextMap,
}

impl Response {
    /// Creates an empty response.
    pub fn new() -> Self {
        Self::default()
    }

    /// The free-form context map handlers write response state into.
    pub fn context(&self) -> &ContextMap {
        &self.context
    }
}
