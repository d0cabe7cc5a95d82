//! # Trellis Core
//!
//! Boundary types for the Trellis request-dispatch engine.
//!
//! This crate defines the narrow interfaces the routing core consumes:
//! immutable request views for the two dispatch flavors (HTTP-shaped and
//! generic events), the opaque response collaborator, and the unified error
//! types threaded through continuations.
//!
//! The engine itself - path patterns, routes, layers, routers, and the
//! executor state machine - lives in `trellis-router` and is built entirely
//! on top of the types here.

pub mod error;
pub mod request;

pub use error::{DispatchError, DispatchResult, HandlerResult, RouterError, RouterResult};
pub use request::{ContextMap, EventRequest, HttpRequest, Method, Response};
