//! # Trellis Router
//!
//! The dispatch engine of Trellis: composable routers walked by
//! continuation-passing executors.
//!
//! ## Architecture
//!
//! The engine is organized leaves-first:
//!
//! - **Path patterns** ([`pattern`]) - compiled route patterns with named
//!   captures and strict percent-decoding
//! - **Routes** ([`route`]) - per-path verb tables owned by terminal layers
//! - **Layers** ([`layer`]) - the guarded units of the HTTP and event stacks
//! - **Routers** ([`router`]) - ordered stacks, parameter preconditions, and
//!   the mount tree
//! - **Executors** ([`executor`]) - the per-dispatch cursor state machine
//!   implementing the continuation protocol
//!
//! ## Dispatch model
//!
//! A dispatch enters [`Router::dispatch`] (or
//! [`Router::dispatch_event`]), which walks the router's layer stack in
//! registration order, falls through to mounted children, and resolves to an
//! [`Outcome`]. Handlers receive a context and a one-shot [`Next`]
//! continuation; resuming it with an error filters the rest of the walk to
//! error handlers until one clears it.
//!
//! ```text
//! dispatch(req) ──▶ Router ──▶ layer │ layer │ route
//!                     │
//!                     └──▶ child Router ──▶ layer │ ...
//! ```

pub mod context;
pub mod executor;
pub mod handler;
pub mod layer;
pub mod params;
pub mod pattern;
pub mod route;
pub mod router;

pub use context::{EventContext, HttpContext};
pub use handler::{
    BoxFuture, EventHandler, HttpHandler, Next, Outcome, ParamHandlerFn,
};
pub use layer::EventGuard;
pub use pattern::{MatchOptions, PathPattern};
pub use route::Route;
pub use router::{Router, RouterOptions};

// Re-export the boundary types so downstream users need one import root.
pub use trellis_core::{
    ContextMap, DispatchError, DispatchResult, EventRequest, HandlerResult, HttpRequest, Method,
    Response, RouterError, RouterResult,
};
