//! Per-frame dispatch contexts.
//!
//! The engine never mutates the shared request. Everything that is scoped to
//! one layer invocation - the merged parameter map, the route slot, the
//! owning router's base path - is carried by an [`HttpContext`] built fresh
//! for that invocation. The context is cheap to clone (everything inside is
//! `Arc`-backed) and is the one argument every handler receives besides its
//! continuation.

use std::collections::BTreeMap;
use std::sync::Arc;

use trellis_core::{EventRequest, HttpRequest, Response};

use crate::route::Route;

/// The view an HTTP handler receives for one layer invocation.
#[derive(Clone)]
pub struct HttpContext {
    request: Arc<HttpRequest>,
    response: Arc<Response>,
    params: Arc<BTreeMap<String, String>>,
    route: Option<Route>,
    base_path: Arc<str>,
}

impl HttpContext {
    pub(crate) fn new(
        request: Arc<HttpRequest>,
        response: Arc<Response>,
        params: Arc<BTreeMap<String, String>>,
        route: Option<Route>,
        base_path: Arc<str>,
    ) -> Self {
        Self {
            request,
            response,
            params,
            route,
            base_path,
        }
    }

    /// The in-flight request.
    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    /// The response collaborator handlers write into.
    pub fn response(&self) -> &Response {
        &self.response
    }

    /// The parameter map in scope for this invocation: the layer's freshly
    /// parsed captures merged over the parent scope, layer keys winning.
    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    /// Looks up a single parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// The route the selected layer carries, if it is a terminal layer.
    pub fn route(&self) -> Option<&Route> {
        self.route.as_ref()
    }

    /// The root-relative mount prefix of the router whose frame built this
    /// context; empty at the root.
    pub fn base_path(&self) -> &str {
        &self.base_path
    }
}

impl std::fmt::Debug for HttpContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpContext")
            .field("path", &self.request.path())
            .field("method", &self.request.method())
            .field("params", &self.params)
            .field("base_path", &self.base_path)
            .field("has_route", &self.route.is_some())
            .finish()
    }
}

/// The view an event handler receives for one layer invocation.
#[derive(Clone)]
pub struct EventContext {
    request: Arc<EventRequest>,
}

impl EventContext {
    pub(crate) fn new(request: Arc<EventRequest>) -> Self {
        Self { request }
    }

    /// The in-flight event request.
    pub fn request(&self) -> &EventRequest {
        &self.request
    }

    /// Shorthand for the resolved event type.
    pub fn event_type(&self) -> &str {
        self.request.event_type()
    }
}

impl std::fmt::Debug for EventContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventContext")
            .field("event_type", &self.request.event_type())
            .finish()
    }
}
