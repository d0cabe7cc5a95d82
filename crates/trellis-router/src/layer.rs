//! Layers: the atomic guarded units of a dispatch stack.
//!
//! An [`HttpLayer`] is either a bare handler, a handler guarded by a path
//! pattern, or a pointer to a terminal [`Route`]. An [`EventLayer`] pairs an
//! [`EventGuard`] with an event handler. Both are immutable once pushed onto
//! a router's stack; the executor owns the scan, the layer owns match and
//! invocation semantics.

use std::collections::BTreeMap;
use std::sync::Arc;

use trellis_core::{DispatchError, DispatchResult, EventRequest, HandlerResult};

use crate::context::{EventContext, HttpContext};
use crate::handler::{EventHandler, HttpHandler, Next};
use crate::pattern::{strip_mount_prefix, PathPattern};
use crate::route::Route;

// ============================================================================
// HTTP layer
// ============================================================================

#[derive(Clone)]
pub(crate) struct HttpLayer {
    pattern: Option<PathPattern>,
    route: Option<Route>,
    handler: Option<HttpHandler>,
}

impl HttpLayer {
    /// A non-terminal layer: optional pattern guard plus a handler.
    pub(crate) fn middleware(pattern: Option<PathPattern>, handler: HttpHandler) -> Self {
        Self {
            pattern,
            route: None,
            handler: Some(handler),
        }
    }

    /// A terminal layer owning a route.
    pub(crate) fn terminal(pattern: PathPattern, route: Route) -> Self {
        Self {
            pattern: Some(pattern),
            route: Some(route),
            handler: None,
        }
    }

    pub(crate) fn route(&self) -> Option<&Route> {
        self.route.as_ref()
    }

    /// True when the layer guards nothing, or the path falls under the
    /// owning router's mount prefix and its remainder satisfies the pattern.
    /// A patterned layer whose path escapes the mount prefix never matches.
    pub(crate) fn matches(&self, mount: Option<&str>, path: &str) -> bool {
        let Some(pattern) = &self.pattern else {
            return true;
        };
        match strip_mount_prefix(path, mount) {
            Some(rest) => pattern.matches(rest),
            None => false,
        }
    }

    /// Extracts and decodes this layer's path parameters.
    pub(crate) fn path_params(
        &self,
        mount: Option<&str>,
        path: &str,
    ) -> DispatchResult<BTreeMap<String, String>> {
        let Some(pattern) = &self.pattern else {
            return Ok(BTreeMap::new());
        };
        match strip_mount_prefix(path, mount) {
            Some(rest) => pattern.captures(rest),
            None => Ok(BTreeMap::new()),
        }
    }

    /// True only for route-less layers carrying an error-tagged handler.
    pub(crate) fn is_error_handler(&self) -> bool {
        self.route.is_none()
            && self
                .handler
                .as_ref()
                .is_some_and(HttpHandler::is_error_handler)
    }

    /// Invokes this layer for the current error state.
    ///
    /// Routes are never error handlers: with an error in flight a route
    /// layer propagates it untouched. A handler whose tag disagrees with the
    /// error state also propagates untouched - the executor normally filters
    /// those out before calling here, the layer guards regardless.
    pub(crate) async fn handle(
        &self,
        ctx: HttpContext,
        next: Next,
        error: Option<DispatchError>,
    ) -> HandlerResult {
        match (&self.route, &self.handler) {
            (_, Some(HttpHandler::Error(handler))) => match error {
                Some(err) => handler(ctx, next, err).await,
                None => {
                    next.proceed();
                    Ok(())
                }
            },
            (_, Some(HttpHandler::Normal(handler))) => match error {
                None => handler(ctx, next).await,
                Some(err) => {
                    next.fail(err);
                    Ok(())
                }
            },
            (Some(route), None) => match error {
                None => route.dispatch(ctx, next).await,
                Some(err) => {
                    next.fail(err);
                    Ok(())
                }
            },
            (None, None) => {
                next.resume(error);
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for HttpLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpLayer")
            .field("pattern", &self.pattern.as_ref().map(|p| p.keys()))
            .field("route", &self.route)
            .field("handler", &self.handler)
            .finish()
    }
}

// ============================================================================
// Event layer
// ============================================================================

/// The guard of an event layer: a literal descriptor compared for exact
/// equality against the request's resolved event type, or an arbitrary
/// predicate over the request.
#[derive(Clone)]
pub enum EventGuard {
    /// Exact event-type match.
    Type(String),
    /// Arbitrary predicate.
    Predicate(Arc<dyn Fn(&EventRequest) -> bool + Send + Sync>),
}

impl EventGuard {
    /// Builds a predicate guard.
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&EventRequest) -> bool + Send + Sync + 'static,
    {
        EventGuard::Predicate(Arc::new(f))
    }

    fn matches(&self, request: &EventRequest) -> bool {
        match self {
            EventGuard::Type(descriptor) => descriptor == request.event_type(),
            EventGuard::Predicate(predicate) => predicate(request),
        }
    }
}

impl From<&str> for EventGuard {
    fn from(descriptor: &str) -> Self {
        EventGuard::Type(descriptor.to_owned())
    }
}

impl From<String> for EventGuard {
    fn from(descriptor: String) -> Self {
        EventGuard::Type(descriptor)
    }
}

impl std::fmt::Debug for EventGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventGuard::Type(descriptor) => f.debug_tuple("Type").field(descriptor).finish(),
            EventGuard::Predicate(_) => f.write_str("Predicate"),
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct EventLayer {
    guard: EventGuard,
    handler: EventHandler,
}

impl EventLayer {
    pub(crate) fn new(guard: EventGuard, handler: EventHandler) -> Self {
        Self { guard, handler }
    }

    pub(crate) fn matches(&self, request: &EventRequest) -> bool {
        self.guard.matches(request)
    }

    pub(crate) fn is_error_handler(&self) -> bool {
        self.handler.is_error_handler()
    }

    pub(crate) async fn handle(
        &self,
        ctx: EventContext,
        next: Next,
        error: Option<DispatchError>,
    ) -> HandlerResult {
        match (&self.handler, error) {
            (EventHandler::Error(handler), Some(err)) => handler(ctx, next, err).await,
            (EventHandler::Normal(handler), None) => handler(ctx, next).await,
            (_, error) => {
                next.resume(error);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::MatchOptions;
    use std::sync::Arc;

    use trellis_core::{HttpRequest, Method, Response};

    fn http_ctx(path: &str) -> HttpContext {
        HttpContext::new(
            Arc::new(HttpRequest::new(Method::Get, path)),
            Arc::new(Response::new()),
            Arc::new(BTreeMap::new()),
            None,
            Arc::from(""),
        )
    }

    fn noop() -> HttpHandler {
        HttpHandler::new(|_ctx, next| async move {
            next.proceed();
            Ok(())
        })
    }

    #[test]
    fn bare_layer_matches_unconditionally() {
        let layer = HttpLayer::middleware(None, noop());
        assert!(layer.matches(None, "/anything"));
        assert!(layer.matches(Some("/blog"), "/else"));
        assert!(layer.path_params(None, "/anything").unwrap().is_empty());
    }

    #[test]
    fn patterned_layer_is_scoped_to_the_mount_prefix() {
        let pattern = PathPattern::compile("/:id", MatchOptions::default());
        let layer = HttpLayer::middleware(Some(pattern), noop());

        assert!(layer.matches(Some("/blog/a"), "/blog/a/5"));
        assert!(!layer.matches(Some("/blog/a"), "/other/a/5"));

        let params = layer.path_params(Some("/blog/a"), "/blog/a/5").unwrap();
        assert_eq!(params.get("id").map(String::as_str), Some("5"));
    }

    #[test]
    fn error_classification_requires_routeless_error_tag() {
        let normal = HttpLayer::middleware(None, noop());
        assert!(!normal.is_error_handler());

        let error = HttpLayer::middleware(
            None,
            HttpHandler::error(|_ctx, next, err| async move {
                next.fail(err);
                Ok(())
            }),
        );
        assert!(error.is_error_handler());

        let terminal = HttpLayer::terminal(
            PathPattern::compile("/x", MatchOptions::default()),
            Route::new("/x"),
        );
        assert!(!terminal.is_error_handler());
    }

    #[tokio::test]
    async fn route_layer_propagates_in_flight_errors_untouched() {
        let route = Route::new("/x");
        route.get(|_ctx, next| async move {
            next.proceed();
            Ok(())
        });
        let layer = HttpLayer::terminal(
            PathPattern::compile("/x", MatchOptions::default()),
            route,
        );

        let (next, signal) = Next::pair();
        layer
            .handle(http_ctx("/x"), next, Some("upstream".into()))
            .await
            .unwrap();
        assert_eq!(
            signal.wait().await,
            Some(Some(DispatchError::Handler("upstream".into())))
        );
    }

    #[tokio::test]
    async fn mismatched_tag_propagates_error_state() {
        let layer = HttpLayer::middleware(None, noop());
        let (next, signal) = Next::pair();
        layer
            .handle(http_ctx("/x"), next, Some("boom".into()))
            .await
            .unwrap();
        assert_eq!(
            signal.wait().await,
            Some(Some(DispatchError::Handler("boom".into())))
        );
    }

    #[test]
    fn event_guards_match_by_type_or_predicate() {
        let handler = EventHandler::new(|_ctx, next| async move {
            next.proceed();
            Ok(())
        });

        let typed = EventLayer::new("user.created".into(), handler.clone());
        assert!(typed.matches(&EventRequest::new("user.created")));
        assert!(!typed.matches(&EventRequest::new("user.deleted")));

        let predicated = EventLayer::new(
            EventGuard::predicate(|req| req.event_type().starts_with("user.")),
            handler,
        );
        assert!(predicated.matches(&EventRequest::new("user.deleted")));
        assert!(!predicated.matches(&EventRequest::new("order.created")));
    }
}
