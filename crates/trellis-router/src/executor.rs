//! Per-dispatch executor frames.
//!
//! An executor is the stateful cursor that walks one router's stack for one
//! in-flight request: scan the layer stack in registration order, fall
//! through to child routers once exhausted, then finalize. Continuation
//! re-entry is an explicit resume loop: each time the in-flight error state
//! is updated (a handler resumed, a layer raised, a child subtree returned)
//! the scan simply continues from the cursor. Nested routers run their own frames to completion before the
//! parent resumes, so the whole walk is a strictly sequential tree
//! traversal.
//!
//! Every frame's finalize yields to the scheduler before reporting
//! exhaustion: completion is never observable synchronously from the call
//! that triggered it.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::yield_now;
use tracing::{debug, trace};

use trellis_core::{DispatchError, EventRequest, HttpRequest, Response};

use crate::context::{EventContext, HttpContext};
use crate::handler::{BoxFuture, Next, Outcome};
use crate::layer::{EventLayer, HttpLayer};
use crate::params;
use crate::pattern::strip_mount_prefix;
use crate::router::Router;

// ============================================================================
// HTTP executor
// ============================================================================

pub(crate) struct HttpExecutor {
    router: Router,
    request: Arc<HttpRequest>,
    response: Arc<Response>,
    /// The owning router's root-relative mount prefix, fixed per frame.
    mount: Option<String>,
    base_path: Arc<str>,
    /// Parameters in scope at this frame, before any layer-local captures.
    parent_params: Arc<BTreeMap<String, String>>,
    /// Names whose precondition chains already ran during this top-level
    /// dispatch; shared by reference across every frame.
    executed_params: Arc<Mutex<HashSet<String>>>,
    layers: Vec<HttpLayer>,
    children: Vec<Router>,
    layer_cursor: usize,
    child_cursor: usize,
}

impl HttpExecutor {
    /// The root frame of a top-level dispatch.
    pub(crate) fn root(router: &Router, request: Arc<HttpRequest>, response: Arc<Response>) -> Self {
        Self::frame(
            router,
            request,
            response,
            Arc::new(BTreeMap::new()),
            Arc::new(Mutex::new(HashSet::new())),
        )
    }

    fn frame(
        router: &Router,
        request: Arc<HttpRequest>,
        response: Arc<Response>,
        parent_params: Arc<BTreeMap<String, String>>,
        executed_params: Arc<Mutex<HashSet<String>>>,
    ) -> Self {
        let mount = router.full_subpath();
        let base_path = Arc::from(mount.as_deref().unwrap_or(""));
        Self {
            request,
            response,
            mount,
            base_path,
            parent_params,
            executed_params,
            layers: router.http_layers(),
            children: router.children(),
            layer_cursor: 0,
            child_cursor: 0,
            router: router.clone(),
        }
    }

    /// A child frame delegated to from this frame's subrouter phase. The
    /// child inherits the delegating frame's parent-scoped params - layer
    /// captures are scoped to their layer invocation, not to the subtree.
    fn child_frame(&self, child: &Router) -> Self {
        Self::frame(
            child,
            Arc::clone(&self.request),
            Arc::clone(&self.response),
            Arc::clone(&self.parent_params),
            Arc::clone(&self.executed_params),
        )
    }

    /// Walks this frame to completion, starting with `error` in flight.
    ///
    /// Boxed because child delegation recurses through the mount tree.
    pub(crate) fn run(mut self, error: Option<DispatchError>) -> BoxFuture<'static, Outcome> {
        Box::pin(async move {
            let mut error = error;
            let path = self.request.path().to_owned();
            let method = self.request.method();

            // Layer phase: scan forward for the next eligible layer.
            while self.layer_cursor < self.layers.len() {
                let layer = self.layers[self.layer_cursor].clone();
                self.layer_cursor += 1;

                if !layer.matches(self.mount.as_deref(), &path) {
                    continue;
                }
                if let Some(route) = layer.route() {
                    if !route.has_method(method) {
                        continue;
                    }
                }
                if error.is_some() && !layer.is_error_handler() {
                    trace!(index = self.layer_cursor - 1, "skipping non-error layer");
                    continue;
                }

                let fresh = match layer.path_params(self.mount.as_deref(), &path) {
                    Ok(params) => params,
                    Err(err) => {
                        debug!(error = %err, "path capture failed to decode");
                        error = Some(err);
                        continue;
                    }
                };

                let mut merged = (*self.parent_params).clone();
                merged.extend(fresh.iter().map(|(k, v)| (k.clone(), v.clone())));
                let ctx = HttpContext::new(
                    Arc::clone(&self.request),
                    Arc::clone(&self.response),
                    Arc::new(merged),
                    layer.route().cloned(),
                    Arc::clone(&self.base_path),
                );

                if let Err(err) =
                    params::preprocess(&self.router, &ctx, &fresh, &self.executed_params).await
                {
                    debug!(error = %err, "parameter precondition failed");
                    error = Some(err);
                    continue;
                }

                trace!(index = self.layer_cursor - 1, "entering layer");
                let (next, signal) = Next::pair();
                if let Err(err) = layer.handle(ctx, next, error.clone()).await {
                    debug!(error = %err, "handler reported failure");
                    error = Some(err);
                    continue;
                }
                match signal.wait().await {
                    Some(resumed) => {
                        error = resumed;
                        continue;
                    }
                    None => {
                        debug!("handler consumed the request");
                        return Outcome::Handled;
                    }
                }
            }

            // Subrouter phase: first child whose mount prefix covers the path.
            while self.child_cursor < self.children.len() {
                let child = self.children[self.child_cursor].clone();
                self.child_cursor += 1;

                if let Some(subpath) = child.full_subpath() {
                    if strip_mount_prefix(&path, Some(&subpath)).is_none() {
                        continue;
                    }
                }

                trace!(index = self.child_cursor - 1, "delegating to child router");
                match self.child_frame(&child).run(error.clone()).await {
                    Outcome::Handled => return Outcome::Handled,
                    Outcome::Exhausted(err) => {
                        error = err;
                    }
                }
            }

            // Finalize: defer completion to the next scheduling turn.
            yield_now().await;
            Outcome::Exhausted(error)
        })
    }
}

#[cfg(test)]
mod http_tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use trellis_core::Method;

    type Log = Arc<Mutex<Vec<String>>>;

    fn log() -> Log {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn get(path: &str) -> Arc<HttpRequest> {
        Arc::new(HttpRequest::new(Method::Get, path))
    }

    fn response() -> Arc<Response> {
        Arc::new(Response::new())
    }

    /// A handler that records its tag and proceeds.
    fn mark(
        log: &Log,
        tag: &'static str,
    ) -> impl Fn(HttpContext, Next) -> BoxFuture<'static, trellis_core::HandlerResult> + use<> {
        let log = Arc::clone(log);
        move |_ctx, next| {
            let log = Arc::clone(&log);
            Box::pin(async move {
                log.lock().push(tag.to_owned());
                next.proceed();
                Ok(())
            })
        }
    }

    #[test]
    fn empty_router_exhausts_asynchronously_with_the_initial_error() {
        let router = Router::new();
        let executor = HttpExecutor::root(&router, get("/"), response());
        let mut task = tokio_test::task::spawn(executor.run(Some("seed".into())));

        // The finalize step defers completion past the triggering poll.
        tokio_test::assert_pending!(task.poll());
        assert!(task.is_woken());
        let outcome = tokio_test::assert_ready!(task.poll());
        assert_eq!(
            outcome,
            Outcome::Exhausted(Some(DispatchError::Handler("seed".into())))
        );
    }

    #[tokio::test]
    async fn layers_run_in_registration_order_before_routes() {
        let order = log();
        let router = Router::new();
        router.layer(mark(&order, "use1"));
        router.layer(mark(&order, "use2"));
        {
            let order = Arc::clone(&order);
            router.route("/").get(move |_ctx, next| {
                let order = Arc::clone(&order);
                async move {
                    order.lock().push("route".into());
                    next.proceed();
                    Ok(())
                }
            });
        }

        let outcome = router.dispatch(get("/"), response()).await;
        assert_eq!(outcome, Outcome::Exhausted(None));
        assert_eq!(*order.lock(), ["use1", "use2", "route"]);
    }

    #[tokio::test]
    async fn error_filters_the_scan_to_error_handlers() {
        let order = log();
        let router = Router::new();
        {
            let order = Arc::clone(&order);
            router.layer(move |_ctx, next| {
                let order = Arc::clone(&order);
                async move {
                    order.lock().push("l1".into());
                    next.fail("broken");
                    Ok(())
                }
            });
        }
        // Not an error handler: must be skipped while the error is in flight.
        router.layer(mark(&order, "l2"));
        {
            let order = Arc::clone(&order);
            router.error_layer(move |_ctx, next, err| {
                let order = Arc::clone(&order);
                async move {
                    order.lock().push(format!("eh:{err}"));
                    next.proceed();
                    Ok(())
                }
            });
        }
        // Runs again: the error handler cleared the error.
        router.layer(mark(&order, "l3"));

        let outcome = router.dispatch(get("/"), response()).await;
        assert_eq!(outcome, Outcome::Exhausted(None));
        assert_eq!(*order.lock(), ["l1", "eh:broken", "l3"]);
    }

    #[tokio::test]
    async fn unconsumed_error_reaches_the_terminal_outcome() {
        let router = Router::new();
        router.layer(|_ctx, next| {
            async move {
                next.fail("lost");
                Ok(())
            }
        });

        let outcome = router.dispatch(get("/"), response()).await;
        assert_eq!(
            outcome,
            Outcome::Exhausted(Some(DispatchError::Handler("lost".into())))
        );
    }

    #[tokio::test]
    async fn handler_err_return_is_equivalent_to_failing_the_continuation() {
        let seen = log();
        let router = Router::new();
        router.layer(|_ctx, _next| async move { Err(DispatchError::message("thrown")) });
        {
            let seen = Arc::clone(&seen);
            router.error_layer(move |_ctx, next, err| {
                let seen = Arc::clone(&seen);
                async move {
                    seen.lock().push(err.to_string());
                    next.proceed();
                    Ok(())
                }
            });
        }

        let outcome = router.dispatch(get("/"), response()).await;
        assert_eq!(outcome, Outcome::Exhausted(None));
        assert_eq!(*seen.lock(), ["thrown"]);
    }

    #[tokio::test]
    async fn dropping_the_continuation_ends_dispatch_as_handled() {
        let reached = log();
        let router = Router::new();
        router.layer(|ctx, _next| {
            async move {
                // Take ownership of the request: write and never resume.
                ctx.response().context().insert("status", 200.into());
                Ok(())
            }
        });
        router.layer(mark(&reached, "after"));

        let response = response();
        let outcome = router.dispatch(get("/"), Arc::clone(&response)).await;
        assert_eq!(outcome, Outcome::Handled);
        assert!(reached.lock().is_empty());
        assert_eq!(response.context().get("status"), Some(200.into()));
    }

    #[tokio::test]
    async fn verb_mismatch_falls_through_without_error() {
        let order = log();
        let router = Router::new();
        {
            let order = Arc::clone(&order);
            router.route("/x").post(move |_ctx, next| {
                let order = Arc::clone(&order);
                async move {
                    order.lock().push("post".into());
                    next.proceed();
                    Ok(())
                }
            });
        }
        router.layer(mark(&order, "tail"));

        let outcome = router.dispatch(get("/x"), response()).await;
        assert_eq!(outcome, Outcome::Exhausted(None));
        assert_eq!(*order.lock(), ["tail"]);
    }

    #[tokio::test]
    async fn wildcard_layer_captures_the_whole_path() {
        let captured = log();
        let router = Router::new();
        {
            let captured = Arc::clone(&captured);
            router.layer_at("*", move |ctx, next| {
                let captured = Arc::clone(&captured);
                async move {
                    captured
                        .lock()
                        .push(ctx.param("0").unwrap_or_default().to_owned());
                    next.proceed();
                    Ok(())
                }
            });
        }

        router.dispatch(get("/anything/here"), response()).await;
        assert_eq!(*captured.lock(), ["/anything/here"]);
    }

    #[tokio::test]
    async fn malformed_capture_becomes_the_in_flight_error() {
        let router = Router::new();
        router.route("/:value").get(|_ctx, next| async move {
            next.proceed();
            Ok(())
        });

        let outcome = router.dispatch(get("/%E0%A4%A"), response()).await;
        match outcome {
            Outcome::Exhausted(Some(DispatchError::Decode { raw, .. })) => {
                assert_eq!(raw, "%E0%A4%A");
            }
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn param_preconditions_run_once_per_dispatch_across_the_tree() {
        let order = log();
        let child_param_hits = Arc::new(AtomicUsize::new(0));

        let parent = Router::new();
        {
            let order = Arc::clone(&order);
            parent.param("id", move |_ctx, value| {
                let order = Arc::clone(&order);
                async move {
                    order.lock().push(format!("h1:{value}"));
                    Ok(())
                }
            });
        }
        {
            let order = Arc::clone(&order);
            parent.param("id", move |_ctx, value| {
                let order = Arc::clone(&order);
                async move {
                    order.lock().push(format!("h2:{value}"));
                    Ok(())
                }
            });
        }

        // Two layers on the parent capture `id`; preconditions run at the
        // first and must not repeat at the second.
        parent.layer_at("/blog/:id", mark(&order, "use"));
        {
            let order = Arc::clone(&order);
            parent.route("/blog/:id").get(move |_ctx, next| {
                let order = Arc::clone(&order);
                async move {
                    order.lock().push("route".into());
                    next.proceed();
                    Ok(())
                }
            });
        }

        // A mounted subrouter captures the same name again; its own handler
        // must be skipped because the key already executed.
        let child = Router::new();
        {
            let hits = Arc::clone(&child_param_hits);
            child.param("id", move |_ctx, _value| {
                let hits = Arc::clone(&hits);
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            });
        }
        {
            let order = Arc::clone(&order);
            child.route("/:id").get(move |_ctx, next| {
                let order = Arc::clone(&order);
                async move {
                    order.lock().push("child".into());
                    next.proceed();
                    Ok(())
                }
            });
        }
        parent.mount(&child, Some("/blog")).unwrap();

        let outcome = parent.dispatch(get("/blog/1"), response()).await;
        assert_eq!(outcome, Outcome::Exhausted(None));
        assert_eq!(*order.lock(), ["h1:1", "h2:1", "use", "route", "child"]);
        assert_eq!(child_param_hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn param_failure_short_circuits_the_guarded_layer() {
        let order = log();
        let router = Router::new();
        router.param("id", |_ctx, _value| async move {
            Err(DispatchError::message("rejected"))
        });
        router.layer_at("/:id", mark(&order, "guarded"));

        let outcome = router.dispatch(get("/7"), response()).await;
        assert_eq!(
            outcome,
            Outcome::Exhausted(Some(DispatchError::Handler("rejected".into())))
        );
        assert!(order.lock().is_empty());
    }

    #[tokio::test]
    async fn layer_params_shadow_the_parent_scope_per_invocation() {
        let seen = log();
        let router = Router::new();
        {
            let seen = Arc::clone(&seen);
            router.layer_at("/:kind/:id", move |ctx, next| {
                let seen = Arc::clone(&seen);
                async move {
                    seen.lock().push(format!(
                        "{}={}",
                        ctx.param("kind").unwrap_or(""),
                        ctx.param("id").unwrap_or("")
                    ));
                    next.proceed();
                    Ok(())
                }
            });
        }
        {
            let seen = Arc::clone(&seen);
            router.layer(move |ctx, next| {
                let seen = Arc::clone(&seen);
                async move {
                    // No pattern here: captures were layer-local.
                    seen.lock().push(format!("bare:{}", ctx.params().len()));
                    next.proceed();
                    Ok(())
                }
            });
        }

        router.dispatch(get("/blog/9"), response()).await;
        assert_eq!(*seen.lock(), ["blog=9", "bare:0"]);
    }

    #[tokio::test]
    async fn request_is_untouched_by_a_completed_dispatch() {
        let request = get("/blog/1");
        request.context().insert("trace", "abc".into());
        let before = request.context().snapshot();

        let router = Router::new();
        router.param("id", |_ctx, _value| async move { Ok(()) });
        router.route("/blog/:id").get(|_ctx, next| async move {
            next.proceed();
            Ok(())
        });

        let outcome = router.dispatch(Arc::clone(&request), response()).await;
        assert_eq!(outcome, Outcome::Exhausted(None));
        assert_eq!(request.path(), "/blog/1");
        assert_eq!(request.method(), Some(Method::Get));
        assert_eq!(request.context().snapshot(), before);
    }
}

// ============================================================================
// Event executor
// ============================================================================

pub(crate) struct EventExecutor {
    request: Arc<EventRequest>,
    layers: Vec<EventLayer>,
    children: Vec<Router>,
    layer_cursor: usize,
    child_cursor: usize,
}

impl EventExecutor {
    pub(crate) fn frame(router: &Router, request: Arc<EventRequest>) -> Self {
        Self {
            request,
            layers: router.event_layers(),
            children: router.children(),
            layer_cursor: 0,
            child_cursor: 0,
        }
    }

    pub(crate) fn run(mut self, error: Option<DispatchError>) -> BoxFuture<'static, Outcome> {
        Box::pin(async move {
            let mut error = error;

            while self.layer_cursor < self.layers.len() {
                let layer = self.layers[self.layer_cursor].clone();
                self.layer_cursor += 1;

                if !layer.matches(&self.request) {
                    continue;
                }
                if error.is_some() && !layer.is_error_handler() {
                    trace!(index = self.layer_cursor - 1, "skipping non-error layer");
                    continue;
                }

                trace!(index = self.layer_cursor - 1, "entering event layer");
                let ctx = EventContext::new(Arc::clone(&self.request));
                let (next, signal) = Next::pair();
                if let Err(err) = layer.handle(ctx, next, error.clone()).await {
                    debug!(error = %err, "event handler reported failure");
                    error = Some(err);
                    continue;
                }
                match signal.wait().await {
                    Some(resumed) => {
                        error = resumed;
                        continue;
                    }
                    None => {
                        debug!("event handler consumed the request");
                        return Outcome::Handled;
                    }
                }
            }

            // Children are eligible purely by having a non-empty event stack;
            // there is no path-like filter, and a child whose own stack is
            // empty hides any event layers its grandchildren may hold. That
            // asymmetry with the HTTP walk is deliberate and load-bearing.
            while self.child_cursor < self.children.len() {
                let child = self.children[self.child_cursor].clone();
                self.child_cursor += 1;

                if child.event_layer_count() == 0 {
                    continue;
                }

                trace!(index = self.child_cursor - 1, "delegating to child router");
                match EventExecutor::frame(&child, Arc::clone(&self.request))
                    .run(error.clone())
                    .await
                {
                    Outcome::Handled => return Outcome::Handled,
                    Outcome::Exhausted(err) => {
                        error = err;
                    }
                }
            }

            yield_now().await;
            Outcome::Exhausted(error)
        })
    }
}
