//! Handler types and the continuation protocol.
//!
//! Handlers are type-erased boxed closures, tagged at registration time as
//! either normal or error handlers. Registration fixes the variant, and the
//! executor's scan/skip semantics key off
//! [`HttpHandler::is_error_handler`]; nothing is inferred from a handler's
//! shape at dispatch time.
//!
//! The [`Next`] token is the continuation. It is consumed by value, so a
//! handler can resume dispatch at most once - double continuation is a
//! compile error rather than a downstream state hazard. Dropping the token
//! without firing it ends the dispatch as
//! [`Outcome::Handled`]: the handler took ownership of the request.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::oneshot;

use trellis_core::{DispatchError, HandlerResult};

use crate::context::{EventContext, HttpContext};

/// A type alias for a boxed, pinned future that is `Send`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// ============================================================================
// Continuation
// ============================================================================

/// The one-shot continuation handed to every handler invocation.
///
/// Firing it resumes the executor scan: [`proceed`](Self::proceed) with no
/// error means "carry on normally", [`fail`](Self::fail) puts an error in
/// flight so only error handlers ahead will run.
#[derive(Debug)]
pub struct Next {
    tx: oneshot::Sender<Option<DispatchError>>,
}

impl Next {
    pub(crate) fn pair() -> (Next, ResumeSignal) {
        let (tx, rx) = oneshot::channel();
        (Next { tx }, ResumeSignal { rx })
    }

    /// Resumes dispatch with no error in flight.
    pub fn proceed(self) {
        self.resume(None);
    }

    /// Resumes dispatch with `error` in flight.
    pub fn fail(self, error: impl Into<DispatchError>) {
        self.resume(Some(error.into()));
    }

    /// Resumes dispatch with an explicit error state. `None` clears the
    /// in-flight error.
    pub fn resume(self, error: Option<DispatchError>) {
        // The executor may already be gone when a detached task fires late.
        let _ = self.tx.send(error);
    }
}

/// The executor side of a [`Next`] pair.
pub(crate) struct ResumeSignal {
    rx: oneshot::Receiver<Option<DispatchError>>,
}

impl ResumeSignal {
    /// Waits for the continuation to fire.
    ///
    /// `None` means the token was dropped without firing: the handler
    /// consumed the request and dispatch must stop.
    pub(crate) async fn wait(self) -> Option<Option<DispatchError>> {
        self.rx.await.ok()
    }
}

// ============================================================================
// Outcome
// ============================================================================

/// The terminal result of a dispatch tree walk.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// A handler completed without resuming dispatch; the request is theirs.
    Handled,
    /// Every layer and child was exhausted. Carries the error still in
    /// flight, if any. A no-match is `Exhausted(None)` - deciding that this
    /// means "not found" is the caller's business, never the core's.
    Exhausted(Option<DispatchError>),
}

impl Outcome {
    /// Returns the error still in flight at exhaustion, if any.
    pub fn error(&self) -> Option<&DispatchError> {
        match self {
            Outcome::Exhausted(Some(err)) => Some(err),
            _ => None,
        }
    }

    /// Returns `true` when a handler consumed the request.
    pub fn is_handled(&self) -> bool {
        matches!(self, Outcome::Handled)
    }
}

// ============================================================================
// HTTP handlers
// ============================================================================

/// A type-erased normal HTTP handler.
pub type HttpHandlerFn =
    Arc<dyn Fn(HttpContext, Next) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// A type-erased HTTP error handler; receives the in-flight error.
pub type HttpErrorHandlerFn = Arc<
    dyn Fn(HttpContext, Next, DispatchError) -> BoxFuture<'static, HandlerResult> + Send + Sync,
>;

/// An HTTP handler tagged with its error-handling intent.
#[derive(Clone)]
pub enum HttpHandler {
    /// Runs only while no error is in flight.
    Normal(HttpHandlerFn),
    /// Runs only while an error is in flight.
    Error(HttpErrorHandlerFn),
}

impl HttpHandler {
    /// Wraps a normal handler closure.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(HttpContext, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        HttpHandler::Normal(box_http_handler(f))
    }

    /// Wraps an error handler closure.
    pub fn error<F, Fut>(f: F) -> Self
    where
        F: Fn(HttpContext, Next, DispatchError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        HttpHandler::Error(Arc::new(move |ctx, next, err| Box::pin(f(ctx, next, err))))
    }

    /// Whether this handler runs while an error is in flight.
    pub fn is_error_handler(&self) -> bool {
        matches!(self, HttpHandler::Error(_))
    }
}

impl std::fmt::Debug for HttpHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpHandler::Normal(_) => f.write_str("HttpHandler::Normal"),
            HttpHandler::Error(_) => f.write_str("HttpHandler::Error"),
        }
    }
}

pub(crate) fn box_http_handler<F, Fut>(f: F) -> HttpHandlerFn
where
    F: Fn(HttpContext, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |ctx, next| Box::pin(f(ctx, next)))
}

// ============================================================================
// Event handlers
// ============================================================================

/// A type-erased normal event handler.
pub type EventHandlerFn =
    Arc<dyn Fn(EventContext, Next) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// A type-erased event error handler.
pub type EventErrorHandlerFn = Arc<
    dyn Fn(EventContext, Next, DispatchError) -> BoxFuture<'static, HandlerResult> + Send + Sync,
>;

/// An event handler tagged with its error-handling intent.
#[derive(Clone)]
pub enum EventHandler {
    /// Runs only while no error is in flight.
    Normal(EventHandlerFn),
    /// Runs only while an error is in flight.
    Error(EventErrorHandlerFn),
}

impl EventHandler {
    /// Wraps a normal event handler closure.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(EventContext, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        EventHandler::Normal(Arc::new(move |ctx, next| Box::pin(f(ctx, next))))
    }

    /// Wraps an event error handler closure.
    pub fn error<F, Fut>(f: F) -> Self
    where
        F: Fn(EventContext, Next, DispatchError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        EventHandler::Error(Arc::new(move |ctx, next, err| Box::pin(f(ctx, next, err))))
    }

    /// Whether this handler runs while an error is in flight.
    pub fn is_error_handler(&self) -> bool {
        matches!(self, EventHandler::Error(_))
    }
}

impl std::fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventHandler::Normal(_) => f.write_str("EventHandler::Normal"),
            EventHandler::Error(_) => f.write_str("EventHandler::Error"),
        }
    }
}

// ============================================================================
// Parameter precondition handlers
// ============================================================================

/// A handler bound to a path-parameter name; receives the context and the
/// decoded raw value.
pub type ParamHandlerFn =
    Arc<dyn Fn(HttpContext, String) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

pub(crate) fn box_param_handler<F, Fut>(f: F) -> ParamHandlerFn
where
    F: Fn(HttpContext, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |ctx, value| Box::pin(f(ctx, value)))
}
