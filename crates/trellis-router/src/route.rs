//! Per-path verb tables.
//!
//! A [`Route`] binds handlers to HTTP verbs for a single terminal path. It is
//! owned by exactly one terminal layer; [`Router::route`](crate::Router::route)
//! creates the pair and hands the route back for verb binding:
//!
//! ```rust,ignore
//! router.route("/blog/:id").get(show).post(update);
//! ```
//!
//! Routes are never error handlers: while an error is in flight the layer
//! that owns the route propagates it untouched.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;

use trellis_core::{HandlerResult, Method};

use crate::context::HttpContext;
use crate::handler::{box_http_handler, HttpHandlerFn, Next};

struct RouteInner {
    path: String,
    verbs: RwLock<HashMap<Method, HttpHandlerFn>>,
    all: RwLock<Option<HttpHandlerFn>>,
}

/// A cheap-clone handle to one terminal path's verb table.
#[derive(Clone)]
pub struct Route {
    inner: Arc<RouteInner>,
}

impl Route {
    pub(crate) fn new(path: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RouteInner {
                path: path.into(),
                verbs: RwLock::new(HashMap::new()),
                all: RwLock::new(None),
            }),
        }
    }

    /// The pattern text this route was registered under.
    pub fn path(&self) -> &str {
        &self.inner.path
    }

    /// Binds the GET handler, replacing any previous one.
    pub fn get<F, Fut>(&self, f: F) -> &Self
    where
        F: Fn(HttpContext, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.bind(Method::Get, f)
    }

    /// Binds the PUT handler, replacing any previous one.
    pub fn put<F, Fut>(&self, f: F) -> &Self
    where
        F: Fn(HttpContext, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.bind(Method::Put, f)
    }

    /// Binds the DELETE handler, replacing any previous one.
    pub fn delete<F, Fut>(&self, f: F) -> &Self
    where
        F: Fn(HttpContext, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.bind(Method::Delete, f)
    }

    /// Binds the POST handler, replacing any previous one.
    pub fn post<F, Fut>(&self, f: F) -> &Self
    where
        F: Fn(HttpContext, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.bind(Method::Post, f)
    }

    /// Binds the catch-all handler, replacing any previous one. It runs for
    /// any verb without an exact entry.
    pub fn all<F, Fut>(&self, f: F) -> &Self
    where
        F: Fn(HttpContext, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        *self.inner.all.write() = Some(box_http_handler(f));
        self
    }

    fn bind<F, Fut>(&self, method: Method, f: F) -> &Self
    where
        F: Fn(HttpContext, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.inner.verbs.write().insert(method, box_http_handler(f));
        self
    }

    /// Whether this route can serve `method`: an exact entry exists, or a
    /// catch-all does. An absent verb never matches an exact entry.
    pub fn has_method(&self, method: Option<Method>) -> bool {
        if self.inner.all.read().is_some() {
            return true;
        }
        method.is_some_and(|m| self.inner.verbs.read().contains_key(&m))
    }

    /// Every verb [`has_method`](Self::has_method) would accept - all four
    /// when a catch-all is bound.
    pub fn methods(&self) -> Vec<Method> {
        if self.inner.all.read().is_some() {
            return Method::ALL.to_vec();
        }
        self.inner.verbs.read().keys().copied().collect()
    }

    /// Dispatches to the exact-verb handler, the catch-all, or - when
    /// neither exists - falls through with no error.
    pub(crate) async fn dispatch(&self, ctx: HttpContext, next: Next) -> HandlerResult {
        let handler = ctx
            .request()
            .method()
            .and_then(|m| self.inner.verbs.read().get(&m).cloned())
            .or_else(|| self.inner.all.read().clone());

        match handler {
            Some(handler) => handler(ctx, next).await,
            None => {
                next.proceed();
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("path", &self.inner.path)
            .field("methods", &self.methods())
            .field("has_all", &self.inner.all.read().is_some())
            .finish()
    }
}
