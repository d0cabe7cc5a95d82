//! Composable routers.
//!
//! A [`Router`] owns an ordered HTTP layer stack, an ordered event layer
//! stack, a parameter precondition registry, and an ordered list of mounted
//! child routers. Mounting composes routers into a tree that dispatches as
//! if it were a single router: a dispatch walks the router's own layers in
//! registration order, then delegates to each eligible child in mount order.
//!
//! Routers are cheap-clone handles; all mutators take `&self` and are meant
//! for build time. Once mounted, the tree is assumed static - `mount` is a
//! build-time-only operation and remounting is rejected.
//!
//! # Example
//!
//! ```rust,ignore
//! let app = Router::new();
//! app.layer(|ctx, next| async move {
//!     tracing::info!(path = ctx.request().path(), "request");
//!     next.proceed();
//!     Ok(())
//! });
//! app.route("/blog/:id").get(show_post);
//!
//! let admin = Router::new();
//! admin.route("/users").get(list_users);
//! app.mount(&admin, Some("/admin"))?;
//!
//! let outcome = app.dispatch(request, response).await;
//! ```

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::{debug, span, Instrument, Level};

use trellis_core::{
    DispatchError, EventRequest, HandlerResult, HttpRequest, Method, Response, RouterError,
    RouterResult,
};

use crate::context::HttpContext;
use crate::executor::{EventExecutor, HttpExecutor};
use crate::handler::{box_param_handler, EventHandler, HttpHandler, Next, Outcome, ParamHandlerFn};
use crate::layer::{EventGuard, EventLayer, HttpLayer};
use crate::pattern::{MatchOptions, PathPattern};
use crate::route::Route;

/// Build-time matching options for a router.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterOptions {
    /// Compare literal pattern segments case-sensitively.
    pub case_sensitive: bool,
    /// Make terminal routes distinguish trailing-slash variants.
    pub strict: bool,
}

struct RouterInner {
    options: RouterOptions,
    http_layers: RwLock<Vec<HttpLayer>>,
    event_layers: RwLock<Vec<EventLayer>>,
    param_handlers: RwLock<HashMap<String, Vec<ParamHandlerFn>>>,
    children: RwLock<Vec<Router>>,
    /// The mount subpath, set once at mount time.
    subpath: RwLock<Option<String>>,
    /// Back-reference for `full_subpath`; the parent owns nothing of the
    /// child's lifetime through it.
    parent: RwLock<Weak<RouterInner>>,
}

/// A composable dispatch unit. See the module docs.
#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Creates a router with default options.
    pub fn new() -> Self {
        Self::with_options(RouterOptions::default())
    }

    /// Creates a router with explicit matching options.
    pub fn with_options(options: RouterOptions) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                options,
                http_layers: RwLock::new(Vec::new()),
                event_layers: RwLock::new(Vec::new()),
                param_handlers: RwLock::new(HashMap::new()),
                children: RwLock::new(Vec::new()),
                subpath: RwLock::new(None),
                parent: RwLock::new(Weak::new()),
            }),
        }
    }

    // ------------------------------------------------------------------
    // HTTP registration
    // ------------------------------------------------------------------

    /// Appends an unguarded middleware layer.
    pub fn layer<F, Fut>(&self, f: F) -> &Self
    where
        F: Fn(HttpContext, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.push_http_layer(None, HttpHandler::new(f))
    }

    /// Appends a middleware layer guarded by a prefix-style path pattern.
    pub fn layer_at<F, Fut>(&self, path: &str, f: F) -> &Self
    where
        F: Fn(HttpContext, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.push_http_layer(Some(path), HttpHandler::new(f))
    }

    /// Appends an unguarded error-handling layer.
    pub fn error_layer<F, Fut>(&self, f: F) -> &Self
    where
        F: Fn(HttpContext, Next, DispatchError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.push_http_layer(None, HttpHandler::error(f))
    }

    /// Appends an error-handling layer guarded by a prefix-style pattern.
    pub fn error_layer_at<F, Fut>(&self, path: &str, f: F) -> &Self
    where
        F: Fn(HttpContext, Next, DispatchError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.push_http_layer(Some(path), HttpHandler::error(f))
    }

    /// Appends one middleware layer per handler, sharing one guard.
    pub fn layers<I>(&self, path: Option<&str>, handlers: I) -> &Self
    where
        I: IntoIterator<Item = HttpHandler>,
    {
        for handler in handlers {
            self.push_http_layer(path, handler);
        }
        self
    }

    fn push_http_layer(&self, path: Option<&str>, handler: HttpHandler) -> &Self {
        let pattern = path.map(|p| {
            PathPattern::compile(
                p,
                MatchOptions {
                    case_sensitive: self.inner.options.case_sensitive,
                    strict: false,
                    end: false,
                },
            )
        });
        self.inner
            .http_layers
            .write()
            .push(HttpLayer::middleware(pattern, handler));
        self
    }

    /// Appends a terminal layer bound to a fresh [`Route`] and returns the
    /// route for verb binding.
    pub fn route(&self, path: &str) -> Route {
        let pattern = PathPattern::compile(
            path,
            MatchOptions {
                case_sensitive: self.inner.options.case_sensitive,
                strict: self.inner.options.strict,
                end: true,
            },
        );
        let route = Route::new(path);
        self.inner
            .http_layers
            .write()
            .push(HttpLayer::terminal(pattern, route.clone()));
        route
    }

    /// Registers a precondition handler for a path-parameter name.
    ///
    /// Handlers for one name run in registration order, at most once per
    /// top-level dispatch (duplicates are allowed and all run).
    pub fn param<F, Fut>(&self, name: &str, f: F) -> &Self
    where
        F: Fn(HttpContext, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.inner
            .param_handlers
            .write()
            .entry(name.to_owned())
            .or_default()
            .push(box_param_handler(f));
        self
    }

    // ------------------------------------------------------------------
    // Event registration
    // ------------------------------------------------------------------

    /// Appends an event layer: `guard` is an event-type descriptor or an
    /// [`EventGuard::predicate`].
    pub fn event<G, F, Fut>(&self, guard: G, f: F) -> &Self
    where
        G: Into<EventGuard>,
        F: Fn(crate::context::EventContext, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.inner
            .event_layers
            .write()
            .push(EventLayer::new(guard.into(), EventHandler::new(f)));
        self
    }

    /// Appends an event error-handling layer.
    pub fn event_error<G, F, Fut>(&self, guard: G, f: F) -> &Self
    where
        G: Into<EventGuard>,
        F: Fn(crate::context::EventContext, Next, DispatchError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.inner
            .event_layers
            .write()
            .push(EventLayer::new(guard.into(), EventHandler::error(f)));
        self
    }

    // ------------------------------------------------------------------
    // Mounting
    // ------------------------------------------------------------------

    /// Mounts `child` under this router, optionally at a subpath.
    ///
    /// Build-time only: a router has at most one parent and its subpath is
    /// immutable once set. Mounting an ancestor under its own descendant is
    /// rejected.
    pub fn mount(&self, child: &Router, subpath: Option<&str>) -> RouterResult<()> {
        if self.is_or_descends_from(child) {
            return Err(RouterError::MountCycle);
        }

        {
            let mut parent_slot = child.inner.parent.write();
            if parent_slot.upgrade().is_some() {
                return Err(RouterError::AlreadyMounted {
                    subpath: child.inner.subpath.read().clone().unwrap_or_default(),
                });
            }
            *parent_slot = Arc::downgrade(&self.inner);
        }
        *child.inner.subpath.write() = subpath.map(str::to_owned);
        self.inner.children.write().push(child.clone());
        Ok(())
    }

    fn is_or_descends_from(&self, other: &Router) -> bool {
        let mut cursor = Arc::clone(&self.inner);
        loop {
            if Arc::ptr_eq(&cursor, &other.inner) {
                return true;
            }
            let parent = cursor.parent.read().upgrade();
            match parent {
                Some(parent) => cursor = parent,
                None => return false,
            }
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// The router's root-relative mount prefix: every subpath on the chain
    /// from the root down to this router, concatenated. `None` when no
    /// router on the chain carries a subpath. Recomputed on every call; the
    /// mount structure is assumed static after setup.
    pub fn full_subpath(&self) -> Option<String> {
        let mut segments = Vec::new();
        let mut cursor = Arc::clone(&self.inner);
        loop {
            if let Some(subpath) = cursor.subpath.read().clone() {
                segments.push(subpath);
            }
            let parent = cursor.parent.read().upgrade();
            match parent {
                Some(parent) => cursor = parent,
                None => break,
            }
        }
        if segments.is_empty() {
            None
        } else {
            segments.reverse();
            Some(segments.concat())
        }
    }

    /// The de-duplicated union of every verb a matching route on this
    /// router or any descendant would serve for `path`.
    pub fn methods_for_path(&self, path: &str) -> HashSet<Method> {
        let mut methods = HashSet::new();
        let mount = self.full_subpath();
        for layer in self.inner.http_layers.read().iter() {
            if let Some(route) = layer.route() {
                if layer.matches(mount.as_deref(), path) {
                    methods.extend(route.methods());
                }
            }
        }
        for child in self.inner.children.read().iter() {
            methods.extend(child.methods_for_path(path));
        }
        methods
    }

    pub(crate) fn http_layers(&self) -> Vec<HttpLayer> {
        self.inner.http_layers.read().clone()
    }

    pub(crate) fn event_layers(&self) -> Vec<EventLayer> {
        self.inner.event_layers.read().clone()
    }

    pub(crate) fn event_layer_count(&self) -> usize {
        self.inner.event_layers.read().len()
    }

    pub(crate) fn children(&self) -> Vec<Router> {
        self.inner.children.read().clone()
    }

    pub(crate) fn param_handlers_for(&self, name: &str) -> Vec<ParamHandlerFn> {
        self.inner
            .param_handlers
            .read()
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Dispatch entry points
    // ------------------------------------------------------------------

    /// Dispatches an HTTP-shaped request through this router's tree.
    ///
    /// The awaited [`Outcome`] is the terminal continuation: `Exhausted`
    /// carries whatever error was still in flight (an untouched request is
    /// `Exhausted(None)`), `Handled` means some handler consumed the
    /// request. Completion is always deferred past the triggering call.
    pub async fn dispatch(&self, request: Arc<HttpRequest>, response: Arc<Response>) -> Outcome {
        let span = span!(
            Level::DEBUG,
            "dispatch",
            path = %request.path(),
            method = ?request.method(),
        );
        async {
            let outcome = HttpExecutor::root(self, request, response).run(None).await;
            debug!(?outcome, "dispatch complete");
            outcome
        }
        .instrument(span)
        .await
    }

    /// Dispatches an event request through this router's event tree.
    pub async fn dispatch_event(&self, request: Arc<EventRequest>) -> Outcome {
        let span = span!(
            Level::DEBUG,
            "dispatch_event",
            event_type = %request.event_type(),
        );
        async {
            let outcome = EventExecutor::frame(self, request).run(None).await;
            debug!(?outcome, "dispatch complete");
            outcome
        }
        .instrument(span)
        .await
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("options", &self.inner.options)
            .field("http_layers", &self.inner.http_layers.read().len())
            .field("event_layers", &self.inner.event_layers.read().len())
            .field("children", &self.inner.children.read().len())
            .field("subpath", &self.inner.subpath.read())
            .finish()
    }
}
