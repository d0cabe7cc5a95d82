//! Parameter precondition sequencing.
//!
//! Placeholder handlers registered via [`Router::param`](crate::Router::param)
//! run at most once per parameter name per top-level dispatch, no matter how
//! many layers or nested routers capture that name. The executed-name set is
//! shared by every frame of one dispatch; a key is recorded only after its
//! whole handler chain succeeded, and keys with no registered handlers are
//! not recorded at all (a deeper router may still own handlers for the name).

use std::collections::{BTreeMap, HashSet};

use parking_lot::Mutex;
use tracing::trace;

use trellis_core::HandlerResult;

use crate::context::HttpContext;
use crate::router::Router;

/// Runs the precondition handlers for every freshly captured key.
///
/// Keys are visited in the map's natural order; a key's handlers run
/// strictly in registration order. The first failure short-circuits the
/// remaining handlers and keys and is returned to the caller, which puts it
/// in flight before the guarded layer's own handler ever runs.
pub(crate) async fn preprocess(
    router: &Router,
    ctx: &HttpContext,
    fresh: &BTreeMap<String, String>,
    executed: &Mutex<HashSet<String>>,
) -> HandlerResult {
    for (name, value) in fresh {
        if executed.lock().contains(name) {
            continue;
        }
        let handlers = router.param_handlers_for(name);
        if handlers.is_empty() {
            continue;
        }

        trace!(param = %name, handlers = handlers.len(), "running parameter preconditions");
        for handler in handlers {
            handler(ctx.clone(), value.clone()).await?;
        }
        executed.lock().insert(name.clone());
    }
    Ok(())
}
