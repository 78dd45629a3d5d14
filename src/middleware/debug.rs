use tracing::debug;

use super::{Flow, Middleware};
use crate::request::IncomingRequest;

/// Name of the alternate outcome selected by `?debug`
pub const DEBUG_OUTCOME: &str = "debug";

/// Development aid prepended to every handler when the server runs in debug mode
///
/// Logs each request with its captures and query, and selects the
/// [`DEBUG_OUTCOME`] alternate outcome when the query carries a `debug`
/// parameter and the routed handler registered that outcome.
pub struct DebugMiddleware;

impl Middleware for DebugMiddleware {
    fn handle(&self, req: &mut IncomingRequest) -> Flow {
        debug!(
            request_id = %req.request_id(),
            method = %req.method(),
            target = %req.target(),
            captures = ?req.captures().to_map(),
            query = ?req.query(),
            "Debug middleware"
        );
        let has_outcome = req
            .handler()
            .is_some_and(|h| h.has_outcome(DEBUG_OUTCOME));
        if has_outcome && req.query().contains_key(DEBUG_OUTCOME) {
            req.select_outcome(DEBUG_OUTCOME);
        }
        Flow::Continue
    }

    fn name(&self) -> &str {
        "debug"
    }
}
