use tracing::info;

use super::{Flow, Middleware};
use crate::request::IncomingRequest;

/// Logs one structured line per request reaching the handler's chain
pub struct TracingMiddleware;

impl Middleware for TracingMiddleware {
    fn handle(&self, req: &mut IncomingRequest) -> Flow {
        info!(
            request_id = %req.request_id(),
            method = %req.method(),
            path = %req.path(),
            protocol = %req.protocol(),
            peer = ?req.peer(),
            captures = req.captures().len(),
            "request"
        );
        Flow::Continue
    }

    fn name(&self) -> &str {
        "tracing"
    }
}
