use crate::request::IncomingRequest;
use std::sync::Arc;

/// What a middleware decided for the request it was handed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    /// Pass the request to the next middleware (or to generation)
    Continue,
    /// Abort this chain and re-route the request to the given path
    Redirect(String),
    /// Halt the chain; the middleware produced the response itself (via
    /// [`IncomingRequest::respond`]) or intentionally produced none
    Stop,
}

/// Pre-dispatch request processing step
///
/// Middleware runs on the worker thread that owns the request, in the order
/// the handler declared it. Implementations are shared across all requests
/// for the handler and must not keep per-request state in `self`.
pub trait Middleware: Send + Sync {
    fn handle(&self, req: &mut IncomingRequest) -> Flow;

    /// Name used in logs and [`Router::dump`](crate::router::Router::dump)
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Result of draining a [`MiddlewareChain`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainOutcome {
    /// Every middleware passed the request on
    Finished,
    /// A middleware asked for an internal redirect to this path
    Redirected(String),
    /// A middleware stopped the chain
    Halted,
}

/// Per-request, single-use middleware queue
///
/// Built fresh for every dispatch from the handler's declared list.
/// [`MiddlewareChain::run`] consumes the chain, so it can be drained at most once.
pub struct MiddlewareChain {
    queue: std::vec::IntoIter<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new(middleware: Vec<Arc<dyn Middleware>>) -> Self {
        Self {
            queue: middleware.into_iter(),
        }
    }

    /// Middleware not yet run
    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    /// Drain the chain against `req`
    ///
    /// A redirect requested through [`IncomingRequest::redirect_to`] wins over
    /// the returned [`Flow`], matching a middleware that set the redirect and
    /// then returned `Continue`.
    pub fn run(mut self, req: &mut IncomingRequest) -> ChainOutcome {
        for middleware in self.queue.by_ref() {
            let flow = middleware.handle(req);
            if let Some(path) = req.take_pending_redirect() {
                return ChainOutcome::Redirected(path);
            }
            match flow {
                Flow::Continue => {}
                Flow::Redirect(path) => return ChainOutcome::Redirected(path),
                Flow::Stop => return ChainOutcome::Halted,
            }
        }
        ChainOutcome::Finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(AtomicUsize, Flow);

    impl Middleware for Counting {
        fn handle(&self, _req: &mut IncomingRequest) -> Flow {
            self.0.fetch_add(1, Ordering::SeqCst);
            self.1.clone()
        }
    }

    struct SetsRedirect;

    impl Middleware for SetsRedirect {
        fn handle(&self, req: &mut IncomingRequest) -> Flow {
            req.redirect_to("/login");
            Flow::Continue
        }
    }

    fn counting(flow: Flow) -> Arc<Counting> {
        Arc::new(Counting(AtomicUsize::new(0), flow))
    }

    fn chain(list: &[Arc<dyn Middleware>]) -> MiddlewareChain {
        MiddlewareChain::new(list.to_vec())
    }

    #[test]
    fn test_pass_through_chain_finishes() {
        let a = counting(Flow::Continue);
        let b = counting(Flow::Continue);
        let chain = chain(&[a.clone(), b.clone()]);
        assert_eq!(chain.remaining(), 2);
        let mut req = IncomingRequest::new(Method::GET, "/");
        assert_eq!(chain.run(&mut req), ChainOutcome::Finished);
        assert_eq!(a.0.load(Ordering::SeqCst), 1);
        assert_eq!(b.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_skips_remaining_middleware() {
        let a = counting(Flow::Stop);
        let b = counting(Flow::Continue);
        let mut req = IncomingRequest::new(Method::GET, "/");
        let outcome = chain(&[a, b.clone()]).run(&mut req);
        assert_eq!(outcome, ChainOutcome::Halted);
        assert_eq!(b.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_redirect_flow_aborts_chain() {
        let a = counting(Flow::Redirect("/other".into()));
        let b = counting(Flow::Continue);
        let mut req = IncomingRequest::new(Method::GET, "/");
        let outcome = chain(&[a, b.clone()]).run(&mut req);
        assert_eq!(outcome, ChainOutcome::Redirected("/other".into()));
        assert_eq!(b.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_request_redirect_overrides_continue() {
        let b = counting(Flow::Continue);
        let mut req = IncomingRequest::new(Method::GET, "/");
        let outcome = chain(&[Arc::new(SetsRedirect), b.clone()]).run(&mut req);
        assert_eq!(outcome, ChainOutcome::Redirected("/login".into()));
        assert_eq!(b.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_empty_chain_finishes() {
        let mut req = IncomingRequest::new(Method::GET, "/");
        assert_eq!(
            MiddlewareChain::new(Vec::new()).run(&mut req),
            ChainOutcome::Finished
        );
    }
}
