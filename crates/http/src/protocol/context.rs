use http::Method;

use crate::protocol::{Request, RequestBody, RequestHead};
use crate::response::{Response, ResponseTarget};

/// Request plus response for one logical exchange.
///
/// Contexts are owned by an [`HttpContextPool`](crate::protocol::HttpContextPool)
/// and re-stamped with [`initialize`](Self::initialize) for every request, so
/// middleware must not keep references to one after its dispatch returns.
#[derive(Debug, Default)]
pub struct HttpContext {
    pub request: Request,
    pub response: Response,
}

impl HttpContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds the context to a freshly parsed request and its response target.
    pub fn initialize(&mut self, head: RequestHead, body: RequestBody, target: ResponseTarget) {
        let head_only = head.method == Method::HEAD;
        self.request.initialize(head, body);
        self.response.initialize(target, head_only);
    }

    /// Clears all per-request state and drops the binding to the socket or stream.
    pub fn reset(&mut self) {
        self.request.reset();
        self.response.recycle();
    }
}
