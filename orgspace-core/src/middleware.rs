// Middleware system for request/response processing

use crate::{Error, HttpRequest, HttpResponse};
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, trace};

/// Boxed future produced by handlers and the rest of the chain
pub type ResponseFuture = Pin<Box<dyn Future<Output = Result<HttpResponse, Error>> + Send>>;

/// Type alias for the next handler in the middleware chain
pub type Next = Box<dyn FnOnce(HttpRequest) -> ResponseFuture + Send>;

/// Type alias for handler functions
pub type HandlerFn = Arc<dyn Fn(HttpRequest) -> ResponseFuture + Send + Sync>;

/// Middleware trait for processing requests before they reach the handler
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Process the request and optionally pass to next middleware
    async fn handle(&self, req: HttpRequest, next: Next) -> Result<HttpResponse, Error>;
}

/// Wrap an async closure as a [`HandlerFn`].
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn
where
    F: Fn(HttpRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HttpResponse, Error>> + Send + 'static,
{
    Arc::new(move |req| Box::pin(f(req)))
}

/// Middleware chain executor
#[derive(Clone)]
pub struct MiddlewareChain {
    middlewares: Arc<Vec<Arc<dyn Middleware>>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self {
            middlewares: Arc::new(Vec::new()),
        }
    }

    /// Add a middleware to the chain
    pub fn use_middleware<M: Middleware + 'static>(&mut self, middleware: M) {
        self.use_arc(Arc::new(middleware));
    }

    /// Add an already shared middleware to the chain
    pub fn use_arc(&mut self, middleware: Arc<dyn Middleware>) {
        let mut mws = (*self.middlewares).clone();
        mws.push(middleware);
        self.middlewares = Arc::new(mws);
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Execute the middleware chain with a handler
    pub async fn apply(&self, req: HttpRequest, handler: HandlerFn) -> Result<HttpResponse, Error> {
        debug!(
            middleware_count = self.middlewares.len(),
            path = %req.path,
            method = %req.method,
            "Executing middleware chain"
        );
        self.execute_from(0, req, handler).await
    }

    fn execute_from(&self, index: usize, req: HttpRequest, handler: HandlerFn) -> ResponseFuture {
        if index >= self.middlewares.len() {
            trace!("Middleware chain complete, calling handler");
            handler(req)
        } else {
            let middleware = self.middlewares[index].clone();
            let chain = self.clone();
            let handler_clone = handler.clone();

            trace!(middleware_index = index, "Executing middleware");
            Box::pin(async move {
                middleware
                    .handle(
                        req,
                        Box::new(move |req| chain.execute_from(index + 1, req, handler_clone)),
                    )
                    .await
            })
        }
    }
}

impl Default for MiddlewareChain {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct HeaderStamp(&'static str);

    #[async_trait]
    impl Middleware for HeaderStamp {
        async fn handle(&self, req: HttpRequest, next: Next) -> Result<HttpResponse, Error> {
            let response = next(req).await?;
            let order = match response.header("x-order") {
                Some(existing) => format!("{},{}", existing, self.0),
                None => self.0.to_string(),
            };
            Ok(response.with_header("x-order", order))
        }
    }

    struct Reject;

    #[async_trait]
    impl Middleware for Reject {
        async fn handle(&self, _req: HttpRequest, _next: Next) -> Result<HttpResponse, Error> {
            Err(Error::Forbidden("rejected".to_string()))
        }
    }

    #[tokio::test]
    async fn test_chain_runs_in_order() {
        let mut chain = MiddlewareChain::new();
        chain.use_middleware(HeaderStamp("outer"));
        chain.use_middleware(HeaderStamp("inner"));
        assert_eq!(chain.len(), 2);

        let handler = handler_fn(|_req| async { Ok(HttpResponse::ok()) });
        let response = chain
            .apply(HttpRequest::new("GET", "/"), handler)
            .await
            .unwrap();

        // inner wraps the handler first, outer stamps last
        assert_eq!(response.header("x-order"), Some("inner,outer"));
    }

    #[tokio::test]
    async fn test_chain_short_circuits() {
        let mut chain = MiddlewareChain::new();
        chain.use_middleware(Reject);

        let handler = handler_fn(|_req| async { panic!("handler must not run") });
        let result = chain.apply(HttpRequest::new("GET", "/"), handler).await;

        assert_eq!(result.unwrap_err().status_code(), 403);
    }

    #[tokio::test]
    async fn test_empty_chain_calls_handler() {
        let chain = MiddlewareChain::default();
        assert!(chain.is_empty());

        let handler = handler_fn(|req| async move {
            Ok(HttpResponse::ok().with_body(req.path.into_bytes()))
        });
        let response = chain
            .apply(HttpRequest::new("GET", "/health"), handler)
            .await
            .unwrap();
        assert_eq!(response.body, b"/health".to_vec());
    }
}
