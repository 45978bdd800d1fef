//! Middleware pipeline — composable before/after request handler logic.
//!
//! This module defines the core types for building an ordered middleware stack.
//! Each middleware wraps the next layer, enabling request inspection, short-circuit
//! responses, and response decoration without coupling handlers to infrastructure
//! concerns. The response cache, authentication and security headers are all
//! middleware built on these types.
//!
//! ## Core types
//!
//! - [`Middleware`] — trait implemented by all middleware.
//! - [`Next`] — cursor into the remaining middleware chain; call [`Next::run`] to
//!   advance to the next layer.
//! - [`MiddlewareHandler`] — type-erased, cheaply-cloneable middleware function.
//! - [`from_middleware`] — converts a [`Middleware`] trait object into a
//!   [`MiddlewareHandler`].
//! - [`Pipeline`] — an ordered stack of middleware terminated by an endpoint
//!   (usually a [`Router`](crate::router::Router)).
//! - [`LoggerMiddleware`] — built-in request/response logger.

use std::{future::Future, pin::Pin, sync::Arc};
use tokio::time::Instant;

use crate::{Request, Response, context::Context, router::Handler};

/// A cursor into the remaining middleware chain for a single request.
///
/// `Next` is passed to each middleware's [`Middleware::handle`] implementation.
/// Calling [`Next::run`] advances the cursor by one position and invokes the next
/// middleware (or returns a fallback `500` response when the chain is exhausted
/// without any middleware generating a response).
///
/// `Next` is consumed on each call to [`run`](Self::run), so it cannot be called
/// more than once per middleware invocation.
///
/// # Examples
///
/// ```rust,no_run
/// use std::pin::Pin;
/// use storefront::{Response, context::Context, middleware::{Middleware, Next}};
///
/// struct PassThrough;
///
/// impl Middleware for PassThrough {
///     fn handle(
///         &self,
///         ctx: Context,
///         next: Next,
///     ) -> Pin<Box<dyn std::future::Future<Output = Response> + Send>> {
///         Box::pin(async move { next.run(ctx).await })
///     }
/// }
/// ```
pub struct Next {
    middlewares: Vec<MiddlewareHandler>,
    // Tracks which middleware to invoke on the next `run` call.
    index: usize,
}

/// A type-erased, reference-counted middleware function.
///
/// Every entry in the middleware stack is stored as a `MiddlewareHandler`.
/// The [`Arc`] wrapper makes handlers cheap to clone so that [`Next`] can
/// advance through the chain without copying closures.
///
/// Construct one with [`from_middleware`] or by wrapping a closure directly:
///
/// ```rust,no_run
/// use std::{pin::Pin, sync::Arc};
/// use storefront::{Response, context::Context, middleware::{MiddlewareHandler, Next}};
///
/// let handler: MiddlewareHandler = Arc::new(|ctx: Context, next: Next| {
///     Box::pin(async move { next.run(ctx).await })
/// });
/// ```
pub type MiddlewareHandler = Arc<
    dyn Fn(Context, Next) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static,
>;

/// Converts a [`Middleware`] implementation into a [`MiddlewareHandler`].
///
/// # Arguments
///
/// - `middleware` — a reference-counted [`Middleware`] to wrap.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use storefront::middleware::{LoggerMiddleware, from_middleware};
///
/// let handler = from_middleware(Arc::new(LoggerMiddleware));
/// ```
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: Context, next: Next| middleware.handle(ctx, next))
}

impl Next {
    /// Creates a new `Next` positioned at the start of the given middleware stack.
    ///
    /// # Arguments
    ///
    /// - `middlewares` — the ordered list of handlers that make up the pipeline.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use storefront::middleware::Next;
    ///
    /// let next = Next::new(vec![]);
    /// ```
    pub fn new(middlewares: Vec<MiddlewareHandler>) -> Self {
        Self {
            middlewares,
            index: 0,
        }
    }

    /// Invokes the next middleware in the chain and returns its response.
    ///
    /// Advances the internal cursor by one, clones the handler at the current
    /// position, and awaits it. If no handler remains (i.e. the chain is
    /// exhausted without producing a response), a `500 Internal Server Error`
    /// response is returned as a safe fallback.
    ///
    /// # Arguments
    ///
    /// - `ctx` — the per-request [`Context`] to pass to the next middleware.
    ///
    /// # Returns
    ///
    /// The [`Response`] produced by the next middleware or handler in the chain.
    pub async fn run(mut self, ctx: Context) -> Response {
        if self.index < self.middlewares.len() {
            let handler = self.middlewares[self.index].clone();
            self.index += 1;
            handler(ctx, self).await
        } else {
            Response::new(crate::StatusCode::InternalServerError)
                .body("No response generated by middleware pipeline")
        }
    }
}

/// The core trait for all storefront middleware.
///
/// Implementors receive a [`Context`] and a [`Next`] cursor. They may:
///
/// - **Pass through** — call `next.run(ctx).await` without modification.
/// - **Short-circuit** — return a [`Response`] directly without calling `next`.
/// - **Decorate** — call `next.run(ctx).await`, inspect the response, and return
///   a modified copy.
///
/// # Contract
///
/// - Implementations **must** be `Send + Sync` because middleware is shared across
///   Tokio tasks.
/// - `handle` **must** return a pinned, `Send` future so it can be awaited across
///   `.await` points in multi-threaded runtimes.
/// - Implementations **should not** hold `&mut` references to shared state across
///   an `.await` point.
pub trait Middleware: Send + Sync {
    /// Handle the request and optionally delegate to the next middleware.
    ///
    /// # Arguments
    ///
    /// - `ctx` — the per-request [`Context`] carrying the HTTP method, headers,
    ///   path, path parameters, and extensions.
    /// - `next` — cursor into the remainder of the middleware chain; call
    ///   [`Next::run`] to forward the request.
    ///
    /// # Returns
    ///
    /// A [`Response`] — either produced by this middleware directly (short-circuit)
    /// or forwarded from a downstream handler.
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

/// Built-in middleware that logs each request's method, path, status, and duration.
///
/// Emits a single `tracing::info!` event after the downstream handler completes,
/// carrying `method`, `path`, `status` and `duration` as structured fields.
///
/// `LoggerMiddleware` does not short-circuit; it always delegates to the next
/// middleware and decorates the response timing after the fact.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use storefront::middleware::{LoggerMiddleware, from_middleware};
///
/// let handler = from_middleware(Arc::new(LoggerMiddleware));
/// ```
pub struct LoggerMiddleware;

impl Middleware for LoggerMiddleware {
    /// Log the request method, path, response status, and elapsed time.
    ///
    /// Captures the start time before delegating to the next middleware, then
    /// emits a `tracing::info!` record once the response is available.
    ///
    /// # Arguments
    ///
    /// - `ctx` — the per-request [`Context`]; method and path are extracted
    ///   before `next` consumes it.
    /// - `next` — the remainder of the middleware chain.
    ///
    /// # Returns
    ///
    /// The unmodified [`Response`] returned by the downstream handler.
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin(async move {
            let start = Instant::now();
            let method = ctx.request().method().as_str().to_string();
            let path = ctx.request().path().to_string();

            let response = next.run(ctx).await;

            let duration = start.elapsed();
            let status = response.status().as_u16();

            tracing::info!(%method, %path, status, ?duration, "request completed");

            response
        })
    }
}

/// An ordered middleware stack that ends in an endpoint handler.
///
/// Middleware run in the order they were added with [`layer`](Self::layer);
/// the endpoint is always last and ignores its own [`Next`].
///
/// ```rust,no_run
/// use storefront::{Router, Response, StatusCode};
/// use storefront::middleware::{LoggerMiddleware, Pipeline};
///
/// let mut router = Router::new();
/// router.get("/health", |_ctx| async { Response::new(StatusCode::Ok) });
///
/// let app = Pipeline::new(router.into_handler()).layer(LoggerMiddleware);
/// ```
#[derive(Clone)]
pub struct Pipeline {
    layers: Vec<MiddlewareHandler>,
    endpoint: Handler,
}

impl Pipeline {
    /// Creates a pipeline with no middleware in front of `endpoint`.
    pub fn new(endpoint: Handler) -> Self {
        Self {
            layers: Vec::new(),
            endpoint,
        }
    }

    /// Appends a middleware to the end of the stack (closest to the endpoint).
    #[must_use]
    pub fn layer<M>(self, middleware: M) -> Self
    where
        M: Middleware + 'static,
    {
        self.layer_handler(from_middleware(Arc::new(middleware)))
    }

    /// Appends an already type-erased middleware handler.
    #[must_use]
    pub fn layer_handler(mut self, handler: MiddlewareHandler) -> Self {
        self.layers.push(handler);
        self
    }

    /// Number of middleware layers, not counting the endpoint.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Runs `request` through every layer and the endpoint.
    pub async fn handle(&self, request: Request) -> Response {
        self.handle_context(Context::new(request)).await
    }

    /// Runs an existing context through the pipeline.
    pub async fn handle_context(&self, ctx: Context) -> Response {
        let mut chain = Vec::with_capacity(self.layers.len() + 1);
        chain.extend(self.layers.iter().cloned());

        let endpoint = Arc::clone(&self.endpoint);
        chain.push(Arc::new(move |ctx: Context, _next: Next| endpoint(ctx)));

        Next::new(chain).run(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{StatusCode, router::handler};

    fn request(method: &str, path: &str) -> Request {
        let raw = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        Request::parse(raw.as_bytes()).unwrap().0
    }

    struct Tag {
        name: &'static str,
        seen: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Middleware for Tag {
        fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
            let name = self.name;
            let seen = Arc::clone(&self.seen);
            Box::pin(async move {
                seen.lock().unwrap().push(name);
                let mut res = next.run(ctx).await;
                res.add_header("X-Layer", name);
                res
            })
        }
    }

    struct Deny;

    impl Middleware for Deny {
        fn handle(&self, _ctx: Context, _next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
            Box::pin(async { Response::new(StatusCode::Forbidden) })
        }
    }

    #[tokio::test]
    async fn next_on_empty_chain_is_500() {
        let res = Next::new(vec![]).run(Context::new(request("GET", "/"))).await;
        assert_eq!(res.status(), StatusCode::InternalServerError);
    }

    #[tokio::test]
    async fn layers_run_in_order_and_unwind_in_reverse() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let app = Pipeline::new(handler(|_ctx| async { Response::new(StatusCode::Ok) }))
            .layer(Tag { name: "outer", seen: Arc::clone(&seen) })
            .layer(Tag { name: "inner", seen: Arc::clone(&seen) });
        assert_eq!(app.len(), 2);

        let res = app.handle(request("GET", "/")).await;
        assert_eq!(res.status(), StatusCode::Ok);
        assert_eq!(*seen.lock().unwrap(), vec!["outer", "inner"]);
        let layers: Vec<_> = res.headers().get_all("x-layer").collect();
        assert_eq!(layers, vec!["inner", "outer"]);
    }

    #[tokio::test]
    async fn short_circuit_skips_endpoint() {
        let called = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&called);
        let app = Pipeline::new(handler(move |_ctx| {
            let flag = Arc::clone(&flag);
            async move {
                *flag.lock().unwrap() = true;
                Response::new(StatusCode::Ok)
            }
        }))
        .layer(Deny);

        let res = app.handle(request("GET", "/admin")).await;
        assert_eq!(res.status(), StatusCode::Forbidden);
        assert!(!*called.lock().unwrap());
    }

    #[tokio::test]
    async fn logger_passes_response_through() {
        let app = Pipeline::new(handler(|_ctx| async { Response::new(StatusCode::Accepted) }))
            .layer(LoggerMiddleware);
        let res = app.handle(request("POST", "/orders")).await;
        assert_eq!(res.status(), StatusCode::Accepted);
    }
}
