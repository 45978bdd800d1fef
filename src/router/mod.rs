//! Method + path routing.
//!
//! | Pattern         | Matches                | Params                       |
//! |-----------------|------------------------|------------------------------|
//! | `/products`     | `/products`            |                              |
//! | `/products/:id` | `/products/42`         | `id = "42"`                  |
//! | `/static/*`     | `/static/css/site.css` | `wildcard = "/css/site.css"` |
//!
//! Empty segments are ignored on both sides, so `/products/` and `/products`
//! are the same route. Routes are tried in registration order and the first
//! match wins; no match is a `404`.
//!
//! The router normally sits at the end of a
//! [`Pipeline`](crate::middleware::Pipeline) via [`Router::into_handler`].

use std::pin::Pin;
use std::sync::Arc;

use crate::context::{Context, PathParams};
use crate::{Method, Request, Response, StatusCode};

/// A type-erased async handler.
pub type Handler =
    Arc<dyn Fn(Context) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static>;

/// Anything callable as `async fn(Context) -> Response`.
pub trait IntoHandler: Send + Sync + 'static {
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin((self)(ctx))
    }
}

/// Erase an async function into a [`Handler`].
///
/// ```rust
/// use storefront::{Response, StatusCode, router::handler};
///
/// let h = handler(|_ctx| async { Response::new(StatusCode::NoContent) });
/// ```
pub fn handler(handler: impl IntoHandler) -> Handler {
    Arc::new(move |ctx| handler.call(ctx))
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Param(String),
}

#[derive(Debug, Clone, PartialEq)]
struct Pattern {
    segments: Vec<Segment>,
    // Trailing `/*`: the rest of the path is captured as `wildcard`.
    wildcard: bool,
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

impl Pattern {
    fn parse(pattern: &str) -> Self {
        let trimmed = pattern.trim_end_matches('/');
        let (body, wildcard) = match trimmed.strip_suffix("/*") {
            Some(prefix) => (prefix, true),
            None => (trimmed, false),
        };
        let segments = split_path(body)
            .map(|s| match s.strip_prefix(':') {
                Some(name) => Segment::Param(name.to_owned()),
                None => Segment::Literal(s.to_owned()),
            })
            .collect();
        Self { segments, wildcard }
    }

    fn matches(&self, path: &str) -> Option<PathParams> {
        let parts: Vec<&str> = split_path(path).collect();
        let fits = if self.wildcard {
            parts.len() >= self.segments.len()
        } else {
            parts.len() == self.segments.len()
        };
        if !fits {
            return None;
        }

        let mut params = PathParams::new();
        for (segment, part) in self.segments.iter().zip(&parts) {
            match segment {
                Segment::Literal(literal) if literal != part => return None,
                Segment::Literal(_) => {}
                Segment::Param(name) => params.insert(name.clone(), (*part).to_owned()),
            }
        }

        if self.wildcard {
            let rest: String = parts[self.segments.len()..]
                .iter()
                .map(|part| format!("/{part}"))
                .collect();
            params.insert("wildcard".to_owned(), rest);
        }
        Some(params)
    }
}

struct Route {
    method: Method,
    pattern: Pattern,
    handler: Handler,
}

/// Dispatches requests to the first route whose method and pattern match.
///
/// ```rust,no_run
/// use storefront::context::Context;
/// use storefront::{Router, Response, StatusCode};
///
/// let mut router = Router::new();
/// router.get("/ping", |_ctx| async { Response::new(StatusCode::Ok) });
/// router.get("/products/:id", |ctx: Context| async move {
///     let id = ctx.params().get("id").unwrap_or("unknown").to_owned();
///     Response::new(StatusCode::Ok).body(id)
/// });
/// ```
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, path: &str, handler: impl IntoHandler) {
        self.add(Method::Get, path, handler);
    }

    pub fn post(&mut self, path: &str, handler: impl IntoHandler) {
        self.add(Method::Post, path, handler);
    }

    pub fn put(&mut self, path: &str, handler: impl IntoHandler) {
        self.add(Method::Put, path, handler);
    }

    pub fn delete(&mut self, path: &str, handler: impl IntoHandler) {
        self.add(Method::Delete, path, handler);
    }

    fn add(&mut self, method: Method, path: &str, handler: impl IntoHandler) {
        self.routes.push(Route {
            method,
            pattern: Pattern::parse(path),
            handler: self::handler(handler),
        });
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Dispatches a bare request.
    pub async fn route(&self, request: Request) -> Response {
        self.dispatch(Context::new(request)).await
    }

    /// Dispatches `ctx`, keeping the extensions earlier middleware attached.
    /// The matched route's path parameters replace any already present.
    pub async fn dispatch(&self, mut ctx: Context) -> Response {
        let matched = self.routes.iter().find_map(|route| {
            if &route.method != ctx.request().method() {
                return None;
            }
            route
                .pattern
                .matches(ctx.request().path())
                .map(|params| (route, params))
        });

        match matched {
            Some((route, params)) => {
                ctx.set_params(params);
                (route.handler)(ctx).await
            }
            None => Response::new(StatusCode::NotFound),
        }
    }

    /// Turns the router into the endpoint of a
    /// [`Pipeline`](crate::middleware::Pipeline).
    pub fn into_handler(self) -> Handler {
        let router = Arc::new(self);
        Arc::new(
            move |ctx: Context| -> Pin<Box<dyn Future<Output = Response> + Send>> {
                let router = Arc::clone(&router);
                Box::pin(async move { router.dispatch(ctx).await })
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(method: &str, path: &str) -> Request {
        let raw = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        Request::parse(raw.as_bytes()).unwrap().0
    }

    fn ok() -> impl IntoHandler {
        |_ctx: Context| async { Response::new(StatusCode::Ok) }
    }

    #[test]
    fn parse_classifies_segments() {
        let pattern = Pattern::parse("/orders/:id/items/:item/");
        assert!(!pattern.wildcard);
        assert_eq!(
            pattern.segments,
            vec![
                Segment::Literal("orders".into()),
                Segment::Param("id".into()),
                Segment::Literal("items".into()),
                Segment::Param("item".into()),
            ]
        );

        let pattern = Pattern::parse("/static/*");
        assert!(pattern.wildcard);
        assert_eq!(pattern.segments, vec![Segment::Literal("static".into())]);
    }

    #[test]
    fn literal_patterns() {
        let products = Pattern::parse("/products");
        assert!(products.matches("/products").is_some());
        assert!(products.matches("/products/").is_some());
        assert!(products.matches("/orders").is_none());
        assert!(products.matches("/products/1").is_none());

        let root = Pattern::parse("/");
        assert!(root.matches("/").is_some());
        assert!(root.matches("/other").is_none());
    }

    #[test]
    fn params_are_captured() {
        let pattern = Pattern::parse("/orders/:id/items/:item");
        let params = pattern.matches("/orders/7/items/99").unwrap();
        assert_eq!(params.get("id"), Some("7"));
        assert_eq!(params.parse::<u32>("item"), Some(99));

        assert!(pattern.matches("/orders/7/items").is_none());
        assert!(pattern.matches("/carts/7/items/99").is_none());
    }

    #[test]
    fn wildcard_captures_rest_on_segment_boundary() {
        let pattern = Pattern::parse("/static/*");
        let params = pattern.matches("/static/css/site.css").unwrap();
        assert_eq!(params.get("wildcard"), Some("/css/site.css"));
        assert_eq!(pattern.matches("/static").unwrap().get("wildcard"), Some(""));
        assert!(pattern.matches("/staticfiles/a.css").is_none());
        assert!(pattern.matches("/other/site.css").is_none());
    }

    #[tokio::test]
    async fn dispatch_by_method_and_path() {
        let mut router = Router::new();
        assert!(router.is_empty());
        router.get("/cart", ok());
        router.post("/cart", |_ctx| async { Response::new(StatusCode::Created) });
        router.put("/cart/:id", |_ctx| async { Response::new(StatusCode::Accepted) });
        router.delete("/cart/:id", |_ctx| async { Response::new(StatusCode::NoContent) });
        assert_eq!(router.len(), 4);

        let cases = [
            ("GET", "/cart", StatusCode::Ok),
            ("POST", "/cart", StatusCode::Created),
            ("PUT", "/cart/3", StatusCode::Accepted),
            ("DELETE", "/cart/3", StatusCode::NoContent),
            ("PATCH", "/cart/3", StatusCode::NotFound),
            ("GET", "/nowhere", StatusCode::NotFound),
        ];
        for (method, path, expected) in cases {
            let res = router.route(request(method, path)).await;
            assert_eq!(res.status(), expected, "{method} {path}");
        }
    }

    #[tokio::test]
    async fn first_registered_route_wins() {
        let mut router = Router::new();
        router.get("/products/:id", ok());
        router.get("/products/featured", |_ctx| async {
            Response::new(StatusCode::Accepted)
        });
        let res = router.route(request("GET", "/products/featured")).await;
        assert_eq!(res.status(), StatusCode::Ok);
    }

    #[tokio::test]
    async fn dispatch_keeps_extensions_and_sets_params() {
        #[derive(Clone)]
        struct Marker(&'static str);

        let mut router = Router::new();
        router.get("/orders/:id", |ctx: Context| async move {
            let marker = ctx.extensions().get::<Marker>().map(|m| m.0).unwrap_or("none");
            let id = ctx.params().get("id").unwrap_or("").to_owned();
            Response::new(StatusCode::Ok).body(format!("{marker}:{id}"))
        });

        let mut ctx = Context::new(request("GET", "/orders/5"));
        ctx.extensions_mut().insert(Marker("tagged"));
        let res = router.dispatch(ctx).await;
        assert_eq!(res.body_ref(), b"tagged:5");
    }

    #[tokio::test]
    async fn into_handler_dispatches() {
        let mut router = Router::new();
        router.get("/ping", ok());
        let h = router.into_handler();
        let res = h(Context::new(request("GET", "/ping"))).await;
        assert_eq!(res.status(), StatusCode::Ok);
        let res = h(Context::new(request("GET", "/nope"))).await;
        assert_eq!(res.status(), StatusCode::NotFound);
    }
}
