//! Response-caching middleware over [`CacheManager`].

use std::pin::Pin;
use std::time::Duration;

use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    Method, Request, Response, StatusCode,
    config::CacheSettings,
    context::Context,
    middleware::{Middleware, Next},
    security::Principal,
};

use super::{CacheError, CacheManager};

/// Header reporting whether a GET response came from the cache.
pub const X_CACHE: &str = "X-Cache";

/// Caches successful JSON `GET` responses in a [`CacheManager`].
///
/// - Only `GET` requests are considered. Every other method passes straight
///   through: nothing is read, nothing is stored, no `X-Cache` header is set.
/// - Requests carrying a [`Principal`] bypass the cache unless the query
///   string sets the opt-in flag (`?cache=true` by default). The flag is not
///   part of the key, so signed-in users that opt in share entries with
///   everyone else requesting the same URL.
/// - The key is the request path plus `?` and the raw query string, exactly as
///   received. Parameter order matters.
/// - On a hit the stored response is replayed byte for byte (status, headers
///   and body) with `X-Cache: HIT`, and the downstream handler is not called.
/// - On a miss the handler runs. A `2xx` response with a valid JSON body is
///   stored under the key with the route's TTL, and the response goes out
///   with `X-Cache: MISS`. A response that cannot be stored is still sent
///   unchanged.
///
/// Concurrent misses for the same key each run the handler; the last one to
/// finish wins.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use storefront::cache::{CacheManager, ResponseCache};
///
/// let cache = CacheManager::new();
/// let layer = ResponseCache::new(cache.clone())
///     .route_ttl("/products", Duration::from_secs(600))
///     .route_ttl("/orders", Duration::from_secs(30));
/// ```
#[derive(Debug, Clone)]
pub struct ResponseCache {
    cache: CacheManager,
    enabled: bool,
    default_ttl: Duration,
    route_ttls: Vec<(String, Duration)>,
    opt_in_param: String,
}

impl ResponseCache {
    /// Caches into `cache`, using the cache's default TTL for every route.
    pub fn new(cache: CacheManager) -> Self {
        let default_ttl = cache.default_ttl();
        Self {
            cache,
            enabled: true,
            default_ttl,
            route_ttls: Vec::new(),
            opt_in_param: "cache".to_owned(),
        }
    }

    /// Builds the middleware from the `[cache]` settings section.
    pub fn from_settings(cache: CacheManager, settings: &CacheSettings) -> Self {
        let layer = Self::new(cache)
            .enabled(settings.enabled)
            .ttl(settings.default_ttl())
            .opt_in_param(settings.opt_in_param.clone());
        settings
            .routes
            .iter()
            .fold(layer, |layer, (prefix, secs)| {
                layer.route_ttl(prefix.clone(), Duration::from_secs(*secs))
            })
    }

    /// Turns caching off entirely; every request passes through.
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// TTL for routes without a more specific [`route_ttl`](Self::route_ttl).
    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// TTL for paths starting with `prefix`. The longest matching prefix wins.
    #[must_use]
    pub fn route_ttl(mut self, prefix: impl Into<String>, ttl: Duration) -> Self {
        self.route_ttls.push((prefix.into(), ttl));
        self
    }

    /// Query parameter that lets an authenticated request use the cache.
    #[must_use]
    pub fn opt_in_param(mut self, name: impl Into<String>) -> Self {
        self.opt_in_param = name.into();
        self
    }

    /// The TTL a response for `path` is stored with.
    pub fn ttl_for(&self, path: &str) -> Duration {
        self.route_ttls
            .iter()
            .filter(|(prefix, _)| path.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map_or(self.default_ttl, |(_, ttl)| *ttl)
    }

    /// The key a request is cached under.
    pub fn cache_key(request: &Request) -> String {
        request.uri()
    }

    fn bypasses(&self, ctx: &Context) -> bool {
        if !self.enabled || ctx.request().method() != &Method::Get {
            return true;
        }
        ctx.extensions().contains::<Principal>()
            && !ctx.request().query_flag(&self.opt_in_param)
    }
}

/// A response as it is kept in the cache.
#[derive(Debug, Serialize, Deserialize)]
struct CachedResponse {
    status: StatusCode,
    headers: Vec<(String, String)>,
    body: String,
}

impl CachedResponse {
    /// Captures `response` if it is cacheable; `Ok(None)` means it is skipped.
    fn capture(response: &Response) -> Result<Option<Self>, CacheError> {
        if !response.status().is_success() || !response.is_json() {
            return Ok(None);
        }
        let Ok(body) = std::str::from_utf8(response.body_ref()) else {
            return Ok(None);
        };
        serde_json::from_str::<IgnoredAny>(body)?;

        Ok(Some(Self {
            status: response.status(),
            headers: response
                .headers()
                .iter()
                .map(|(name, value)| (name.to_owned(), value.to_owned()))
                .collect(),
            body: body.to_owned(),
        }))
    }

    fn replay(self) -> Response {
        self.headers
            .into_iter()
            .fold(Response::new(self.status), |res, (name, value)| {
                res.header(name, value)
            })
            .body(self.body)
    }
}

impl Middleware for ResponseCache {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        if self.bypasses(&ctx) {
            return Box::pin(next.run(ctx));
        }

        let cache = self.cache.clone();
        let key = Self::cache_key(ctx.request());
        let ttl = self.ttl_for(ctx.request().path());

        Box::pin(async move {
            match cache.get_as::<CachedResponse>(&key) {
                Ok(Some(cached)) => {
                    debug!(%key, "response cache hit");
                    return cached.replay().header(X_CACHE, "HIT");
                }
                Ok(None) => {}
                Err(e) => warn!(%key, error = %e, "unreadable cache entry; treating as a miss"),
            }

            let mut response = next.run(ctx).await;

            let stored = CachedResponse::capture(&response).and_then(|cached| match cached {
                Some(cached) => cache.set_with_ttl(key.as_str(), &cached, ttl).map(|()| true),
                None => Ok(false),
            });
            match stored {
                Ok(true) => debug!(%key, ?ttl, "response cached"),
                Ok(false) => debug!(%key, status = %response.status(), "response not cacheable"),
                Err(e) => warn!(%key, error = %e, "failed to cache response; sending it uncached"),
            }

            response.set_header(X_CACHE, "MISS");
            response
        })
    }
}
