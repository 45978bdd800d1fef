use std::pin::Pin;

use crate::{
    Response,
    context::Context,
    middleware::{Middleware, Next},
};

/// Appends hardening headers to every response that does not already carry them.
///
/// | Header                      | Default value                           |
/// |-----------------------------|-----------------------------------------|
/// | `X-Content-Type-Options`    | `nosniff`                               |
/// | `X-Frame-Options`           | `DENY`                                  |
/// | `Referrer-Policy`           | `no-referrer`                           |
/// | `Strict-Transport-Security` | `max-age=31536000; includeSubDomains`   |
///
/// ```rust
/// use storefront::security::SecurityHeaders;
///
/// let headers = SecurityHeaders::new().header("Content-Security-Policy", "default-src 'self'");
/// ```
#[derive(Debug, Clone)]
pub struct SecurityHeaders {
    headers: Vec<(String, String)>,
}

impl Default for SecurityHeaders {
    fn default() -> Self {
        Self::new()
    }
}

impl SecurityHeaders {
    pub fn new() -> Self {
        let headers = [
            ("X-Content-Type-Options", "nosniff"),
            ("X-Frame-Options", "DENY"),
            ("Referrer-Policy", "no-referrer"),
            ("Strict-Transport-Security", "max-age=31536000; includeSubDomains"),
        ];
        Self {
            headers: headers
                .into_iter()
                .map(|(name, value)| (name.to_owned(), value.to_owned()))
                .collect(),
        }
    }

    /// Adds a header, or replaces the default value of one already listed.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some(slot) => slot.1 = value,
            None => self.headers.push((name, value)),
        }
        self
    }
}

impl Middleware for SecurityHeaders {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let headers = self.headers.clone();
        Box::pin(async move {
            let mut response = next.run(ctx).await;
            for (name, value) in headers {
                if !response.headers().contains(&name) {
                    response.add_header(name, value);
                }
            }
            response
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Request, StatusCode, middleware::Pipeline, router::handler};

    #[tokio::test]
    async fn adds_defaults_without_clobbering_handler_headers() {
        let app = Pipeline::new(handler(|_ctx| async {
            Response::new(StatusCode::Ok).header("X-Frame-Options", "SAMEORIGIN")
        }))
        .layer(SecurityHeaders::new().header("Content-Security-Policy", "default-src 'self'"));

        let (req, _) = Request::parse(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
        let res = app.handle(req).await;

        assert_eq!(res.headers().get("x-content-type-options"), Some("nosniff"));
        assert_eq!(res.headers().get("x-frame-options"), Some("SAMEORIGIN"));
        assert_eq!(res.headers().get_all("x-frame-options").count(), 1);
        assert_eq!(
            res.headers().get("content-security-policy"),
            Some("default-src 'self'")
        );
    }
}
