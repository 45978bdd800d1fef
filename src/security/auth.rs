use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::{
    Response, StatusCode,
    context::Context,
    middleware::{Middleware, Next},
};

/// The authenticated user attached to a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub id: String,
    pub roles: Vec<String>,
}

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            roles: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Resolves bearer tokens into [`Principal`]s.
///
/// Requests without a token, or with a token that is not registered, continue
/// anonymously; handlers and [`RequireRole`] decide whether that is allowed.
///
/// # Examples
///
/// ```rust
/// use storefront::security::{BearerAuth, Principal};
///
/// let auth = BearerAuth::new()
///     .token("s3cr3t", Principal::new("alice").with_role("admin"))
///     .token("t0k3n", Principal::new("bob"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct BearerAuth {
    tokens: Arc<HashMap<String, Principal>>,
}

impl BearerAuth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `token` as identifying `principal`.
    #[must_use]
    pub fn token(mut self, token: impl Into<String>, principal: Principal) -> Self {
        Arc::make_mut(&mut self.tokens).insert(token.into(), principal);
        self
    }

    fn resolve(&self, ctx: &Context) -> Option<Principal> {
        let header = ctx.request().headers().get("authorization")?;
        let (scheme, token) = header.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }
        self.tokens.get(token.trim()).cloned()
    }
}

impl Middleware for BearerAuth {
    fn handle(&self, mut ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        if let Some(principal) = self.resolve(&ctx) {
            debug!(principal = %principal.id, "request authenticated");
            ctx.extensions_mut().insert(principal);
        }
        Box::pin(next.run(ctx))
    }
}

/// Requires a [`Principal`] with `role` for every path under `prefix`.
///
/// Anonymous requests get `401 Unauthorized`; signed-in users without the role
/// get `403 Forbidden`. Paths outside the prefix pass through.
#[derive(Debug, Clone)]
pub struct RequireRole {
    role: String,
    prefix: String,
}

impl RequireRole {
    pub fn new(role: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            prefix: prefix.into(),
        }
    }

    fn covers(&self, path: &str) -> bool {
        path.strip_prefix(self.prefix.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/') || self.prefix.ends_with('/'))
    }
}

impl Middleware for RequireRole {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        if !self.covers(ctx.request().path()) {
            return Box::pin(next.run(ctx));
        }

        let status = match ctx.extensions().get::<Principal>() {
            None => Some(StatusCode::Unauthorized),
            Some(principal) if !principal.has_role(&self.role) => Some(StatusCode::Forbidden),
            Some(_) => None,
        };

        match status {
            Some(status) => {
                debug!(path = ctx.request().path(), role = %self.role, %status, "access denied");
                let body = serde_json::json!({ "error": status.canonical_reason() });
                Box::pin(async move { Response::json(status, &body) })
            }
            None => Box::pin(next.run(ctx)),
        }
    }
}
