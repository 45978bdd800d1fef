//! Security middleware — request authentication, role checks and hardening headers.
//!
//! - [`BearerAuth`] resolves `Authorization: Bearer <token>` into a [`Principal`]
//!   stored in the request [`Extensions`](crate::context::Extensions).
//! - [`RequireRole`] rejects requests under a path prefix unless the principal
//!   carries a role.
//! - [`SecurityHeaders`] appends hardening headers to every response.
//!
//! Middleware that behaves differently for signed-in users (the response
//! cache) looks for the [`Principal`] extension rather than parsing headers.

mod auth;
mod headers;

pub use auth::{BearerAuth, Principal, RequireRole};
pub use headers::SecurityHeaders;
