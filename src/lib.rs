//! # storefront
//!
//! An async HTTP/1.1 storefront backend with an in-memory TTL response cache.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use storefront::cache::{CacheManager, ResponseCache};
//! use storefront::{Pipeline, Response, Router, Server, StatusCode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cache = CacheManager::new();
//!     let sweeper = cache.start_sweeper(Duration::from_secs(300));
//!
//!     let mut router = Router::new();
//!     router.get("/products", |_ctx| async {
//!         Response::json(StatusCode::Ok, &serde_json::json!([{"id": 1}]))
//!     });
//!
//!     let app = Pipeline::new(router.into_handler()).layer(ResponseCache::new(cache));
//!
//!     let server = Server::bind("127.0.0.1:8080").await?;
//!     server.run(move |req| {
//!         let app = app.clone();
//!         async move { app.handle(req).await }
//!     }).await?;
//!
//!     sweeper.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod background;
pub mod cache;
pub mod config;
pub mod context;
pub mod http;
pub mod middleware;
pub mod router;
pub mod security;
pub mod server;

pub use cache::CacheManager;
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use middleware::Pipeline;
pub use router::Router;
pub use server::{Server, ServerError};
