//! A small storefront API wired through the full middleware stack.
//!
//! ```text
//! cargo run --example storefront
//!
//! curl -i localhost:8080/products                   # X-Cache: MISS
//! curl -i localhost:8080/products                   # X-Cache: HIT
//! curl -i -H 'Authorization: Bearer admin-token' \
//!      -X POST localhost:8080/admin/orders/1/approve
//! curl -i -H 'Authorization: Bearer admin-token' localhost:8080/admin/cache/stats
//! ```
//!
//! Settings come from `storefront.toml` and `STOREFRONT_*` variables; log
//! verbosity from `RUST_LOG`.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use storefront::cache::{CacheManager, ResponseCache};
use storefront::config::Settings;
use storefront::context::Context;
use storefront::middleware::LoggerMiddleware;
use storefront::security::{BearerAuth, Principal, RequireRole, SecurityHeaders};
use storefront::{Pipeline, Response, Router, Server, StatusCode};

#[derive(Debug, Clone, Serialize)]
struct Product {
    id: u64,
    name: String,
    price_cents: u64,
    active: bool,
}

#[derive(Debug, Clone, Serialize)]
struct Order {
    id: u64,
    customer: String,
    items: Vec<u64>,
    status: &'static str,
}

#[derive(Debug, Deserialize)]
struct NewOrder {
    items: Vec<u64>,
}

#[derive(Debug, Deserialize)]
struct ProductStatus {
    active: bool,
}

#[derive(Default)]
struct Catalog {
    products: BTreeMap<u64, Product>,
    orders: BTreeMap<u64, Order>,
}

type Store = Arc<Mutex<Catalog>>;

fn seed() -> Store {
    let mut catalog = Catalog::default();
    for (id, name, price_cents) in [
        (1, "Starter plan", 1_900),
        (2, "Pro plan", 4_900),
        (3, "Signals add-on", 990),
    ] {
        catalog.products.insert(
            id,
            Product {
                id,
                name: name.to_owned(),
                price_cents,
                active: true,
            },
        );
    }
    Arc::new(Mutex::new(catalog))
}

fn error(status: StatusCode, message: &str) -> Response {
    Response::json(status, &json!({ "error": message }))
}

fn routes(store: &Store, cache: &CacheManager) -> Router {
    let mut router = Router::new();

    let s = Arc::clone(store);
    router.get("/products", move |_ctx| {
        let s = Arc::clone(&s);
        async move {
            let catalog = s.lock().unwrap_or_else(PoisonError::into_inner);
            let products: Vec<_> = catalog.products.values().filter(|p| p.active).collect();
            Response::json(StatusCode::Ok, &products)
        }
    });

    let s = Arc::clone(store);
    router.get("/products/:id", move |ctx: Context| {
        let s = Arc::clone(&s);
        async move {
            let Some(id) = ctx.params().parse::<u64>("id") else {
                return error(StatusCode::BadRequest, "invalid product id");
            };
            let catalog = s.lock().unwrap_or_else(PoisonError::into_inner);
            match catalog.products.get(&id) {
                Some(product) => Response::json(StatusCode::Ok, product),
                None => error(StatusCode::NotFound, "product not found"),
            }
        }
    });

    let s = Arc::clone(store);
    router.get("/orders", move |ctx: Context| {
        let s = Arc::clone(&s);
        async move {
            let customer = ctx.extensions().get::<Principal>().map(|p| p.id.clone());
            let catalog = s.lock().unwrap_or_else(PoisonError::into_inner);
            let orders: Vec<_> = catalog
                .orders
                .values()
                .filter(|o| customer.as_ref().is_none_or(|c| &o.customer == c))
                .collect();
            Response::json(StatusCode::Ok, &orders)
        }
    });

    let s = Arc::clone(store);
    let c = cache.clone();
    router.post("/orders", move |ctx: Context| {
        let s = Arc::clone(&s);
        let c = c.clone();
        async move {
            let Some(customer) = ctx.extensions().get::<Principal>().map(|p| p.id.clone()) else {
                return error(StatusCode::Unauthorized, "sign in to place an order");
            };
            let new: NewOrder = match ctx.json() {
                Ok(new) => new,
                Err(e) => return error(StatusCode::BadRequest, &e.to_string()),
            };
            let order = {
                let mut catalog = s.lock().unwrap_or_else(PoisonError::into_inner);
                let id = catalog.orders.keys().next_back().map_or(1, |id| id + 1);
                let order = Order {
                    id,
                    customer,
                    items: new.items,
                    status: "pending",
                };
                catalog.orders.insert(id, order.clone());
                order
            };
            c.invalidate_quietly("^/orders");
            Response::json(StatusCode::Created, &order)
        }
    });

    let s = Arc::clone(store);
    let c = cache.clone();
    router.post("/admin/orders/:id/approve", move |ctx: Context| {
        let s = Arc::clone(&s);
        let c = c.clone();
        async move {
            let Some(id) = ctx.params().parse::<u64>("id") else {
                return error(StatusCode::BadRequest, "invalid order id");
            };
            let approved = {
                let mut catalog = s.lock().unwrap_or_else(PoisonError::into_inner);
                catalog.orders.get_mut(&id).map(|order| {
                    order.status = "approved";
                    order.clone()
                })
            };
            match approved {
                Some(order) => {
                    let removed = c.invalidate_quietly("^/orders");
                    info!(order = id, removed, "order approved");
                    Response::json(StatusCode::Ok, &order)
                }
                None => error(StatusCode::NotFound, "order not found"),
            }
        }
    });

    let s = Arc::clone(store);
    let c = cache.clone();
    router.put("/admin/products/:id/status", move |ctx: Context| {
        let s = Arc::clone(&s);
        let c = c.clone();
        async move {
            let Some(id) = ctx.params().parse::<u64>("id") else {
                return error(StatusCode::BadRequest, "invalid product id");
            };
            let status: ProductStatus = match ctx.json() {
                Ok(status) => status,
                Err(e) => return error(StatusCode::BadRequest, &e.to_string()),
            };
            let updated = {
                let mut catalog = s.lock().unwrap_or_else(PoisonError::into_inner);
                catalog.products.get_mut(&id).map(|product| {
                    product.active = status.active;
                    product.clone()
                })
            };
            match updated {
                Some(product) => {
                    c.invalidate_quietly("^/products");
                    Response::json(StatusCode::Ok, &product)
                }
                None => error(StatusCode::NotFound, "product not found"),
            }
        }
    });

    let c = cache.clone();
    router.get("/admin/cache/stats", move |_ctx| {
        let c = c.clone();
        async move {
            Response::json(
                StatusCode::Ok,
                &json!({ "entries": c.stats(), "metrics": c.metrics(), "keys": c.keys() }),
            )
        }
    });

    let c = cache.clone();
    router.delete("/admin/cache", move |_ctx| {
        let c = c.clone();
        async move { Response::json(StatusCode::Ok, &json!({ "removed": c.clear() })) }
    });

    router
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::load("storefront.toml")?;
    let cache = CacheManager::from_settings(&settings.cache);
    let sweeper = cache.start_sweeper(settings.cache.cleanup_interval());

    let store = seed();
    let router = routes(&store, &cache);

    let app = Pipeline::new(router.into_handler())
        .layer(LoggerMiddleware)
        .layer(
            BearerAuth::new()
                .token("admin-token", Principal::new("admin").with_role("admin"))
                .token("alice-token", Principal::new("alice")),
        )
        .layer(RequireRole::new("admin", "/admin"))
        .layer(SecurityHeaders::new())
        .layer(ResponseCache::from_settings(cache.clone(), &settings.cache));

    let server = Server::bind(&settings.bind_addr).await?;
    server
        .run_until(
            move |req| {
                let app = app.clone();
                async move { app.handle(req).await }
            },
            async {
                let _ = tokio::signal::ctrl_c().await;
            },
        )
        .await?;

    sweeper.shutdown().await;
    info!(entries = cache.size(), "storefront stopped");
    Ok(())
}
