//! HTTP routes grouped by resource. Each group carries its own role policy and,
//! for cached reads, the response cache layer.

use axum::Router;
use axum::middleware::from_fn_with_state;

use crate::app::services::SharedCache;
use crate::middleware::{
    ADMIN_ONLY, ADMIN_OR_STAFF, RolePolicy, cache_middleware, role_middleware,
};

pub mod logs;
pub mod products;
pub mod stock;
pub mod system;

/// Everything under `/api`. Authentication is layered on by the caller.
pub fn api_router(cache: SharedCache) -> Router {
    Router::new()
        .nest(
            "/stock",
            guarded(stock::router(), &cache, RolePolicy::uniform(ADMIN_OR_STAFF)),
        )
        .nest(
            "/products",
            guarded(
                products::router(),
                &cache,
                RolePolicy {
                    read: ADMIN_OR_STAFF,
                    write: ADMIN_ONLY,
                },
            ),
        )
        .nest(
            "/logs",
            guarded(logs::router(), &cache, RolePolicy::uniform(ADMIN_ONLY)),
        )
}

/// Cache inside, role check outside: a hit is only served after authorization.
fn guarded(routes: Router, cache: &SharedCache, policy: RolePolicy) -> Router {
    routes
        .route_layer(from_fn_with_state(cache.clone(), cache_middleware))
        .route_layer(from_fn_with_state(policy, role_middleware))
}
