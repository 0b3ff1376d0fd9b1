use std::sync::Arc;

use axum::{
    body::Body,
    extract::{OriginalUri, Request, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use stockroom_auth::{JwtValidator, Role, require_role};
use stockroom_infra::cache::{CachedResponse, ResponseCache};

use crate::app::errors::json_error;
use crate::context::{ActorContext, request_meta};

/// Header reporting whether a GET was served from the response cache.
pub const CACHE_STATUS_HEADER: &str = "x-cache";

#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<dyn JwtValidator>,
}

/// Validates the bearer token and attaches the caller and request metadata.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(token) = extract_bearer(req.headers()) else {
        return json_error(StatusCode::UNAUTHORIZED, "unauthorized", "Not authorized, no token");
    };

    let claims = match state.jwt.validate(token, Utc::now()) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::debug!(error = %e, "rejected bearer token");
            return json_error(StatusCode::UNAUTHORIZED, "unauthorized", "Not authorized, token failed");
        }
    };

    let meta = request_meta(&req);
    req.extensions_mut().insert(ActorContext::new(claims.actor()));
    req.extensions_mut().insert(meta);

    next.run(req).await
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let token = headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")?
        .trim();

    (!token.is_empty()).then_some(token)
}

pub const ADMIN_ONLY: &[Role] = &[Role::ADMIN];
pub const ADMIN_OR_STAFF: &[Role] = &[Role::ADMIN, Role::STAFF];

/// Roles allowed on a route group, split by read (GET) and write methods.
#[derive(Debug, Clone, Copy)]
pub struct RolePolicy {
    pub read: &'static [Role],
    pub write: &'static [Role],
}

impl RolePolicy {
    pub const fn uniform(roles: &'static [Role]) -> Self {
        Self {
            read: roles,
            write: roles,
        }
    }

    fn for_method(&self, method: &Method) -> &'static [Role] {
        if method == Method::GET || method == Method::HEAD {
            self.read
        } else {
            self.write
        }
    }
}

/// Rejects callers whose role the group's policy does not allow.
///
/// Layered outside the cache so a cached response is never served to a
/// caller who could not have fetched it.
pub async fn role_middleware(
    State(policy): State<RolePolicy>,
    req: Request,
    next: Next,
) -> Response {
    let Some(ctx) = req.extensions().get::<ActorContext>() else {
        return json_error(StatusCode::UNAUTHORIZED, "unauthorized", "Not authorized");
    };

    if let Err(e) = require_role(ctx.actor(), policy.for_method(req.method())) {
        return json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    next.run(req).await
}

/// Read-through cache for GET routes, keyed by the full path and query.
///
/// Only `200` responses are stored, and only if no invalidation happened
/// while the handler ran.
pub async fn cache_middleware(
    State(cache): State<Arc<dyn ResponseCache>>,
    req: Request,
    next: Next,
) -> Response {
    if req.method() != Method::GET {
        return next.run(req).await;
    }

    let key = cache_key(&req);
    if let Some(hit) = cache.get(&key) {
        tracing::debug!(key = %key, "response cache hit");
        return cached_response(hit);
    }

    let generation = cache.generation();
    let response = next.run(req).await;
    if response.status() != StatusCode::OK {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(error = %e, key = %key, "failed to buffer response for caching");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "Server Error");
        }
    };

    let content_type = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let stored = cache.insert_if_fresh(
        key.clone(),
        CachedResponse {
            content_type,
            body: bytes.to_vec(),
        },
        generation,
    );
    if !stored {
        tracing::debug!(key = %key, "skipped cache fill after concurrent invalidation");
    }

    parts
        .headers
        .insert(CACHE_STATUS_HEADER, HeaderValue::from_static("MISS"));
    Response::from_parts(parts, Body::from(bytes))
}

fn cache_key(req: &Request) -> String {
    let uri = req
        .extensions()
        .get::<OriginalUri>()
        .map(|OriginalUri(uri)| uri)
        .unwrap_or_else(|| req.uri());

    uri.path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string())
}

fn cached_response(hit: CachedResponse) -> Response {
    let mut response = Response::new(Body::from(hit.body));
    let headers = response.headers_mut();
    if let Some(value) = hit
        .content_type
        .and_then(|ct| HeaderValue::from_str(&ct).ok())
    {
        headers.insert(header::CONTENT_TYPE, value);
    }
    headers.insert(CACHE_STATUS_HEADER, HeaderValue::from_static("HIT"));
    response
}
