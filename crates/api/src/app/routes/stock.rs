use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use stockroom_core::ProductId;
use stockroom_infra::audit::RequestMeta;
use stockroom_infra::stock_store::MovementFilter;
use stockroom_inventory::MovementKind;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/in", post(stock_in))
        .route("/out", post(stock_out))
        .route("/adjustment", post(stock_adjustment))
        .route("/transactions", get(list_transactions))
        .route("/transactions/product/:product_id", get(list_product_transactions))
}

pub async fn stock_in(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<ActorContext>,
    Extension(meta): Extension<RequestMeta>,
    body: Result<Json<dto::MovementBody>, JsonRejection>,
) -> axum::response::Response {
    record(&services, &ctx, &meta, MovementKind::In, body).await
}

pub async fn stock_out(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<ActorContext>,
    Extension(meta): Extension<RequestMeta>,
    body: Result<Json<dto::MovementBody>, JsonRejection>,
) -> axum::response::Response {
    record(&services, &ctx, &meta, MovementKind::Out, body).await
}

pub async fn stock_adjustment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<ActorContext>,
    Extension(meta): Extension<RequestMeta>,
    body: Result<Json<dto::MovementBody>, JsonRejection>,
) -> axum::response::Response {
    record(&services, &ctx, &meta, MovementKind::Adjustment, body).await
}

async fn record(
    services: &AppServices,
    ctx: &ActorContext,
    meta: &RequestMeta,
    kind: MovementKind,
    body: Result<Json<dto::MovementBody>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };
    let request = match body.into_request(kind) {
        Ok(request) => request,
        Err(response) => return response,
    };

    match services.ledger().record(request, ctx.actor(), meta).await {
        Ok(receipt) => (StatusCode::CREATED, Json(dto::receipt_json(&receipt))).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn list_transactions(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    list(&services, MovementFilter::all()).await
}

pub async fn list_product_transactions(
    Extension(services): Extension<Arc<AppServices>>,
    Path(product_id): Path<String>,
) -> axum::response::Response {
    let product_id: ProductId = match dto::parse_id(&product_id, "productId") {
        Ok(id) => id,
        Err(response) => return response,
    };
    list(&services, MovementFilter::for_product(product_id)).await
}

async fn list(services: &AppServices, filter: MovementFilter) -> axum::response::Response {
    match services.store().list_movements(filter).await {
        Ok(views) => Json(
            views
                .iter()
                .map(dto::movement_view_json)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
