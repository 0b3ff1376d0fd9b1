use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};

use stockroom_core::ProductId;
use stockroom_infra::audit::RequestMeta;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route("/:id", get(get_product).put(update_product).delete(delete_product))
}

pub async fn list_products(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.store().list_products().await {
        Ok(products) => Json(products.iter().map(dto::product_json).collect::<Vec<_>>()).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: ProductId = match dto::parse_id(&id, "id") {
        Ok(id) => id,
        Err(response) => return response,
    };

    match services.store().get_product(id).await {
        Ok(Some(product)) => Json(dto::product_json(&product)).into_response(),
        Ok(None) => errors::not_found("Product not found."),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn create_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<ActorContext>,
    Extension(meta): Extension<RequestMeta>,
    body: Result<Json<dto::CreateProductRequest>, JsonRejection>,
) -> axum::response::Response {
    let new_product = match body
        .map_err(errors::json_rejection_to_response)
        .and_then(|Json(body)| body.into_new_product())
    {
        Ok(p) => p,
        Err(response) => return response,
    };

    match services.catalog().create(new_product, ctx.actor(), &meta).await {
        Ok(product) => (StatusCode::CREATED, Json(dto::product_json(&product))).into_response(),
        Err(e) => errors::catalog_error_to_response(e),
    }
}

pub async fn update_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<ActorContext>,
    Extension(meta): Extension<RequestMeta>,
    Path(id): Path<String>,
    body: Result<Json<dto::UpdateProductRequest>, JsonRejection>,
) -> axum::response::Response {
    let id: ProductId = match dto::parse_id(&id, "id") {
        Ok(id) => id,
        Err(response) => return response,
    };
    let patch = match body
        .map_err(errors::json_rejection_to_response)
        .and_then(|Json(body)| body.into_patch())
    {
        Ok(p) => p,
        Err(response) => return response,
    };

    match services.catalog().update(id, patch, ctx.actor(), &meta).await {
        Ok(product) => Json(dto::product_json(&product)).into_response(),
        Err(e) => errors::catalog_error_to_response(e),
    }
}

pub async fn delete_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<ActorContext>,
    Extension(meta): Extension<RequestMeta>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: ProductId = match dto::parse_id(&id, "id") {
        Ok(id) => id,
        Err(response) => return response,
    };

    match services.catalog().delete(id, ctx.actor(), &meta).await {
        Ok(product) => Json(serde_json::json!({
            "message": "Product deleted successfully",
            "id": product.id,
        }))
        .into_response(),
        Err(e) => errors::catalog_error_to_response(e),
    }
}
