use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    response::IntoResponse,
    routing::get,
};

use stockroom_core::UserId;
use stockroom_infra::audit::{AuditEntry, AuditStoreError};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

const RECENT_LIMIT: usize = 100;
const PER_USER_LIMIT: usize = 50;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_logs))
        .route("/user/:user_id", get(list_user_logs))
}

pub async fn list_logs(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    respond(services.audit_store().recent(RECENT_LIMIT).await)
}

pub async fn list_user_logs(
    Extension(services): Extension<Arc<AppServices>>,
    Path(user_id): Path<String>,
) -> axum::response::Response {
    let user_id: UserId = match dto::parse_id(&user_id, "userId") {
        Ok(id) => id,
        Err(response) => return response,
    };
    respond(services.audit_store().for_user(user_id, PER_USER_LIMIT).await)
}

fn respond(entries: Result<Vec<AuditEntry>, AuditStoreError>) -> axum::response::Response {
    match entries {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => errors::audit_error_to_response(e),
    }
}
