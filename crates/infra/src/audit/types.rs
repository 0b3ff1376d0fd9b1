use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use stockroom_auth::Actor;
use stockroom_core::UserId;
use stockroom_inventory::MovementKind;

/// Mutating actions recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditAction {
    StockIn,
    StockOut,
    StockAdjustment,
    AddProduct,
    UpdateProduct,
    DeleteProduct,
}

impl AuditAction {
    pub fn label(&self) -> &'static str {
        match self {
            AuditAction::StockIn => "Stock In",
            AuditAction::StockOut => "Stock Out",
            AuditAction::StockAdjustment => "Stock Adjustment",
            AuditAction::AddProduct => "Add Product",
            AuditAction::UpdateProduct => "Update Product",
            AuditAction::DeleteProduct => "Delete Product",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl From<MovementKind> for AuditAction {
    fn from(kind: MovementKind) -> Self {
        match kind {
            MovementKind::In => AuditAction::StockIn,
            MovementKind::Out => AuditAction::StockOut,
            MovementKind::Adjustment => AuditAction::StockAdjustment,
        }
    }
}

/// Where a request came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestMeta {
    pub fn new(ip_address: Option<String>, user_agent: Option<String>) -> Self {
        Self {
            ip_address,
            user_agent,
        }
    }
}

/// One audit record.
///
/// The audit store has no foreign keys into the stock store; `user_id` and
/// any ids inside `details` are plain numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: Uuid,
    pub user_id: Option<UserId>,
    pub username: String,
    pub role: String,
    pub action: String,
    pub details: JsonValue,
    pub timestamp: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl AuditEntry {
    pub fn new(actor: &Actor, action: AuditAction, details: JsonValue, meta: &RequestMeta) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id: Some(actor.user_id),
            username: actor.username.clone(),
            role: actor.role.as_str().to_string(),
            action: action.label().to_string(),
            details,
            timestamp: Utc::now(),
            ip_address: meta.ip_address.clone(),
            user_agent: meta.user_agent.clone(),
        }
    }
}
