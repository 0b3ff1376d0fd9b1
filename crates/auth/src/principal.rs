use serde::{Deserialize, Serialize};

use stockroom_core::UserId;

use crate::Role;

/// The authenticated user on whose behalf a request runs.
///
/// Carried into every stock movement (as `user_id`) and every audit entry
/// (id, username and role are copied by value; the audit store has no foreign
/// keys back into the relational store).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub username: String,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: UserId, username: impl Into<String>, role: Role) -> Self {
        Self {
            user_id,
            username: username.into(),
            role,
        }
    }

    pub fn has_any_role(&self, allowed: &[Role]) -> bool {
        allowed.iter().any(|r| *r == self.role)
    }
}
