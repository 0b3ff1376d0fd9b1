//! Role-based authorization (pure policy, no IO).

use thiserror::Error;

use crate::{Actor, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("Access denied: User role ({role}) is not authorized for this action.")]
    Forbidden { role: String },
}

/// Authorize an actor against the roles allowed for an action.
///
/// - No IO
/// - No panics
pub fn require_role(actor: &Actor, allowed: &[Role]) -> Result<(), AuthzError> {
    if actor.has_any_role(allowed) {
        Ok(())
    } else {
        tracing::debug!(
            user_id = %actor.user_id,
            role = %actor.role,
            "authorization denied"
        );
        Err(AuthzError::Forbidden {
            role: actor.role.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockroom_core::UserId;

    #[test]
    fn staff_may_move_stock_but_not_manage_products() {
        let staff = Actor::new(UserId::new(2), "sam", Role::STAFF);

        assert!(require_role(&staff, &[Role::ADMIN, Role::STAFF]).is_ok());
        assert_eq!(
            require_role(&staff, &[Role::ADMIN]),
            Err(AuthzError::Forbidden {
                role: "staff".to_string()
            })
        );
    }

    #[test]
    fn unknown_roles_are_never_authorized() {
        let guest = Actor::new(UserId::new(3), "gil", Role::new("auditor"));
        assert!(require_role(&guest, &[Role::ADMIN, Role::STAFF]).is_err());
    }
}
