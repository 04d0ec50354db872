use std::collections::HashSet;

use thiserror::Error;

use stockroom_core::UserId;

use crate::{Permission, Role};

/// A fully resolved principal for authorization decisions.
///
/// Construction of this object is intentionally decoupled from storage and
/// transport: the API derives it from verified token claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub email: String,
    pub role: Role,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Command-side authorization contract (checked at the command boundary).
///
/// Implement this on commands that require permissions.
/// The API layer should enforce these requirements before dispatching.
pub trait CommandAuthorization {
    fn required_permissions(&self) -> &[Permission];
}

/// Authorize a principal for one permission.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    let granted = principal.role.permissions();
    let perms: HashSet<&str> = granted.iter().map(|p| p.as_str()).collect();

    if perms.contains("*") || perms.contains(required.as_str()) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions;

    fn principal(role: Role) -> Principal {
        Principal {
            user_id: UserId::new(),
            email: "someone@example.com".to_string(),
            role,
        }
    }

    #[test]
    fn admin_wildcard_grants_everything() {
        let admin = principal(Role::Admin);
        for p in [
            permissions::USERS_MANAGE,
            permissions::CATALOG_DELETE,
            permissions::STOCK_ISSUE,
            Permission::new("anything.at.all"),
        ] {
            assert!(authorize(&admin, &p).is_ok(), "admin denied {p}");
        }
    }

    #[test]
    fn staff_handles_stock_but_not_users_or_deletes() {
        let staff = principal(Role::Staff);
        assert!(authorize(&staff, &permissions::STOCK_RECEIVE).is_ok());
        assert!(authorize(&staff, &permissions::STOCK_ISSUE).is_ok());
        assert!(authorize(&staff, &permissions::EXPORT_READ).is_ok());

        assert_eq!(
            authorize(&staff, &permissions::CATALOG_DELETE),
            Err(AuthzError::Forbidden("catalog.items.delete".to_string()))
        );
        assert!(authorize(&staff, &permissions::USERS_MANAGE).is_err());
        assert!(authorize(&staff, &permissions::LEDGER_AUDIT).is_err());
    }
}
