//! API-side authorization guard for commands.
//!
//! Permissions are checked at the request boundary, before any service call,
//! so the services and stores stay auth-agnostic.

use stockroom_auth::{AuthzError, CommandAuthorization, authorize};

use crate::context::PrincipalContext;

/// Check every permission the command requires for the current principal.
pub fn authorize_command<C: CommandAuthorization>(principal: &PrincipalContext, command: &C) -> Result<(), AuthzError> {
    let principal = principal.to_principal();
    for perm in command.required_permissions() {
        authorize(&principal, perm)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockroom_auth::{Permission, Role, permissions};
    use stockroom_core::UserId;

    struct Needs(Vec<Permission>);

    impl CommandAuthorization for Needs {
        fn required_permissions(&self) -> &[Permission] {
            &self.0
        }
    }

    #[test]
    fn all_permissions_must_be_granted() {
        let staff = PrincipalContext::new(UserId::new(), "s@example.com", Role::Staff);
        assert!(authorize_command(&staff, &Needs(vec![permissions::STOCK_ISSUE])).is_ok());
        assert!(authorize_command(&staff, &Needs(vec![permissions::STOCK_ISSUE, permissions::USERS_MANAGE])).is_err());

        let admin = PrincipalContext::new(UserId::new(), "a@example.com", Role::Admin);
        assert!(authorize_command(&admin, &Needs(vec![permissions::USERS_MANAGE])).is_ok());
    }
}
