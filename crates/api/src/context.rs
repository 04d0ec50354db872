use stockroom_auth::{JwtClaims, Principal, Role};
use stockroom_core::UserId;

/// Authenticated identity for a request, derived from verified token claims.
///
/// Inserted by the auth middleware; every protected handler can extract it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    user_id: UserId,
    email: String,
    role: Role,
}

impl PrincipalContext {
    pub fn new(user_id: UserId, email: impl Into<String>, role: Role) -> Self {
        Self {
            user_id,
            email: email.into(),
            role,
        }
    }

    pub fn from_claims(claims: &JwtClaims) -> Self {
        Self::new(claims.sub, claims.email.clone(), claims.role)
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn to_principal(&self) -> Principal {
        Principal {
            user_id: self.user_id,
            email: self.email.clone(),
            role: self.role,
        }
    }
}
