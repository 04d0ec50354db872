//! `stockroom-auth`: authentication/authorization boundary.
//!
//! This crate is intentionally decoupled from HTTP and storage.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod password;
pub mod permissions;
pub mod roles;
pub mod user;

pub use authorize::{authorize, AuthzError, CommandAuthorization, Principal};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256Jwt, JwtValidator, TokenError};
pub use password::{PasswordError, hash_password, verify_password};
pub use permissions::Permission;
pub use roles::Role;
pub use user::{
    MIN_PASSWORD_LEN, NewUser, PasswordResetToken, ProfileUpdate, ResetChannel, User, check_password,
    normalize_email, normalize_phone, role_for_new_account,
};
