use core::str::FromStr;

use axum::response::Response;

use stockroom_auth::{CommandAuthorization, Permission};
use stockroom_core::DomainError;

use crate::app::errors;
use crate::authz::authorize_command;
use crate::context::PrincipalContext;

/// Small helper wrapper to associate required permissions with a command.
pub struct CmdAuth<C> {
    pub inner: C,
    pub required: Vec<Permission>,
}

impl<C> CommandAuthorization for CmdAuth<C> {
    fn required_permissions(&self) -> &[Permission] {
        &self.required
    }
}

impl<C> CmdAuth<C> {
    pub fn new(inner: C, required: Permission) -> Self {
        Self {
            inner,
            required: vec![required],
        }
    }

    /// Unwrap the command once the principal holds every required permission.
    pub fn authorized(self, principal: &PrincipalContext) -> Result<C, Response> {
        authorize_command(principal, &self).map_err(errors::authz_error_to_response)?;
        Ok(self.inner)
    }
}

/// Parse a path identifier, mapping failures to a 400.
pub fn parse_id<T>(raw: &str) -> Result<T, Response>
where
    T: FromStr<Err = DomainError>,
{
    raw.parse::<T>().map_err(errors::domain_error_to_response)
}
