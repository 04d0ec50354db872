use core::str::FromStr;

use serde::{Deserialize, Serialize};

use stockroom_core::DomainError;

use crate::permissions::{self, Permission};

/// Role granted to a user account.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Full access, including user management and item deletion.
    Admin,
    /// Day-to-day stock handling.
    Staff,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Staff => "staff",
        }
    }

    /// Permissions granted by this role.
    pub fn permissions(&self) -> Vec<Permission> {
        match self {
            Role::Admin => vec![permissions::ALL],
            Role::Staff => vec![
                permissions::CATALOG_READ,
                permissions::CATALOG_WRITE,
                permissions::STOCK_RECEIVE,
                permissions::STOCK_ISSUE,
                permissions::LEDGER_READ,
                permissions::EXPORT_READ,
            ],
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "staff" => Ok(Role::Staff),
            other => Err(DomainError::validation(format!(
                "unknown role '{other}' (expected admin or staff)"
            ))),
        }
    }
}
