use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are modeled as opaque strings (e.g. "stock.issue").
/// A special wildcard permission `"*"` can be used by policy layers to indicate
/// "allow all" without hardcoding domain permissions into tokens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

pub const ALL: Permission = Permission::from_static("*");

pub const CATALOG_READ: Permission = Permission::from_static("catalog.read");
pub const CATALOG_WRITE: Permission = Permission::from_static("catalog.write");
pub const CATALOG_DELETE: Permission = Permission::from_static("catalog.items.delete");

pub const STOCK_RECEIVE: Permission = Permission::from_static("stock.receive");
pub const STOCK_ISSUE: Permission = Permission::from_static("stock.issue");

pub const LEDGER_READ: Permission = Permission::from_static("ledger.read");
pub const LEDGER_AUDIT: Permission = Permission::from_static("ledger.audit");
pub const EXPORT_READ: Permission = Permission::from_static("export.read");

pub const USERS_MANAGE: Permission = Permission::from_static("users.manage");
