use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use stockroom_auth::{NewUser, ResetChannel, Role, User};
use stockroom_core::{CategoryId, DomainError, ItemId};
use stockroom_infra::{ItemFilter, TransactionFilter};
use stockroom_ledger::TransactionKind;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    /// `email` (default) or `phone`.
    #[serde(default)]
    pub via: Option<String>,
    #[serde(default)]
    pub identifier: Option<String>,
    /// Older clients send only this.
    #[serde(default)]
    pub email: Option<String>,
}

impl ResetRequest {
    pub fn channel_and_identifier(&self) -> Result<(ResetChannel, &str), DomainError> {
        let via = match self.via.as_deref() {
            Some(raw) => raw.parse::<ResetChannel>()?,
            None => ResetChannel::Email,
        };
        let identifier = match (via, self.identifier.as_deref(), self.email.as_deref()) {
            (_, Some(identifier), _) => identifier,
            (ResetChannel::Email, None, Some(email)) => email,
            _ => return Err(DomainError::validation("identifier is required")),
        };
        Ok((via, identifier))
    }
}

#[derive(Debug, Deserialize)]
pub struct ResetTokenQuery {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetConfirmRequest {
    pub token: String,
    pub password: String,
    pub password_confirmation: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    #[serde(flatten)]
    pub user: NewUser,
    #[serde(default = "default_role")]
    pub role: Role,
}

fn default_role() -> Role {
    Role::Staff
}

#[derive(Debug, Deserialize)]
pub struct CategoryRequest {
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ItemsQuery {
    pub q: Option<String>,
    pub category_id: Option<CategoryId>,
}

impl From<ItemsQuery> for ItemFilter {
    fn from(q: ItemsQuery) -> Self {
        ItemFilter {
            q: q.q,
            category_id: q.category_id,
        }
    }
}

/// `kind` accepts `receive`, `issue` or `all`; dates are inclusive.
#[derive(Debug, Default, Deserialize)]
pub struct TransactionsQuery {
    pub kind: Option<String>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub q: Option<String>,
    pub item_id: Option<ItemId>,
}

impl TryFrom<TransactionsQuery> for TransactionFilter {
    type Error = stockroom_core::DomainError;

    fn try_from(q: TransactionsQuery) -> Result<Self, Self::Error> {
        let kind = match q.kind.as_deref().map(str::trim) {
            None | Some("") | Some("all") => None,
            Some(raw) => Some(raw.parse::<TransactionKind>()?),
        };
        if let (Some(start), Some(end)) = (q.start, q.end) {
            if start > end {
                return Err(stockroom_core::DomainError::validation("start must not be after end"));
            }
        }
        Ok(TransactionFilter {
            kind,
            start: q.start,
            end: q.end,
            keyword: q.q,
            item_id: q.item_id,
        })
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: User,
}

impl TokenResponse {
    pub fn bearer(access_token: String, ttl: chrono::Duration, user: User) -> Self {
        Self {
            access_token,
            token_type: "Bearer",
            expires_in: ttl.num_seconds(),
            user,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reset(body: serde_json::Value) -> ResetRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn reset_request_accepts_channel_or_bare_email() {
        let bare = reset(serde_json::json!({"email": "a@example.com"}));
        assert_eq!(bare.channel_and_identifier().unwrap(), (ResetChannel::Email, "a@example.com"));

        let phone = reset(serde_json::json!({"via": "phone", "identifier": "555-0100"}));
        assert_eq!(phone.channel_and_identifier().unwrap(), (ResetChannel::Phone, "555-0100"));

        let phone_without_number = reset(serde_json::json!({"via": "phone", "email": "a@example.com"}));
        assert!(phone_without_number.channel_and_identifier().is_err());
        assert!(reset(serde_json::json!({"via": "fax", "identifier": "x"})).channel_and_identifier().is_err());
        assert!(reset(serde_json::json!({})).channel_and_identifier().is_err());
    }

    #[test]
    fn transaction_query_kind_all_means_no_filter() {
        let filter = TransactionFilter::try_from(TransactionsQuery {
            kind: Some("all".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(filter.kind, None);

        let filter = TransactionFilter::try_from(TransactionsQuery {
            kind: Some("Issue".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(filter.kind, Some(TransactionKind::Issue));

        assert!(
            TransactionFilter::try_from(TransactionsQuery {
                kind: Some("transfer".into()),
                ..Default::default()
            })
            .is_err()
        );
    }

    #[test]
    fn reversed_date_range_is_rejected() {
        let q = TransactionsQuery {
            start: NaiveDate::from_ymd_opt(2024, 6, 2),
            end: NaiveDate::from_ymd_opt(2024, 6, 1),
            ..Default::default()
        };
        assert!(TransactionFilter::try_from(q).is_err());
    }

    #[test]
    fn create_user_defaults_to_staff() {
        let req: CreateUserRequest =
            serde_json::from_str(r#"{"email":"s@example.com","password":"secret1"}"#).unwrap();
        assert_eq!(req.role, Role::Staff);
        assert_eq!(req.user.email, "s@example.com");
    }
}
