//! User accounts, profile edits and password-reset tokens.
//!
//! Password hashing happens outside these types: callers hash with
//! [`crate::hash_password`] and hand the PHC string in.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{DomainError, UserId};

use crate::Role;

pub const MIN_PASSWORD_LEN: usize = 6;
pub const DEFAULT_DISPLAY_NAME: &str = "User";
const MAX_EMAIL_LEN: usize = 255;
const MAX_NAME_LEN: usize = 120;
const MAX_PHONE_LEN: usize = 50;

/// A stored user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Apply an already validated profile update.
    ///
    /// `password_hash` is the hash of `update.password` when one was given.
    pub fn apply_profile(&mut self, update: &ProfileUpdate, password_hash: Option<String>) -> Result<(), DomainError> {
        if let Some(name) = &update.name {
            let name = name.trim();
            if !name.is_empty() {
                self.name = check_len("name", name, MAX_NAME_LEN)?.to_string();
            }
        }
        if let Some(phone) = &update.phone {
            self.phone = normalize_phone(phone)?;
        }
        if let Some(email) = &update.email {
            self.email = normalize_email(email)?;
        }
        if let Some(hash) = password_hash {
            self.password_hash = hash;
        }
        Ok(())
    }
}

/// Input for creating an account.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    pub password: String,
}

impl NewUser {
    pub fn validate(&self) -> Result<(), DomainError> {
        normalize_email(&self.email)?;
        check_password(&self.password)?;
        if let Some(phone) = &self.phone {
            normalize_phone(phone)?;
        }
        Ok(())
    }

    /// Build the stored account. `password_hash` must be the hash of `self.password`.
    pub fn into_user(self, id: UserId, role: Role, password_hash: String, now: DateTime<Utc>) -> Result<User, DomainError> {
        let email = normalize_email(&self.email)?;
        check_password(&self.password)?;

        let name = match self.name.as_deref().map(str::trim) {
            Some(n) if !n.is_empty() => check_len("name", n, MAX_NAME_LEN)?.to_string(),
            _ => DEFAULT_DISPLAY_NAME.to_string(),
        };
        let phone = match &self.phone {
            Some(p) => normalize_phone(p)?,
            None => None,
        };

        Ok(User {
            id,
            email,
            name,
            phone,
            password_hash,
            role,
            created_at: now,
        })
    }
}

/// Self-service profile edit. Absent fields are left unchanged; an empty
/// phone clears it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl ProfileUpdate {
    pub fn validate(&self) -> Result<(), DomainError> {
        if let Some(email) = &self.email {
            normalize_email(email)?;
        }
        if let Some(phone) = &self.phone {
            normalize_phone(phone)?;
        }
        if let Some(name) = &self.name {
            check_len("name", name.trim(), MAX_NAME_LEN)?;
        }
        if let Some(password) = self.new_password() {
            check_password(password)?;
        }
        Ok(())
    }

    /// The new password, if one was supplied. Empty means "keep current".
    pub fn new_password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }

    pub fn normalized_email(&self) -> Result<Option<String>, DomainError> {
        self.email.as_deref().map(normalize_email).transpose()
    }
}

/// Single-use password reset token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordResetToken {
    pub token: String,
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
}

impl PasswordResetToken {
    pub fn ttl() -> Duration {
        Duration::hours(1)
    }

    pub fn issue(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            token: uuid::Uuid::new_v4().simple().to_string(),
            user_id,
            expires_at: now + Self::ttl(),
            used: false,
        }
    }

    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        !self.used && now < self.expires_at
    }

    /// Validate a new password pair against this token.
    pub fn check_redeem(&self, password: &str, confirmation: &str, now: DateTime<Utc>) -> Result<(), DomainError> {
        if !self.is_usable(now) {
            return Err(DomainError::validation("reset token is invalid or expired"));
        }
        check_password(password)?;
        if password != confirmation {
            return Err(DomainError::validation("passwords do not match"));
        }
        Ok(())
    }
}

/// How the account asking for a reset identifies itself.
///
/// The link always goes to the account's email; a phone number only finds the account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResetChannel {
    #[default]
    Email,
    Phone,
}

impl std::str::FromStr for ResetChannel {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "email" => Ok(Self::Email),
            "phone" => Ok(Self::Phone),
            other => Err(DomainError::validation(format!("unknown reset channel: {other}"))),
        }
    }
}

/// Role for a newly registered account given how many accounts exist.
///
/// The very first account bootstraps the system as admin.
pub fn role_for_new_account(existing_users: u64) -> Role {
    if existing_users == 0 { Role::Admin } else { Role::Staff }
}

pub fn normalize_email(raw: &str) -> Result<String, DomainError> {
    let email = raw.trim().to_lowercase();
    let Some((local, domain)) = email.split_once('@') else {
        return Err(DomainError::validation("email must contain '@'"));
    };
    if local.is_empty() || domain.is_empty() {
        return Err(DomainError::validation("email is malformed"));
    }
    check_len("email", &email, MAX_EMAIL_LEN)?;
    Ok(email)
}

pub fn check_password(raw: &str) -> Result<(), DomainError> {
    if raw.chars().count() < MIN_PASSWORD_LEN {
        return Err(DomainError::validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// Trimmed phone number, or `None` when blank.
pub fn normalize_phone(raw: &str) -> Result<Option<String>, DomainError> {
    let phone = raw.trim();
    if phone.is_empty() {
        return Ok(None);
    }
    Ok(Some(check_len("phone", phone, MAX_PHONE_LEN)?.to_string()))
}

fn check_len<'a>(field: &str, value: &'a str, max: usize) -> Result<&'a str, DomainError> {
    if value.chars().count() > max {
        return Err(DomainError::validation(format!("{field} must be at most {max} characters")));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str, password: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            name: None,
            phone: Some("  ".to_string()),
            password: password.to_string(),
        }
    }

    #[test]
    fn first_account_is_admin() {
        assert_eq!(role_for_new_account(0), Role::Admin);
        assert_eq!(role_for_new_account(1), Role::Staff);
        assert_eq!(role_for_new_account(42), Role::Staff);
    }

    #[test]
    fn new_user_is_normalized() {
        let user = new_user("  Ops@Example.COM ", "secret1")
            .into_user(UserId::new(), Role::Staff, "hash".into(), Utc::now())
            .unwrap();

        assert_eq!(user.email, "ops@example.com");
        assert_eq!(user.name, DEFAULT_DISPLAY_NAME);
        assert_eq!(user.phone, None);
    }

    #[test]
    fn short_password_and_bad_email_are_rejected() {
        assert!(matches!(new_user("a@b.c", "12345").validate(), Err(DomainError::Validation(_))));
        assert!(matches!(new_user("no-at-sign", "123456").validate(), Err(DomainError::Validation(_))));
        assert!(new_user("a@b.c", "123456").validate().is_ok());
    }

    #[test]
    fn serialized_user_hides_hash() {
        let user = new_user("a@b.c", "123456")
            .into_user(UserId::new(), Role::Admin, "$argon2id$secret".into(), Utc::now())
            .unwrap();
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("argon2"));
        assert!(json.contains("\"role\":\"admin\""));
    }

    #[test]
    fn profile_update_keeps_absent_fields() {
        let mut user = new_user("a@b.c", "123456")
            .into_user(UserId::new(), Role::Staff, "old".into(), Utc::now())
            .unwrap();
        user.phone = Some("555".into());

        let update = ProfileUpdate {
            name: Some("Dana".into()),
            phone: Some(String::new()),
            email: None,
            password: Some(String::new()),
        };
        update.validate().unwrap();
        assert_eq!(update.new_password(), None);
        user.apply_profile(&update, None).unwrap();

        assert_eq!(user.name, "Dana");
        assert_eq!(user.phone, None);
        assert_eq!(user.email, "a@b.c");
        assert_eq!(user.password_hash, "old");
    }

    #[test]
    fn reset_token_rules() {
        let now = Utc::now();
        let token = PasswordResetToken::issue(UserId::new(), now);
        assert_eq!(token.token.len(), 32);

        assert!(token.check_redeem("abcdef", "abcdef", now).is_ok());
        assert!(token.check_redeem("abcdef", "abcdeg", now).is_err());
        assert!(token.check_redeem("abc", "abc", now).is_err());
        assert!(token.check_redeem("abcdef", "abcdef", now + Duration::minutes(61)).is_err());

        let used = PasswordResetToken { used: true, ..token };
        assert!(used.check_redeem("abcdef", "abcdef", now).is_err());
    }

    #[test]
    fn reset_channel_parses_case_insensitively() {
        assert_eq!(" Phone ".parse::<ResetChannel>().unwrap(), ResetChannel::Phone);
        assert_eq!("EMAIL".parse::<ResetChannel>().unwrap(), ResetChannel::Email);
        assert!(matches!("sms".parse::<ResetChannel>(), Err(DomainError::Validation(_))));
        assert_eq!(ResetChannel::default(), ResetChannel::Email);
    }
}
