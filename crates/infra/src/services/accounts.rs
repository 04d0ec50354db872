use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use stockroom_auth::{
    NewUser, PasswordResetToken, ProfileUpdate, ResetChannel, Role, User, hash_password, normalize_email,
    normalize_phone, role_for_new_account, verify_password,
};
use stockroom_core::{DomainError, UserId};

use crate::mailer::{LogMailer, Mailer, OutgoingMail};
use crate::store::{Store, StoreError, StoreResult};

use super::now;

pub const RESET_MAIL_SUBJECT: &str = "Stockroom password reset";

/// Accounts, sign-in and password resets.
pub struct Accounts<S: ?Sized = dyn Store> {
    store: Arc<S>,
    mailer: Arc<dyn Mailer>,
    public_base_url: String,
}

impl<S: ?Sized> Clone for Accounts<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            mailer: Arc::clone(&self.mailer),
            public_base_url: self.public_base_url.clone(),
        }
    }
}

/// Argon2 is CPU-bound; run it off the async worker threads.
async fn hash_blocking(password: &str) -> StoreResult<String> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| StoreError::Unavailable(format!("password hashing task failed: {e}")))?
        .map_err(StoreError::from)
}

async fn verify_blocking(password: &str, stored_hash: &str) -> StoreResult<bool> {
    let (password, stored_hash) = (password.to_string(), stored_hash.to_string());
    tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash))
        .await
        .map_err(|e| StoreError::Unavailable(format!("password check task failed: {e}")))?
        .map_err(StoreError::from)
}

impl<S: Store + ?Sized> Accounts<S> {
    /// `public_base_url` prefixes reset links, e.g. `https://stock.example.com`.
    /// Reset mail is logged until [`Accounts::with_mailer`] supplies a transport.
    pub fn new(store: Arc<S>, public_base_url: impl Into<String>) -> Self {
        Self {
            store,
            mailer: Arc::new(LogMailer),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = mailer;
        self
    }

    /// Bootstrap registration: allowed only while no account exists, and the
    /// account created is an admin. Afterwards admins add users.
    #[instrument(skip_all, fields(email = %new_user.email))]
    pub async fn register_first_admin(&self, new_user: NewUser) -> StoreResult<User> {
        new_user.validate()?;
        let existing = self.store.count_users().await?;
        if role_for_new_account(existing) != Role::Admin {
            return Err(DomainError::conflict("registration is closed; ask an admin for an account").into());
        }

        let hash = hash_blocking(&new_user.password).await?;
        let user = new_user.into_user(UserId::new(), Role::Admin, hash, now())?;
        // The store re-checks emptiness atomically.
        let user = self.store.insert_user(user, true).await?;
        info!(user_id = %user.id, "first admin registered");
        Ok(user)
    }

    /// Create the admin from configuration when the user table is empty.
    /// Returns `None` when accounts already exist.
    pub async fn seed_admin(&self, email: &str, password: &str) -> StoreResult<Option<User>> {
        if self.store.count_users().await? > 0 {
            return Ok(None);
        }
        let new_user = NewUser {
            email: email.to_string(),
            name: Some("Administrator".to_string()),
            phone: None,
            password: password.to_string(),
        };
        match self.register_first_admin(new_user).await {
            Ok(user) => Ok(Some(user)),
            // Lost a race with another bootstrap.
            Err(StoreError::Domain(DomainError::Conflict(_))) => Ok(None),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip_all, fields(email = %new_user.email, role = %role))]
    pub async fn create_user(&self, new_user: NewUser, role: Role) -> StoreResult<User> {
        new_user.validate()?;
        let hash = hash_blocking(&new_user.password).await?;
        let user = new_user.into_user(UserId::new(), role, hash, now())?;
        let user = self.store.insert_user(user, false).await?;
        info!(user_id = %user.id, "user created");
        Ok(user)
    }

    pub async fn list_users(&self) -> StoreResult<Vec<User>> {
        self.store.list_users().await
    }

    pub async fn user(&self, id: UserId) -> StoreResult<User> {
        self.store.get_user(id).await?.ok_or_else(|| DomainError::NotFound.into())
    }

    /// Unknown email and wrong password are indistinguishable to the caller.
    #[instrument(skip_all)]
    pub async fn authenticate(&self, email: &str, password: &str) -> StoreResult<User> {
        let Ok(email) = normalize_email(email) else {
            return Err(DomainError::Unauthorized.into());
        };
        let Some(user) = self.store.find_user_by_email(&email).await? else {
            return Err(DomainError::Unauthorized.into());
        };
        if !verify_blocking(password, &user.password_hash).await? {
            warn!(user_id = %user.id, "failed sign-in");
            return Err(DomainError::Unauthorized.into());
        }
        Ok(user)
    }

    #[instrument(skip(self, update), fields(user_id = %id))]
    pub async fn update_profile(&self, id: UserId, update: ProfileUpdate) -> StoreResult<User> {
        update.validate()?;
        let mut user = self.user(id).await?;

        if let Some(email) = update.normalized_email()? {
            if email != user.email {
                if let Some(other) = self.store.find_user_by_email(&email).await? {
                    if other.id != user.id {
                        return Err(DomainError::conflict("email already registered").into());
                    }
                }
            }
        }

        let hash = match update.new_password() {
            Some(password) => Some(hash_blocking(password).await?),
            None => None,
        };
        user.apply_profile(&update, hash)?;
        self.store.update_user(user).await
    }

    /// Find the account by email or phone and mail it a reset link.
    ///
    /// Always succeeds from the caller's point of view: unknown identifiers and
    /// failed deliveries are only logged. The link is returned for callers that
    /// deliver it themselves.
    #[instrument(skip_all, fields(via = ?via))]
    pub async fn request_password_reset(&self, via: ResetChannel, identifier: &str) -> StoreResult<Option<String>> {
        let user = match via {
            ResetChannel::Email => match normalize_email(identifier) {
                Ok(email) => self.store.find_user_by_email(&email).await?,
                Err(_) => None,
            },
            ResetChannel::Phone => match normalize_phone(identifier) {
                Ok(Some(phone)) => self.store.find_user_by_phone(&phone).await?,
                _ => None,
            },
        };
        let Some(user) = user else {
            info!("password reset requested for unknown account");
            return Ok(None);
        };

        let token = PasswordResetToken::issue(user.id, now());
        let link = format!("{}/auth/reset/confirm?token={}", self.public_base_url, token.token);
        self.store.insert_reset_token(token).await?;
        info!(user_id = %user.id, "password reset link issued");

        let mail = OutgoingMail {
            to: user.email.clone(),
            subject: RESET_MAIL_SUBJECT.to_string(),
            body: format!("Open this link within the hour to choose a new password:\n\n{link}\n"),
        };
        if let Err(e) = self.mailer.send(mail).await {
            warn!(user_id = %user.id, error = %e, "password reset mail not delivered");
        }
        Ok(Some(link))
    }

    /// Expiry of a reset token that can still be redeemed.
    pub async fn reset_token_expiry(&self, token: &str) -> StoreResult<Option<DateTime<Utc>>> {
        let at = now();
        Ok(self
            .store
            .get_reset_token(token)
            .await?
            .filter(|record| record.is_usable(at))
            .map(|record| record.expires_at))
    }

    #[instrument(skip_all)]
    pub async fn confirm_password_reset(&self, token: &str, password: &str, confirmation: &str) -> StoreResult<()> {
        let at = now();
        let record = self
            .store
            .get_reset_token(token)
            .await?
            .ok_or_else(|| DomainError::validation("reset token is invalid or expired"))?;
        record.check_redeem(password, confirmation, at)?;

        let hash = hash_blocking(password).await?;
        self.store.redeem_reset_token(token, hash, at).await?;
        info!(user_id = %record.user_id, "password reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::mailer::MailError;
    use crate::store::InMemoryStore;

    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<OutgoingMail>>,
        fail: bool,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
            self.sent.lock().unwrap().push(mail);
            if self.fail {
                return Err(MailError::Transport("connection refused".into()));
            }
            Ok(())
        }
    }

    fn accounts() -> Accounts {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        Accounts::new(store, "http://stock.test/")
    }

    fn new_user(email: &str, password: &str) -> NewUser {
        NewUser {
            email: email.into(),
            name: Some("Sam".into()),
            phone: None,
            password: password.into(),
        }
    }

    #[tokio::test]
    async fn only_the_first_registration_succeeds() {
        let accounts = accounts();
        let admin = accounts.register_first_admin(new_user("Boss@Example.com", "secret1")).await.unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert_eq!(admin.email, "boss@example.com");

        let err = accounts
            .register_first_admin(new_user("second@example.com", "secret1"))
            .await
            .unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::Conflict(_))));
    }

    #[tokio::test]
    async fn seeding_is_a_no_op_once_users_exist() {
        let accounts = accounts();
        assert!(accounts.seed_admin("root@example.com", "secret1").await.unwrap().is_some());
        assert!(accounts.seed_admin("root@example.com", "secret1").await.unwrap().is_none());
        assert_eq!(accounts.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn authenticate_is_case_insensitive_and_opaque() {
        let accounts = accounts();
        accounts.register_first_admin(new_user("a@example.com", "secret1")).await.unwrap();

        assert!(accounts.authenticate("A@EXAMPLE.com", "secret1").await.is_ok());

        let wrong = accounts.authenticate("a@example.com", "nope!!").await.unwrap_err();
        let unknown = accounts.authenticate("b@example.com", "secret1").await.unwrap_err();
        assert_eq!(wrong.domain(), Some(&DomainError::Unauthorized));
        assert_eq!(unknown.domain(), Some(&DomainError::Unauthorized));
    }

    #[tokio::test]
    async fn profile_email_must_stay_unique() {
        let accounts = accounts();
        accounts.register_first_admin(new_user("a@example.com", "secret1")).await.unwrap();
        let staff = accounts.create_user(new_user("b@example.com", "secret1"), Role::Staff).await.unwrap();

        let err = accounts
            .update_profile(
                staff.id,
                ProfileUpdate {
                    email: Some("A@example.com".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::Conflict(_))));

        let updated = accounts
            .update_profile(
                staff.id,
                ProfileUpdate {
                    phone: Some("555-0100".into()),
                    password: Some("longer-secret".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.phone.as_deref(), Some("555-0100"));
        assert!(accounts.authenticate("b@example.com", "longer-secret").await.is_ok());
    }

    #[tokio::test]
    async fn reset_flow_changes_password_once() {
        let accounts = accounts();
        accounts.register_first_admin(new_user("a@example.com", "secret1")).await.unwrap();

        let email = ResetChannel::Email;
        assert_eq!(accounts.request_password_reset(email, "nobody@example.com").await.unwrap(), None);
        let link = accounts.request_password_reset(email, "a@example.com").await.unwrap().unwrap();
        assert!(link.starts_with("http://stock.test/auth/reset/confirm?token="));
        let token = link.rsplit('=').next().unwrap();
        assert!(accounts.reset_token_expiry(token).await.unwrap().is_some());

        let mismatch = accounts.confirm_password_reset(token, "brand-new", "brand-neW").await.unwrap_err();
        assert!(matches!(mismatch.domain(), Some(DomainError::Validation(_))));

        accounts.confirm_password_reset(token, "brand-new", "brand-new").await.unwrap();
        assert!(accounts.authenticate("a@example.com", "brand-new").await.is_ok());

        let reused = accounts.confirm_password_reset(token, "again-new", "again-new").await.unwrap_err();
        assert!(matches!(reused.domain(), Some(DomainError::Validation(_))));
        assert_eq!(accounts.reset_token_expiry(token).await.unwrap(), None);
        assert_eq!(accounts.reset_token_expiry("no-such-token").await.unwrap(), None);
    }

    #[tokio::test]
    async fn reset_by_phone_mails_the_account_email() {
        let mailer = Arc::new(RecordingMailer::default());
        let accounts = accounts().with_mailer(mailer.clone());
        accounts.register_first_admin(new_user("a@example.com", "secret1")).await.unwrap();
        let mut with_phone = new_user("b@example.com", "secret1");
        with_phone.phone = Some(" 555-0100 ".into());
        accounts.create_user(with_phone, Role::Staff).await.unwrap();

        let phone = ResetChannel::Phone;
        assert_eq!(accounts.request_password_reset(phone, "555-0199").await.unwrap(), None);
        assert_eq!(accounts.request_password_reset(phone, "   ").await.unwrap(), None);
        let link = accounts.request_password_reset(phone, "555-0100").await.unwrap().unwrap();

        let sent = mailer.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "b@example.com");
        assert_eq!(sent[0].subject, RESET_MAIL_SUBJECT);
        assert!(sent[0].body.contains(&link));
    }

    #[tokio::test]
    async fn failed_delivery_still_issues_the_link() {
        let mailer = Arc::new(RecordingMailer {
            fail: true,
            ..Default::default()
        });
        let accounts = accounts().with_mailer(mailer.clone());
        accounts.register_first_admin(new_user("a@example.com", "secret1")).await.unwrap();

        let link = accounts
            .request_password_reset(ResetChannel::Email, "A@example.com")
            .await
            .unwrap()
            .unwrap();
        let token = link.rsplit('=').next().unwrap();
        assert!(accounts.reset_token_expiry(token).await.unwrap().is_some());
        assert_eq!(mailer.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_sign_ins_each_get_their_own_verdict() {
        let accounts = accounts();
        accounts.register_first_admin(new_user("a@example.com", "secret1")).await.unwrap();

        let attempts: Vec<_> = (0..4)
            .map(|i| {
                let accounts = accounts.clone();
                let password = if i % 2 == 0 { "secret1" } else { "wrong-one" };
                tokio::spawn(async move { accounts.authenticate("a@example.com", password).await.is_ok() })
            })
            .collect();

        let mut ok = 0;
        for attempt in attempts {
            if attempt.await.unwrap() {
                ok += 1;
            }
        }
        assert_eq!(ok, 2);
    }
}
