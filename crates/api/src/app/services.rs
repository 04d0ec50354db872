use std::sync::Arc;

use anyhow::Context;

use stockroom_auth::Hs256Jwt;
use stockroom_infra::{Accounts, Catalog, InMemoryStore, LogMailer, Mailer, PostgresStore, SmtpMailer, StockLedger, Store};

use crate::config::ApiConfig;

/// Shared handles passed to every handler through an `Extension`.
pub struct AppServices {
    pub catalog: Catalog,
    pub ledger: StockLedger,
    pub accounts: Accounts,
    pub jwt: Arc<Hs256Jwt>,
}

impl AppServices {
    pub fn new(store: Arc<dyn Store>, config: &ApiConfig) -> anyhow::Result<Self> {
        let mailer: Arc<dyn Mailer> = match &config.smtp {
            Some(smtp) => {
                tracing::info!(host = %smtp.host, port = smtp.port, "reset mail goes out over SMTP");
                Arc::new(SmtpMailer::new(smtp).context("invalid SMTP settings")?)
            }
            None => Arc::new(LogMailer),
        };
        Ok(Self {
            catalog: Catalog::new(Arc::clone(&store)),
            ledger: StockLedger::new(Arc::clone(&store)),
            accounts: Accounts::new(store, config.public_base_url.clone()).with_mailer(mailer),
            jwt: Arc::new(Hs256Jwt::new(config.jwt_secret.as_bytes(), config.token_ttl)),
        })
    }
}

/// Open the configured store: Postgres when `DATABASE_URL` is set, otherwise in-memory.
pub async fn open_store(config: &ApiConfig) -> anyhow::Result<Arc<dyn Store>> {
    match &config.database_url {
        Some(url) => {
            let store = PostgresStore::connect(url).await.context("failed to connect to postgres")?;
            store.migrate().await.context("failed to apply schema")?;
            tracing::info!("using postgres store");
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory store (data is lost on restart)");
            Ok(Arc::new(InMemoryStore::new()))
        }
    }
}

/// Create the configured admin account if no account exists yet.
pub async fn seed_admin(services: &AppServices, config: &ApiConfig) -> anyhow::Result<()> {
    let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) else {
        return Ok(());
    };
    match services.accounts.seed_admin(email, password).await.context("failed to seed admin account")? {
        Some(user) => tracing::info!(user_id = %user.id, "seeded admin account"),
        None => tracing::debug!("accounts exist; admin seed skipped"),
    }
    Ok(())
}
