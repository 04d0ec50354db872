//! Process configuration, read once from the environment at startup.

use std::net::SocketAddr;

use anyhow::Context;

use stockroom_infra::SmtpConfig;
use stockroom_infra::mailer::DEFAULT_SMTP_PORT;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_TOKEN_TTL_MINUTES: i64 = 480;
pub const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:8080";
const DEV_JWT_SECRET: &str = "stockroom-dev-secret";

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
    /// Postgres connection string; the in-memory store is used when absent.
    pub database_url: Option<String>,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
    pub public_base_url: String,
    /// Reset mail is logged instead of sent when absent.
    pub smtp: Option<SmtpConfig>,
}

impl ApiConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_addr = get("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .context("BIND_ADDR must be a socket address like 0.0.0.0:8080")?;

        let jwt_secret = get("JWT_SECRET").unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET not set; using insecure dev default");
            DEV_JWT_SECRET.to_string()
        });

        let ttl_minutes = match get("TOKEN_TTL_MINUTES") {
            Some(raw) => raw
                .parse::<i64>()
                .ok()
                .filter(|m| *m > 0)
                .with_context(|| format!("TOKEN_TTL_MINUTES must be a positive integer, got '{raw}'"))?,
            None => DEFAULT_TOKEN_TTL_MINUTES,
        };

        let admin_email = get("STOCKROOM_ADMIN_EMAIL");
        let admin_password = get("STOCKROOM_ADMIN_PASSWORD");
        if admin_email.is_some() != admin_password.is_some() {
            anyhow::bail!("STOCKROOM_ADMIN_EMAIL and STOCKROOM_ADMIN_PASSWORD must be set together");
        }

        let smtp = smtp_from(&get)?;

        Ok(Self {
            bind_addr,
            jwt_secret,
            token_ttl: chrono::Duration::minutes(ttl_minutes),
            database_url: get("DATABASE_URL"),
            admin_email,
            admin_password,
            public_base_url: get("PUBLIC_BASE_URL").unwrap_or_else(|| DEFAULT_PUBLIC_BASE_URL.to_string()),
            smtp,
        })
    }

    /// Defaults with an explicit secret and no database. Used by tests and local runs.
    pub fn in_memory(jwt_secret: impl Into<String>) -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            jwt_secret: jwt_secret.into(),
            token_ttl: chrono::Duration::minutes(DEFAULT_TOKEN_TTL_MINUTES),
            database_url: None,
            admin_email: None,
            admin_password: None,
            public_base_url: DEFAULT_PUBLIC_BASE_URL.to_string(),
            smtp: None,
        }
    }
}

/// `SMTP_HOST`, `SMTP_USER` and `SMTP_PASS` switch mail on and must be set together.
/// `SMTP_PORT` defaults to 587 and `SMTP_FROM` to the user name.
fn smtp_from(get: &impl Fn(&str) -> Option<String>) -> anyhow::Result<Option<SmtpConfig>> {
    let (host, user, pass) = match (get("SMTP_HOST"), get("SMTP_USER"), get("SMTP_PASS")) {
        (Some(host), Some(user), Some(pass)) => (host, user, pass),
        (None, None, None) => {
            tracing::info!("SMTP not configured; reset links are written to the log");
            return Ok(None);
        }
        _ => anyhow::bail!("SMTP_HOST, SMTP_USER and SMTP_PASS must be set together"),
    };
    let port = match get("SMTP_PORT") {
        Some(raw) => raw
            .parse::<u16>()
            .ok()
            .filter(|p| *p > 0)
            .with_context(|| format!("SMTP_PORT must be a port number, got '{raw}'"))?,
        None => DEFAULT_SMTP_PORT,
    };
    let from = get("SMTP_FROM").unwrap_or_else(|| user.clone());
    Ok(Some(SmtpConfig {
        host,
        port,
        user,
        pass,
        from,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from(pairs: &[(&str, &str)]) -> anyhow::Result<ApiConfig> {
        let env: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        ApiConfig::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = from(&[]).unwrap();
        assert_eq!(cfg.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert_eq!(cfg.token_ttl, chrono::Duration::minutes(480));
        assert_eq!(cfg.database_url, None);
        assert_eq!(cfg.public_base_url, DEFAULT_PUBLIC_BASE_URL);
    }

    #[test]
    fn values_are_read_and_blank_is_unset() {
        let cfg = from(&[
            ("BIND_ADDR", "127.0.0.1:9000"),
            ("JWT_SECRET", "s3cret"),
            ("TOKEN_TTL_MINUTES", "15"),
            ("DATABASE_URL", "  "),
        ])
        .unwrap();
        assert_eq!(cfg.bind_addr.port(), 9000);
        assert_eq!(cfg.jwt_secret, "s3cret");
        assert_eq!(cfg.token_ttl, chrono::Duration::minutes(15));
        assert_eq!(cfg.database_url, None);
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(from(&[("TOKEN_TTL_MINUTES", "0")]).is_err());
        assert!(from(&[("BIND_ADDR", "nowhere")]).is_err());
        assert!(from(&[("STOCKROOM_ADMIN_EMAIL", "a@example.com")]).is_err());
    }

    #[test]
    fn smtp_is_off_unless_fully_configured() {
        assert_eq!(from(&[]).unwrap().smtp, None);
        assert!(from(&[("SMTP_HOST", "smtp.example.com")]).is_err());
        assert!(from(&[("SMTP_HOST", "smtp.example.com"), ("SMTP_USER", "mailer")]).is_err());

        let full = [("SMTP_HOST", "smtp.example.com"), ("SMTP_USER", "mailer"), ("SMTP_PASS", "pw")];
        let smtp = from(&full).unwrap().smtp.unwrap();
        assert_eq!(smtp.port, DEFAULT_SMTP_PORT);
        assert_eq!(smtp.from, "mailer");

        let mut custom = full.to_vec();
        custom.extend([("SMTP_PORT", "2525"), ("SMTP_FROM", "stock@example.com")]);
        let smtp = from(&custom).unwrap().smtp.unwrap();
        assert_eq!(smtp.port, 2525);
        assert_eq!(smtp.from, "stock@example.com");

        custom.push(("SMTP_PORT", "mail"));
        assert!(from(&custom).is_err());
    }
}
