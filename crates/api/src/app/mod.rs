//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store selection and the service handles shared by handlers
//! - `routes/`: HTTP routes + handlers (one file per resource)
//! - `dto.rs`: request/response DTOs and query mapping
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router};
use tower::ServiceBuilder;

use stockroom_auth::JwtValidator;

use crate::config::ApiConfig;
use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
///
/// Opens the configured store, applies the schema and seeds the admin account.
pub async fn build_app(config: &ApiConfig) -> anyhow::Result<Router> {
    let store = services::open_store(config).await?;
    let services = services::AppServices::new(store, config)?;
    services::seed_admin(&services, config).await?;
    Ok(router(Arc::new(services)))
}

/// Router over already wired services.
pub fn router(services: Arc<services::AppServices>) -> Router {
    let jwt: Arc<dyn JwtValidator> = services.jwt.clone();
    let auth_state = middleware::AuthState { jwt };

    // Protected routes: require a valid bearer token.
    let protected = routes::router().layer(axum::middleware::from_fn_with_state(
        auth_state,
        middleware::auth_middleware,
    ));

    Router::new()
        .merge(routes::public_router())
        .merge(protected)
        .layer(ServiceBuilder::new().layer(Extension(services)))
}
