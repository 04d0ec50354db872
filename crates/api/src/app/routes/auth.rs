//! Public account endpoints: bootstrap registration, login and password reset.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;

use stockroom_auth::{NewUser, User};

use crate::app::dto::{LoginRequest, ResetConfirmRequest, ResetRequest, ResetTokenQuery, TokenResponse};
use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/reset/request", post(request_reset))
        .route("/reset/confirm", get(check_reset_token).post(confirm_reset))
}

/// Only succeeds while no account exists; the account becomes the admin.
async fn register(Extension(services): Extension<Arc<AppServices>>, Json(body): Json<NewUser>) -> Response {
    let user = match services.accounts.register_first_admin(body).await {
        Ok(user) => user,
        Err(e) => return errors::store_error_to_response(e),
    };
    match token_for(&services, user) {
        Ok(token) => (StatusCode::CREATED, Json(token)).into_response(),
        Err(resp) => resp,
    }
}

async fn login(Extension(services): Extension<Arc<AppServices>>, Json(body): Json<LoginRequest>) -> Response {
    let user = match services.accounts.authenticate(&body.email, &body.password).await {
        Ok(user) => user,
        Err(e) => return errors::store_error_to_response(e),
    };
    match token_for(&services, user) {
        Ok(token) => Json(token).into_response(),
        Err(resp) => resp,
    }
}

/// Always 202 for a well-formed request, so callers cannot tell which accounts exist.
async fn request_reset(Extension(services): Extension<Arc<AppServices>>, Json(body): Json<ResetRequest>) -> Response {
    let (via, identifier) = match body.channel_and_identifier() {
        Ok(pair) => pair,
        Err(e) => return errors::domain_error_to_response(e),
    };
    match services.accounts.request_password_reset(via, identifier).await {
        Ok(_) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({
                "message": "if the account exists, a reset link has been issued",
            })),
        )
            .into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// Target of the emailed link: reports whether the token can still be redeemed.
/// The new password is then POSTed to the same path.
async fn check_reset_token(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<ResetTokenQuery>,
) -> Response {
    match services.accounts.reset_token_expiry(&query.token).await {
        Ok(expires_at) => Json(serde_json::json!({
            "token": query.token,
            "valid": expires_at.is_some(),
            "expires_at": expires_at,
        }))
        .into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

async fn confirm_reset(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<ResetConfirmRequest>,
) -> Response {
    match services
        .accounts
        .confirm_password_reset(&body.token, &body.password, &body.password_confirmation)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

fn token_for(services: &AppServices, user: User) -> Result<TokenResponse, Response> {
    let token = services.jwt.issue(user.id, &user.email, user.role, Utc::now()).map_err(|e| {
        tracing::error!(error = %e, "token signing failed");
        errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "token_error", "could not issue token")
    })?;
    Ok(TokenResponse::bearer(token, services.jwt.ttl(), user))
}
