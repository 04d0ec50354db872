use std::sync::Arc;

use axum::{
    Json, Router,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};

use stockroom_auth::{ProfileUpdate, permissions};

use crate::app::dto::CreateUserRequest;
use crate::app::errors;
use crate::app::routes::common::CmdAuth;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

/// Mounted at the root: `/me` and `/users`.
pub fn router() -> Router {
    Router::new()
        .route("/me", get(get_me).put(update_me))
        .route("/users", get(list_users).post(create_user))
}

pub async fn get_me(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    match services.accounts.user(principal.user_id()).await {
        Ok(user) => Json(user).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// Any signed-in user may edit their own profile; role is not editable here.
pub async fn update_me(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<ProfileUpdate>,
) -> Response {
    match services.accounts.update_profile(principal.user_id(), body).await {
        Ok(user) => Json(user).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn list_users(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    if let Err(resp) = CmdAuth::new((), permissions::USERS_MANAGE).authorized(&principal) {
        return resp;
    }
    match services.accounts.list_users().await {
        Ok(users) => Json(users).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn create_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<CreateUserRequest>,
) -> Response {
    let body = match CmdAuth::new(body, permissions::USERS_MANAGE).authorized(&principal) {
        Ok(body) => body,
        Err(resp) => return resp,
    };
    match services.accounts.create_user(body.user, body.role).await {
        Ok(user) => (StatusCode::CREATED, Json(user)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
