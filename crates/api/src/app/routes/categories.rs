use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, put},
};

use stockroom_auth::permissions;
use stockroom_core::CategoryId;

use crate::app::dto::CategoryRequest;
use crate::app::errors;
use crate::app::routes::common::{CmdAuth, parse_id};
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_categories).post(create_category))
        .route("/:id", put(rename_category))
}

pub async fn list_categories(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    if let Err(resp) = CmdAuth::new((), permissions::CATALOG_READ).authorized(&principal) {
        return resp;
    }
    match services.catalog.list_categories().await {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn create_category(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<CategoryRequest>,
) -> Response {
    let body = match CmdAuth::new(body, permissions::CATALOG_WRITE).authorized(&principal) {
        Ok(body) => body,
        Err(resp) => return resp,
    };
    match services.catalog.create_category(&body.name).await {
        Ok(category) => (StatusCode::CREATED, Json(category)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn rename_category(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<CategoryRequest>,
) -> Response {
    let body = match CmdAuth::new(body, permissions::CATALOG_WRITE).authorized(&principal) {
        Ok(body) => body,
        Err(resp) => return resp,
    };
    let id: CategoryId = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match services.catalog.rename_category(id, &body.name).await {
        Ok(category) => Json(category).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
