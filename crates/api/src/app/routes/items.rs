use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};

use stockroom_auth::permissions;
use stockroom_core::ItemId;
use stockroom_ledger::ItemDraft;

use crate::app::dto::ItemsQuery;
use crate::app::errors;
use crate::app::routes::common::{CmdAuth, parse_id};
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_items).post(create_item))
        .route("/:id", get(get_item).put(update_item).delete(delete_item))
        .route("/:id/lots", get(item_lots))
}

/// Item summaries with on-hand totals; `q` matches name substrings.
pub async fn list_items(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<ItemsQuery>,
) -> Response {
    let query = match CmdAuth::new(query, permissions::CATALOG_READ).authorized(&principal) {
        Ok(q) => q,
        Err(resp) => return resp,
    };
    match services.catalog.list_items(&query.into()).await {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn create_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<ItemDraft>,
) -> Response {
    let draft = match CmdAuth::new(body, permissions::CATALOG_WRITE).authorized(&principal) {
        Ok(d) => d,
        Err(resp) => return resp,
    };
    match services.catalog.create_item(&draft).await {
        Ok(item) => (StatusCode::CREATED, Json(item)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn get_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let id: ItemId = match CmdAuth::new(id, permissions::CATALOG_READ)
        .authorized(&principal)
        .and_then(|raw| parse_id(&raw))
    {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match services.catalog.item(id).await {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn update_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<ItemDraft>,
) -> Response {
    let draft = match CmdAuth::new(body, permissions::CATALOG_WRITE).authorized(&principal) {
        Ok(d) => d,
        Err(resp) => return resp,
    };
    let id: ItemId = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match services.catalog.update_item(id, &draft).await {
        Ok(item) => Json(item).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// Only items without lots or transactions can be deleted (409 otherwise).
pub async fn delete_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let id: ItemId = match CmdAuth::new(id, permissions::CATALOG_DELETE)
        .authorized(&principal)
        .and_then(|raw| parse_id(&raw))
    {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match services.catalog.delete_item(id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn item_lots(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let id: ItemId = match CmdAuth::new(id, permissions::CATALOG_READ)
        .authorized(&principal)
        .and_then(|raw| parse_id(&raw))
    {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match services.catalog.item_lots(id).await {
        Ok(lots) => Json(lots).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
