use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Router,
    extract::Extension,
    http::header,
    response::{IntoResponse, Response},
    routing::get,
};

use stockroom_auth::permissions;
use stockroom_infra::{ItemFilter, TransactionFilter, export};

use crate::app::errors;
use crate::app::routes::common::CmdAuth;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/items.csv", get(items_csv))
        .route("/lots.csv", get(lots_csv))
        .route("/transactions.csv", get(transactions_csv))
}

pub async fn items_csv(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    if let Err(resp) = CmdAuth::new((), permissions::EXPORT_READ).authorized(&principal) {
        return resp;
    }
    let rows = match services.catalog.list_items(&ItemFilter::default()).await {
        Ok(rows) => rows,
        Err(e) => return errors::store_error_to_response(e),
    };
    match export::items_csv(&rows) {
        Ok(bytes) => csv_attachment("items.csv", bytes),
        Err(e) => errors::export_error_to_response(e),
    }
}

pub async fn lots_csv(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    if let Err(resp) = CmdAuth::new((), permissions::EXPORT_READ).authorized(&principal) {
        return resp;
    }
    let items = match services.catalog.list_items(&ItemFilter::default()).await {
        Ok(rows) => rows,
        Err(e) => return errors::store_error_to_response(e),
    };
    let lots = match services.ledger.all_lots().await {
        Ok(lots) => lots,
        Err(e) => return errors::store_error_to_response(e),
    };
    let names: HashMap<_, _> = items.into_iter().map(|s| (s.id, s.name)).collect();
    match export::lots_csv(&lots, &names) {
        Ok(bytes) => csv_attachment("lots.csv", bytes),
        Err(e) => errors::export_error_to_response(e),
    }
}

pub async fn transactions_csv(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    if let Err(resp) = CmdAuth::new((), permissions::EXPORT_READ).authorized(&principal) {
        return resp;
    }
    let rows = match services.ledger.transactions(&TransactionFilter::default()).await {
        Ok(rows) => rows,
        Err(e) => return errors::store_error_to_response(e),
    };
    match export::transactions_csv(&rows) {
        Ok(bytes) => csv_attachment("transactions.csv", bytes),
        Err(e) => errors::export_error_to_response(e),
    }
}

fn csv_attachment(filename: &str, bytes: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}\"")),
        ],
        bytes,
    )
        .into_response()
}
