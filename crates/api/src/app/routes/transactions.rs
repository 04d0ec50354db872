use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Query},
    response::{IntoResponse, Response},
    routing::get,
};

use stockroom_auth::permissions;
use stockroom_infra::TransactionFilter;

use crate::app::dto::TransactionsQuery;
use crate::app::errors;
use crate::app::routes::common::CmdAuth;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

/// Mounted at the root: `/transactions` and `/ledger/reconcile`.
pub fn router() -> Router {
    Router::new()
        .route("/transactions", get(list_transactions))
        .route("/ledger/reconcile", get(reconcile))
}

/// Audit trail, newest first.
pub async fn list_transactions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<TransactionsQuery>,
) -> Response {
    let query = match CmdAuth::new(query, permissions::LEDGER_READ).authorized(&principal) {
        Ok(q) => q,
        Err(resp) => return resp,
    };
    let filter = match TransactionFilter::try_from(query) {
        Ok(f) => f,
        Err(e) => return errors::domain_error_to_response(e),
    };
    match services.ledger.transactions(&filter).await {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// Replays the audit trail against lot balances; empty `discrepancies` means consistent.
pub async fn reconcile(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    if let Err(resp) = CmdAuth::new((), permissions::LEDGER_AUDIT).authorized(&principal) {
        return resp;
    }
    match services.ledger.reconcile().await {
        Ok(discrepancies) => Json(serde_json::json!({
            "consistent": discrepancies.is_empty(),
            "discrepancies": discrepancies,
        }))
        .into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
