use std::sync::Arc;

use axum::{
    Json, Router,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};

use stockroom_auth::permissions;
use stockroom_infra::{IssueRequest, ReceiveRequest};

use crate::app::errors;
use crate::app::routes::common::CmdAuth;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/receive", post(receive))
        .route("/issue", post(issue))
}

/// Book a new lot; answers with the lot and its receipt transaction.
pub async fn receive(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<ReceiveRequest>,
) -> Response {
    let request = match CmdAuth::new(body, permissions::STOCK_RECEIVE).authorized(&principal) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    match services.ledger.receive(principal.user_id(), request).await {
        Ok(outcome) => (StatusCode::CREATED, Json(outcome)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// FIFO issue across the item's lots. A shortfall is a 409 and changes nothing.
pub async fn issue(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<IssueRequest>,
) -> Response {
    let request = match CmdAuth::new(body, permissions::STOCK_ISSUE).authorized(&principal) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    match services.ledger.issue(principal.user_id(), request).await {
        Ok(outcome) => Json(serde_json::json!({
            "total_taken": outcome.total_taken(),
            "consumed": outcome.consumed,
            "transactions": outcome.transactions,
        }))
        .into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
