use axum::{Router, routing::get};

pub mod auth;
pub mod categories;
pub mod common;
pub mod export;
pub mod items;
pub mod stock;
pub mod system;
pub mod transactions;
pub mod users;

/// Router for all endpoints behind the login wall.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .merge(users::router())
        .merge(transactions::router())
        .nest("/categories", categories::router())
        .nest("/items", items::router())
        .nest("/stock", stock::router())
        .nest("/export", export::router())
}

/// Router for endpoints reachable without a token.
pub fn public_router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .nest("/auth", auth::router())
}
