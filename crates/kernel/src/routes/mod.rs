//! HTTP route handlers.

pub mod api;
pub mod auth;
pub mod blog;
pub mod health;
pub mod helpers;
pub mod template_admin;

use axum::Router;

use crate::state::AppState;

/// Every route of the module, without middleware.
pub fn app_router() -> Router<AppState> {
    Router::new()
        .merge(blog::router())
        .merge(template_admin::router())
        .merge(api::router())
        .merge(auth::router())
        .merge(health::router())
}
