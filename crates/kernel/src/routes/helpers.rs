//! Shared route helpers for page rendering.

use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use serde::Serialize;
use tower_sessions::Session;
use uuid::Uuid;

use crate::csrf::{generate_csrf_token, verify_csrf_token};
use crate::error::AppError;
use crate::models::User;
use crate::state::AppState;

/// Session key for user ID.
pub const SESSION_USER_ID: &str = "user_id";

/// What templates see of the logged-in user.
#[derive(Debug, Serialize)]
struct CurrentUser<'a> {
    id: Uuid,
    name: &'a str,
    is_admin: bool,
}

/// Resolve the session's user, if any. Blocked accounts count as anonymous.
pub async fn current_user(state: &AppState, session: &Session) -> Option<User> {
    let id: Uuid = session.get(SESSION_USER_ID).await.ok().flatten()?;
    match state.store().find_user(id).await {
        Ok(Some(user)) if user.is_active() => Some(user),
        Ok(_) => None,
        Err(e) => {
            tracing::error!(error = %e, user_id = %id, "failed to load session user");
            None
        }
    }
}

/// Login URL that returns to `next` afterwards.
pub fn login_url(next: &str) -> String {
    format!("/user/login?next={}", urlencoding::encode(next))
}

/// Require an authenticated user, or redirect to login.
///
/// `next` is the path to come back to after logging in.
pub async fn require_login(state: &AppState, session: &Session, next: &str) -> Result<User, Response> {
    match current_user(state, session).await {
        Some(user) => Ok(user),
        None => Err(found(&login_url(next))),
    }
}

/// Require an authenticated **admin** user, or redirect/reject.
///
/// Redirects to login if the session has no valid user. Returns 403 if the
/// user exists but is not an admin.
pub async fn require_admin(state: &AppState, session: &Session, next: &str) -> Result<User, Response> {
    let user = require_login(state, session, next).await?;
    if user.is_admin {
        Ok(user)
    } else {
        Err((StatusCode::FORBIDDEN, Html("Access denied")).into_response())
    }
}

/// Build a page context with `csrf_token` and `current_user` set.
pub async fn page_context(session: &Session, user: Option<&User>) -> tera::Context {
    let csrf_token = match generate_csrf_token(session).await {
        Ok(token) => token,
        Err(e) => {
            tracing::error!(error = %e, "failed to generate CSRF token");
            String::new()
        }
    };

    let mut context = tera::Context::new();
    context.insert("csrf_token", &csrf_token);
    context.insert(
        "current_user",
        &user.map(|u| CurrentUser {
            id: u.id,
            name: &u.name,
            is_admin: u.is_admin,
        }),
    );
    context
}

/// Reject a form whose CSRF token is missing, stale or already used.
pub async fn check_csrf(session: &Session, token: Option<&str>) -> Result<(), Response> {
    match verify_csrf_token(session, token.unwrap_or_default()).await {
        Ok(true) => Ok(()),
        Ok(false) => Err((
            StatusCode::FORBIDDEN,
            Html("Invalid form token. Please go back and try again."),
        )
            .into_response()),
        Err(e) => {
            tracing::error!(error = %e, "failed to verify CSRF token");
            Err(StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
    }
}

/// Render a template, with a minimal error page if rendering fails.
pub fn render_template(state: &AppState, template: &str, context: &tera::Context) -> Response {
    render_with_status(state, StatusCode::OK, template, context)
}

pub fn render_with_status(
    state: &AppState,
    status: StatusCode,
    template: &str,
    context: &tera::Context,
) -> Response {
    match state.theme().tera().render(template, context) {
        Ok(html) => (status, Html(html)).into_response(),
        Err(e) => {
            tracing::error!(error = ?e, template = %template, "failed to render template");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(format!(
                    r#"<!DOCTYPE html>
<html><head><title>Error</title></head>
<body><h1>Template Error</h1><pre>{}</pre></body></html>"#,
                    html_escape(&e.to_string())
                )),
            )
                .into_response()
        }
    }
}

/// 302 redirect, the status browsers and form posts expect here.
pub fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

/// Convert a service or store error into its response.
pub fn error_response(err: impl Into<AppError>) -> Response {
    err.into().into_response()
}

/// Plain 404 page.
pub fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Html("<h1>Not Found</h1>")).into_response()
}

/// HTML-escape a string for safe output.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}
