//! Sign-in and sign-out for authors.
//!
//! `/user/login` serves the HTML form, `/user/login/json` accepts the same
//! credentials as JSON for API clients. Both rotate the session id on success.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_sessions::Session;
use tracing::{error, info};
use uuid::Uuid;

use crate::models::User;
use crate::routes::helpers::{SESSION_USER_ID, check_csrf, found, page_context, render_template};
use crate::state::AppState;

/// Landing page when no usable `next` was given.
const DEFAULT_NEXT: &str = "/blogging/manage/";

/// Username and password as posted by either login route.
#[derive(Debug, Deserialize)]
struct Credentials {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Deserialize)]
struct LoginForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    next: Option<String>,
    #[serde(rename = "_token")]
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NextQuery {
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenForm {
    #[serde(rename = "_token")]
    token: Option<String>,
}

#[derive(Debug, thiserror::Error)]
enum SignInError {
    /// Unknown user, wrong password or a disabled account. The three are
    /// indistinguishable to the caller.
    #[error("Invalid username or password")]
    Rejected,
    #[error("Internal server error")]
    Internal,
}

impl SignInError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Rejected => StatusCode::UNAUTHORIZED,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for SignInError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Follow `next` only when it points back into this site.
fn safe_next(next: Option<&str>) -> &str {
    next.filter(|path| path.starts_with('/') && !path.starts_with("//"))
        .unwrap_or(DEFAULT_NEXT)
}

/// Check the credentials and bind the user to a fresh session id.
async fn sign_in(
    state: &AppState,
    session: &Session,
    credentials: &Credentials,
) -> Result<User, SignInError> {
    let username = credentials.username.trim();
    let user = state
        .store()
        .find_user_by_name(username)
        .await
        .map_err(|e| {
            error!(error = %e, "user lookup failed");
            SignInError::Internal
        })?
        .ok_or(SignInError::Rejected)?;

    if !user.is_active() || !user.verify_password(&credentials.password) {
        info!(%username, "rejected login");
        return Err(SignInError::Rejected);
    }

    session.cycle_id().await.map_err(|e| {
        error!(error = %e, "could not rotate session id");
        SignInError::Internal
    })?;
    session.insert(SESSION_USER_ID, user.id).await.map_err(|e| {
        error!(error = %e, "could not store user in session");
        SignInError::Internal
    })?;

    info!(user_id = %user.id, username = %user.name, "signed in");
    Ok(user)
}

async fn render_login(
    state: &AppState,
    session: &Session,
    next: &str,
    username: &str,
    error: Option<String>,
) -> Response {
    let mut context = page_context(session, None).await;
    context.insert("next", next);
    context.insert("username", username);
    context.insert("error", &error);
    render_template(state, "user/login.html", &context)
}

/// GET /user/login
async fn show_login(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<NextQuery>,
) -> Response {
    let next = safe_next(query.next.as_deref());
    render_login(&state, &session, next, "", None).await
}

/// POST /user/login
async fn submit_login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Response {
    if let Err(rejection) = check_csrf(&session, form.token.as_deref()).await {
        return rejection;
    }

    let next = safe_next(form.next.as_deref());
    let credentials = Credentials {
        username: form.username,
        password: form.password,
    };
    match sign_in(&state, &session, &credentials).await {
        Ok(_) => found(next),
        Err(e) => {
            let username = credentials.username.as_str();
            render_login(&state, &session, next, username, Some(e.to_string())).await
        }
    }
}

/// POST /user/login/json
async fn json_login(
    State(state): State<AppState>,
    session: Session,
    Json(credentials): Json<Credentials>,
) -> Result<Json<serde_json::Value>, SignInError> {
    sign_in(&state, &session, &credentials).await?;
    Ok(Json(json!({ "success": true, "message": "Login successful" })))
}

/// POST /user/logout
async fn logout(session: Session, Form(form): Form<TokenForm>) -> Response {
    if let Err(rejection) = check_csrf(&session, form.token.as_deref()).await {
        return rejection;
    }

    let user_id: Option<Uuid> = session.get(SESSION_USER_ID).await.ok().flatten();
    if let Err(e) = session.delete().await {
        error!(error = %e, "could not drop session");
        return SignInError::Internal.into_response();
    }
    if let Some(user_id) = user_id {
        info!(%user_id, "signed out");
    }
    found("/blogging/")
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/user/login", get(show_login).post(submit_login))
        .route("/user/login/json", post(json_login))
        .route("/user/logout", post(logout))
}
