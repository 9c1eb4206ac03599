//! REST API under `/blogging/api`.
//!
//! Authentication rides on the browser session. Reads of published content
//! are open; every write needs a logged-in user, and template writes need
//! an administrator.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tower_sessions::Session;
use uuid::Uuid;

use crate::content::{ContentError, can_edit};
use crate::error::{ApiError, ApiResult, AppError, FieldErrors, JsonBody};
use crate::models::{Policy, User};
use crate::policy::PolicyFilter;
use crate::routes::helpers::current_user;
use crate::serializers::{
    ContentRepr, ContentWrite, Links, ManageRepr, ManageWrite, PaginatedResponse, PolicyWrite,
    REQUIRED, TemplateSummary, TemplateWrite, UserRepr, paginate,
};
use crate::state::AppState;
use crate::template::{GeneratedTemplate, TemplateError};

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/blogging/api/content/", get(list_content).post(create_content))
        .route(
            "/blogging/api/content/{id}/",
            get(get_content)
                .put(update_content)
                .patch(update_content)
                .delete(delete_content),
        )
        .route("/blogging/api/manage/", get(list_manage).post(create_manage))
        .route(
            "/blogging/api/manage/{id}/",
            get(get_manage)
                .put(update_manage)
                .patch(update_manage)
                .delete(delete_manage),
        )
        .route("/blogging/api/policy/", get(list_policies).post(create_policy))
        .route(
            "/blogging/api/policy/{id}/",
            get(get_policy)
                .put(update_policy)
                .patch(update_policy)
                .delete(delete_policy),
        )
        .route("/blogging/api/users/{id}/", get(get_user))
        .route("/blogging/api/templates/", get(list_templates).post(create_template))
        .route(
            "/blogging/api/templates/{name}/",
            get(get_template).delete(delete_template),
        )
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    page: Option<usize>,
    filter: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PolicyQuery {
    entry: Option<i64>,
}

/// The session's user, or 401.
async fn api_user(state: &AppState, session: &Session) -> ApiResult<User> {
    current_user(state, session)
        .await
        .ok_or_else(ApiError::unauthorized)
}

async fn api_admin(state: &AppState, session: &Session) -> ApiResult<User> {
    let user = api_user(state, session).await?;
    if !user.is_admin {
        return Err(AppError::Forbidden.into());
    }
    Ok(user)
}

fn links(state: &AppState) -> Links<'_> {
    Links::new(&state.settings().site_url)
}

// -------------------------------------------------------------------------
// Content
// -------------------------------------------------------------------------

/// GET /blogging/api/content/
async fn list_content(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<PaginatedResponse<ContentRepr>>> {
    let views = state.entries().list_public(None, Utc::now()).await?;
    let links = links(&state);
    let reprs: Vec<ContentRepr> = views
        .iter()
        .map(|v| ContentRepr::new(&links, &v.entry))
        .collect();
    Ok(Json(paginate(
        reprs,
        query.page.unwrap_or(1),
        state.settings().page_size,
    )))
}

/// POST /blogging/api/content/
async fn create_content(
    State(state): State<AppState>,
    session: Session,
    JsonBody(body): JsonBody<ContentWrite>,
) -> ApiResult<(StatusCode, Json<ContentRepr>)> {
    let user = api_user(&state, &session).await?;
    let (entry, _) = state
        .entries()
        .create(&user, body.into_draft(), Vec::new())
        .await?;
    Ok((StatusCode::CREATED, Json(ContentRepr::new(&links(&state), &entry))))
}

/// GET /blogging/api/content/{id}/
///
/// Unpublished entries are visible only to their author and administrators.
async fn get_content(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<i64>,
) -> ApiResult<Json<ContentRepr>> {
    let view = state
        .entries()
        .get(id, Utc::now())
        .await?
        .ok_or(AppError::NotFound)?;
    if !view.visibility.published {
        let user = current_user(&state, &session).await;
        if !user.is_some_and(|u| can_edit(&view.entry, &u)) {
            return Err(AppError::NotFound.into());
        }
    }
    Ok(Json(ContentRepr::new(&links(&state), &view.entry)))
}

/// PUT/PATCH /blogging/api/content/{id}/
async fn update_content(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<i64>,
    JsonBody(body): JsonBody<ContentWrite>,
) -> ApiResult<Json<ContentRepr>> {
    let user = api_user(&state, &session).await?;
    let (entry, _) = state
        .entries()
        .update(id, &user, body.into_draft(), Vec::new())
        .await?;
    Ok(Json(ContentRepr::new(&links(&state), &entry)))
}

/// DELETE /blogging/api/content/{id}/
async fn delete_content(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let user = api_user(&state, &session).await?;
    state.entries().delete(id, &user).await?;
    Ok(StatusCode::NO_CONTENT)
}

// -------------------------------------------------------------------------
// Manage
// -------------------------------------------------------------------------

fn parse_filter(raw: Option<&str>) -> ApiResult<Option<PolicyFilter>> {
    match raw {
        None => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(|e: String| {
            let mut errors = FieldErrors::new();
            errors.add("filter", e);
            ApiError::from(AppError::Validation(errors))
        }),
    }
}

/// GET /blogging/api/manage/
async fn list_manage(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<PaginatedResponse<ManageRepr>>> {
    let user = api_user(&state, &session).await?;
    let filter = parse_filter(query.filter.as_deref())?;
    let views = state
        .entries()
        .list_for_author(user.id, filter, Utc::now())
        .await?;
    let links = links(&state);
    let use_policy = state.entries().uses_policy();
    let reprs: Vec<ManageRepr> = views
        .iter()
        .map(|v| ManageRepr::from_view(&links, v, use_policy))
        .collect();
    Ok(Json(paginate(
        reprs,
        query.page.unwrap_or(1),
        state.settings().page_size,
    )))
}

/// POST /blogging/api/manage/
///
/// The entry and its nested policies are stored together or not at all.
async fn create_manage(
    State(state): State<AppState>,
    session: Session,
    JsonBody(body): JsonBody<ManageWrite>,
) -> ApiResult<(StatusCode, Json<ManageRepr>)> {
    let user = api_user(&state, &session).await?;
    let (draft, policies) = body.into_parts().map_err(AppError::Validation)?;
    let (entry, policies) = state.entries().create(&user, draft, policies).await?;
    let repr = ManageRepr::new(
        &links(&state),
        &entry,
        &policies,
        state.entries().uses_policy(),
    );
    Ok((StatusCode::CREATED, Json(repr)))
}

/// GET /blogging/api/manage/{id}/
async fn get_manage(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<i64>,
) -> ApiResult<Json<ManageRepr>> {
    let user = api_user(&state, &session).await?;
    let view = state
        .entries()
        .get(id, Utc::now())
        .await?
        .filter(|v| can_edit(&v.entry, &user))
        .ok_or(AppError::NotFound)?;
    Ok(Json(ManageRepr::from_view(
        &links(&state),
        &view,
        state.entries().uses_policy(),
    )))
}

/// PUT/PATCH /blogging/api/manage/{id}/
///
/// Nested policies are matched to the stored ones by kind.
async fn update_manage(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<i64>,
    JsonBody(body): JsonBody<ManageWrite>,
) -> ApiResult<Json<ManageRepr>> {
    let user = api_user(&state, &session).await?;
    let (draft, policies) = body.into_parts().map_err(AppError::Validation)?;
    let (entry, policies) = state
        .entries()
        .update(id, &user, draft, policies)
        .await
        .map_err(hide_foreign)?;
    Ok(Json(ManageRepr::new(
        &links(&state),
        &entry,
        &policies,
        state.entries().uses_policy(),
    )))
}

/// DELETE /blogging/api/manage/{id}/
async fn delete_manage(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let user = api_user(&state, &session).await?;
    state.entries().delete(id, &user).await.map_err(hide_foreign)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Other authors' entries are outside the manage collection.
fn hide_foreign(err: ContentError) -> ApiError {
    match err {
        ContentError::Forbidden => AppError::NotFound.into(),
        other => other.into(),
    }
}

// -------------------------------------------------------------------------
// Policies
// -------------------------------------------------------------------------

/// GET /blogging/api/policy/
async fn list_policies(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<PolicyQuery>,
) -> ApiResult<Json<Vec<Policy>>> {
    let user = api_user(&state, &session).await?;
    let policies = state.entries().list_policies(&user, query.entry).await?;
    Ok(Json(policies))
}

/// POST /blogging/api/policy/
async fn create_policy(
    State(state): State<AppState>,
    session: Session,
    JsonBody(body): JsonBody<PolicyWrite>,
) -> ApiResult<(StatusCode, Json<Policy>)> {
    let user = api_user(&state, &session).await?;
    let Some(entry) = body.entry else {
        let mut errors = FieldErrors::new();
        errors.add("entry", REQUIRED);
        return Err(AppError::Validation(errors).into());
    };
    let input = body.into_input(None).map_err(AppError::Validation)?;
    let policy = state.entries().create_policy(entry, &user, input).await?;
    Ok((StatusCode::CREATED, Json(policy)))
}

/// GET /blogging/api/policy/{id}/
async fn get_policy(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<i64>,
) -> ApiResult<Json<Policy>> {
    let user = api_user(&state, &session).await?;
    Ok(Json(state.entries().get_policy(id, &user).await?))
}

/// PUT/PATCH /blogging/api/policy/{id}/
async fn update_policy(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<i64>,
    JsonBody(body): JsonBody<PolicyWrite>,
) -> ApiResult<Json<Policy>> {
    let user = api_user(&state, &session).await?;
    let current = state.entries().get_policy(id, &user).await?;
    if body.entry.is_some_and(|e| e != current.entry) {
        let mut errors = FieldErrors::new();
        errors.add("entry", "A policy cannot move to another entry.");
        return Err(AppError::Validation(errors).into());
    }
    let input = body
        .into_input(Some(current.kind))
        .map_err(AppError::Validation)?;
    Ok(Json(state.entries().update_policy(id, &user, input).await?))
}

/// DELETE /blogging/api/policy/{id}/
async fn delete_policy(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let user = api_user(&state, &session).await?;
    state.entries().delete_policy(id, &user).await?;
    Ok(StatusCode::NO_CONTENT)
}

// -------------------------------------------------------------------------
// Users and templates
// -------------------------------------------------------------------------

/// GET /blogging/api/users/{id}/
async fn get_user(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<UserRepr>> {
    let user = state.store().find_user(id).await?.ok_or(AppError::NotFound)?;
    Ok(Json(UserRepr::new(&links(&state), &user)))
}

/// GET /blogging/api/templates/
async fn list_templates(State(state): State<AppState>) -> Json<Vec<TemplateSummary>> {
    let links = links(&state);
    Json(
        state
            .templates()
            .list()
            .iter()
            .map(|t| TemplateSummary::new(&links, t))
            .collect(),
    )
}

/// GET /blogging/api/templates/{name}/
async fn get_template(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<GeneratedTemplate>> {
    let template = state.templates().get(&name).ok_or(AppError::NotFound)?;
    Ok(Json(GeneratedTemplate::clone(&template)))
}

fn template_error(err: TemplateError) -> ApiError {
    match err {
        TemplateError::Invalid(messages) => {
            let mut errors = FieldErrors::new();
            for message in messages {
                errors.add("schema", message);
            }
            AppError::Validation(errors).into()
        }
        other => AppError::Internal(other.into()).into(),
    }
}

/// POST /blogging/api/templates/
async fn create_template(
    State(state): State<AppState>,
    session: Session,
    JsonBody(body): JsonBody<TemplateWrite>,
) -> ApiResult<(StatusCode, Json<GeneratedTemplate>)> {
    let user = api_admin(&state, &session).await?;
    let template = state
        .templates()
        .install(body.name.trim(), &body.schema)
        .map_err(template_error)?;
    tracing::info!(template = %template.name, admin = %user.id, "template saved from API");
    Ok((StatusCode::CREATED, Json(GeneratedTemplate::clone(&template))))
}

/// DELETE /blogging/api/templates/{name}/
async fn delete_template(
    State(state): State<AppState>,
    session: Session,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    api_admin(&state, &session).await?;
    if state.templates().remove(&name).map_err(template_error)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound.into())
    }
}
