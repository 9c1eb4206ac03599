//! Blog pages: index, detail, author management and the entry editor.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Form, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_sessions::Session;
use uuid::Uuid;

use crate::content::{
    ContentError, EntryDraft, EntryView, FieldInput, FormBuilder, can_edit, stored_values,
};
use crate::error::FieldErrors;
use crate::models::{Entry, User};
use crate::policy::{PolicyFilter, Status};
use crate::routes::helpers::{
    check_csrf, current_user, error_response, found, not_found, page_context, render_template,
    require_login,
};
use crate::serializers::paginate;
use crate::state::AppState;
use crate::template::{GeneratedTemplate, humanize};

/// Shown when a listing has nothing in it.
pub const EMPTY_LIST_MESSAGE: &str = "No posts have been created yet. Start writing!";

/// Characters of body text shown under a titled entry on the index.
const EXCERPT_CHARS: usize = 200;

/// Form keys that are not template fields.
const RESERVED_FORM_KEYS: &[&str] = &["_token", "_action", "title", "data", "template"];

/// Create the blog page router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/blogging/", get(index))
        .route("/blogging/manage/", get(manage))
        .route("/blogging/edit/", get(new_entry_form).post(submit_new_entry))
        .route("/blogging/{id}/", get(detail))
        .route("/blogging/{id}/edit/", get(edit_entry_form).post(submit_entry))
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    page: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ManageQuery {
    filter: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NewEntryQuery {
    template: Option<String>,
}

#[derive(Serialize)]
struct IndexEntry {
    id: i64,
    title: String,
    create_date: DateTime<Utc>,
    author: String,
    pinned: bool,
    excerpt: Option<String>,
}

#[derive(Serialize)]
struct FieldDisplay {
    label: String,
    value: String,
}

#[derive(Serialize)]
struct DetailEntry {
    id: i64,
    title: String,
    data: String,
    create_date: DateTime<Utc>,
    author: String,
    status: &'static str,
    template: Option<String>,
    fields: Vec<FieldDisplay>,
}

#[derive(Serialize)]
struct ManageEntry {
    id: i64,
    title: String,
    status: &'static str,
    create_date: DateTime<Utc>,
}

#[derive(Serialize)]
struct FilterLink {
    value: &'static str,
    label: &'static str,
    active: bool,
}

#[derive(Serialize)]
struct TemplateChoice {
    name: String,
    label: String,
}

/// Names of the authors of `entries`, by user ID.
async fn author_names<'a>(
    state: &AppState,
    entries: impl Iterator<Item = &'a Entry>,
) -> HashMap<Uuid, String> {
    let ids: HashSet<Uuid> = entries.map(|e| e.author_id).collect();
    let mut names = HashMap::with_capacity(ids.len());
    for id in ids {
        match state.store().find_user(id).await {
            Ok(Some(user)) => {
                names.insert(id, user.name);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, user_id = %id, "failed to load author"),
        }
    }
    names
}

fn author_of(names: &HashMap<Uuid, String>, entry: &Entry) -> String {
    names
        .get(&entry.author_id)
        .cloned()
        .unwrap_or_else(|| "unknown".to_string())
}

fn excerpt(entry: &Entry) -> Option<String> {
    if entry.title.trim().is_empty() {
        return None;
    }
    let body = entry.data.trim();
    if body.is_empty() {
        return None;
    }
    let mut chars = body.chars();
    let head: String = chars.by_ref().take(EXCERPT_CHARS).collect();
    Some(if chars.next().is_some() {
        format!("{head}…")
    } else {
        head
    })
}

/// Index page.
///
/// GET /blogging/
async fn index(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<PageQuery>,
) -> Response {
    let user = current_user(&state, &session).await;
    let views = match state.entries().list_public(None, Utc::now()).await {
        Ok(views) => views,
        Err(e) => return error_response(e),
    };

    let page = paginate(
        views,
        query.page.unwrap_or(1),
        state.settings().page_size,
    );
    let names = author_names(&state, page.items.iter().map(|v| &v.entry)).await;
    let entries: Vec<IndexEntry> = page
        .items
        .iter()
        .map(|view| IndexEntry {
            id: view.entry.id,
            title: view.entry.display_title(),
            create_date: view.entry.create_date,
            author: author_of(&names, &view.entry),
            pinned: view.visibility.pinned,
            excerpt: excerpt(&view.entry),
        })
        .collect();

    let meta = page.pagination;
    let mut context = page_context(&session, user.as_ref()).await;
    context.insert("entries", &entries);
    context.insert("empty_message", EMPTY_LIST_MESSAGE);
    context.insert("prev_page", &meta.has_prev().then(|| meta.page - 1));
    context.insert("next_page", &meta.has_next().then(|| meta.page + 1));
    render_template(&state, "blogging/index.html", &context)
}

/// Template field values as label/value pairs, in schema order when the
/// template is still installed.
fn field_display(template: Option<&GeneratedTemplate>, fields: &Value) -> Vec<FieldDisplay> {
    let Value::Object(map) = fields else {
        return Vec::new();
    };

    let show = |value: &Value| match value {
        Value::String(s) => s.clone(),
        Value::Bool(true) => "Yes".to_string(),
        Value::Bool(false) => "No".to_string(),
        other => other.to_string(),
    };

    match template {
        Some(template) => template
            .schema
            .fields
            .iter()
            .filter_map(|field| {
                let value = map.get(&field.name).filter(|v| !v.is_null())?;
                let shown = match value {
                    Value::String(s) => field
                        .choices
                        .iter()
                        .find(|c| &c.value == s)
                        .map(|c| c.label.clone())
                        .unwrap_or_else(|| s.clone()),
                    other => show(other),
                };
                Some(FieldDisplay {
                    label: field.label.clone(),
                    value: shown,
                })
            })
            .collect(),
        None => map
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(key, value)| FieldDisplay {
                label: humanize(key),
                value: show(value),
            })
            .collect(),
    }
}

/// Entry detail page.
///
/// GET /blogging/{id}/
async fn detail(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<i64>,
) -> Response {
    let user = current_user(&state, &session).await;
    let view = match state.entries().get(id, Utc::now()).await {
        Ok(Some(view)) => view,
        Ok(None) => return not_found(),
        Err(e) => return error_response(e),
    };

    let names = author_names(&state, std::iter::once(&view.entry)).await;
    let template = view
        .entry
        .template
        .as_deref()
        .and_then(|name| state.templates().get(name));
    let entry = DetailEntry {
        id: view.entry.id,
        title: view.entry.display_title(),
        data: view.entry.data.clone(),
        create_date: view.entry.create_date,
        author: author_of(&names, &view.entry),
        status: view.visibility.status.label(),
        template: view.entry.template.clone(),
        fields: field_display(template.as_deref(), &view.entry.fields),
    };

    let mut context = page_context(&session, user.as_ref()).await;
    context.insert("entry", &entry);
    context.insert(
        "can_edit",
        &user.as_ref().is_some_and(|u| can_edit(&view.entry, u)),
    );
    render_template(&state, "blogging/detail.html", &context)
}

/// The current author's entries.
///
/// GET /blogging/manage/
async fn manage(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<ManageQuery>,
) -> Response {
    let user = match require_login(&state, &session, "/blogging/manage/").await {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };

    let filter: PolicyFilter = query
        .filter
        .as_deref()
        .and_then(|f| f.parse().ok())
        .unwrap_or_default();
    let views = match state
        .entries()
        .list_for_author(user.id, Some(filter), Utc::now())
        .await
    {
        Ok(views) => views,
        Err(e) => return error_response(e),
    };

    let entries: Vec<ManageEntry> = views
        .iter()
        .map(|view| ManageEntry {
            id: view.entry.id,
            title: view.entry.display_title(),
            status: view.visibility.status.label(),
            create_date: view.entry.create_date,
        })
        .collect();

    let mut choices = vec![
        ("all", "All", PolicyFilter::None),
        ("published", "Published", PolicyFilter::Published),
        ("draft", "Drafts", PolicyFilter::Draft),
    ];
    if state.entries().uses_policy() {
        choices.push(("pinned", "Pinned", PolicyFilter::Pinned));
    }
    let filters: Vec<FilterLink> = choices
        .into_iter()
        .map(|(value, label, f)| FilterLink {
            value,
            label,
            active: f == filter,
        })
        .collect();

    let mut context = page_context(&session, Some(&user)).await;
    context.insert("entries", &entries);
    context.insert("filters", &filters);
    context.insert("empty_message", EMPTY_LIST_MESSAGE);
    render_template(&state, "blogging/list.html", &context)
}

/// Everything the edit template shows.
struct EditPage {
    entry_id: Option<i64>,
    /// Stored template name, kept even when the template is uninstalled.
    template_name: Option<String>,
    template: Option<Arc<GeneratedTemplate>>,
    title: String,
    data: String,
    values: HashMap<String, String>,
    errors: FieldErrors,
    status: Option<Status>,
    pinned: bool,
}

impl EditPage {
    fn blank(template: Option<Arc<GeneratedTemplate>>) -> Self {
        Self {
            entry_id: None,
            template_name: template.as_ref().map(|t| t.name.clone()),
            template,
            title: String::new(),
            data: String::new(),
            values: HashMap::new(),
            errors: FieldErrors::new(),
            status: None,
            pinned: false,
        }
    }

    fn from_view(state: &AppState, view: &EntryView) -> Self {
        Self {
            entry_id: Some(view.entry.id),
            template_name: view.entry.template.clone(),
            template: view
                .entry
                .template
                .as_deref()
                .and_then(|name| state.templates().get(name)),
            title: view.entry.title.clone(),
            data: view.entry.data.clone(),
            values: stored_values(&view.entry.fields),
            errors: FieldErrors::new(),
            status: Some(view.visibility.status),
            pinned: view.visibility.pinned,
        }
    }
}

async fn render_edit(state: &AppState, session: &Session, user: &User, page: EditPage) -> Response {
    let action = match page.entry_id {
        Some(id) => format!("/blogging/{id}/edit/"),
        None => "/blogging/edit/".to_string(),
    };
    let template_fields = page
        .template
        .as_ref()
        .map(|t| {
            FormBuilder::new(&t.form)
                .with_values(page.values.clone())
                .with_errors(&page.errors)
                .render()
        })
        .unwrap_or_default();
    let templates: Vec<TemplateChoice> = state
        .templates()
        .list()
        .iter()
        .map(|t| TemplateChoice {
            name: t.name.clone(),
            label: t.label.clone(),
        })
        .collect();

    let mut context = page_context(session, Some(user)).await;
    context.insert("entry_id", &page.entry_id);
    context.insert("template", &page.template_name);
    context.insert(
        "template_label",
        &page.template.as_ref().map(|t| t.label.clone()),
    );
    context.insert("templates", &templates);
    context.insert("action", &action);
    context.insert("title", &page.title);
    context.insert("data", &page.data);
    context.insert("template_fields", &template_fields);
    context.insert("errors", &page.errors);
    context.insert("status", &page.status.map(Status::label));
    context.insert("use_policy", &state.entries().uses_policy());
    context.insert("pinned", &page.pinned);
    render_template(state, "blogging/edit.html", &context)
}

/// Blank entry form.
///
/// GET /blogging/edit/
async fn new_entry_form(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<NewEntryQuery>,
) -> Response {
    let user = match require_login(&state, &session, "/blogging/edit/").await {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };

    let template = match query.template.as_deref().filter(|t| !t.is_empty()) {
        Some(name) => match state.templates().get(name) {
            Some(template) => Some(template),
            None => return not_found(),
        },
        None => None,
    };

    render_edit(&state, &session, &user, EditPage::blank(template)).await
}

/// Pre-filled form for an existing entry.
///
/// GET /blogging/{id}/edit/
async fn edit_entry_form(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<i64>,
) -> Response {
    let user = match require_login(&state, &session, &format!("/blogging/{id}/edit/")).await {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };

    let view = match state.entries().get(id, Utc::now()).await {
        Ok(Some(view)) => view,
        Ok(None) => return not_found(),
        Err(e) => return error_response(e),
    };
    if !can_edit(&view.entry, &user) {
        return error_response(ContentError::Forbidden);
    }

    let page = EditPage::from_view(&state, &view);
    render_edit(&state, &session, &user, page).await
}

/// The button that submitted the entry form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EditAction {
    Save,
    Publish,
    Pin,
    Unpin,
    Delete,
}

impl EditAction {
    const ALL: [(&'static str, EditAction); 5] = [
        ("Save", EditAction::Save),
        ("Publish", EditAction::Publish),
        ("Pin", EditAction::Pin),
        ("Unpin", EditAction::Unpin),
        ("Delete", EditAction::Delete),
    ];

    /// Read the pressed button: `_action=<Name>`, or a key named after the
    /// button. Removes whichever was used. Defaults to Save.
    fn take(form: &mut HashMap<String, String>) -> Self {
        let named = form.remove("_action");
        let mut action = None;
        for (name, value) in Self::ALL {
            if form.remove(name).is_some() && action.is_none() {
                action = Some(value);
            }
        }
        named
            .and_then(|n| Self::ALL.iter().find(|(name, _)| *name == n).map(|(_, a)| *a))
            .or(action)
            .unwrap_or(EditAction::Save)
    }
}

/// POST /blogging/edit/
async fn submit_new_entry(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    submit(state, session, None, form).await
}

/// POST /blogging/{id}/edit/
async fn submit_entry(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<i64>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    submit(state, session, Some(id), form).await
}

async fn submit(
    state: AppState,
    session: Session,
    id: Option<i64>,
    mut form: HashMap<String, String>,
) -> Response {
    let back = match id {
        Some(id) => format!("/blogging/{id}/edit/"),
        None => "/blogging/edit/".to_string(),
    };
    let user = match require_login(&state, &session, &back).await {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };
    if let Err(rejection) = check_csrf(&session, form.get("_token").map(String::as_str)).await {
        return rejection;
    }

    let action = EditAction::take(&mut form);
    let entries = state.entries();
    let now = Utc::now();

    if action == EditAction::Delete {
        if let Some(id) = id {
            if let Err(e) = entries.delete(id, &user).await {
                return error_response(e);
            }
        }
        return found("/blogging/");
    }

    let title = form.remove("title").unwrap_or_default();
    let data = form.remove("data").unwrap_or_default();
    // No `template` key leaves the stored template alone.
    let template: Option<Option<String>> = form
        .remove("template")
        .map(|t| Some(t.trim().to_string()).filter(|t| !t.is_empty()));
    let installed = template
        .as_ref()
        .and_then(|name| name.as_deref())
        .and_then(|name| state.templates().get(name));
    for key in RESERVED_FORM_KEYS {
        form.remove(*key);
    }
    let values = form;

    let draft = EntryDraft {
        title: Some(title.clone()),
        data: Some(data.clone()),
        template: template.clone(),
        fields: installed.as_ref().map(|_| FieldInput::Form(values.clone())),
        is_active: None,
    };

    let saved = match id {
        Some(id) => entries.update(id, &user, draft, Vec::new()).await,
        None => entries.create(&user, draft, Vec::new()).await,
    };
    let entry = match saved {
        Ok((entry, _)) => entry,
        Err(ContentError::Validation(errors)) => {
            let current = match id {
                Some(id) => entries.get(id, now).await.ok().flatten(),
                None => None,
            };
            let template_name = match template {
                Some(name) => name,
                None => current.as_ref().and_then(|v| v.entry.template.clone()),
            };
            let page = EditPage {
                entry_id: id,
                template_name,
                template: installed,
                title,
                data,
                values,
                errors,
                status: current.as_ref().map(|v| v.visibility.status),
                pinned: current.as_ref().is_some_and(|v| v.visibility.pinned),
            };
            return render_edit(&state, &session, &user, page).await;
        }
        Err(e) => return error_response(e),
    };

    let edit_url = format!("/blogging/{}/edit/", entry.id);
    let outcome = match action {
        EditAction::Publish => entries
            .publish(entry.id, &user, now)
            .await
            .map(|_| format!("/blogging/{}/", entry.id)),
        EditAction::Pin => entries.pin(entry.id, &user, now).await.map(|_| edit_url),
        EditAction::Unpin => entries.unpin(entry.id, &user, now).await.map(|_| edit_url),
        EditAction::Save | EditAction::Delete => Ok(edit_url),
    };

    match outcome {
        Ok(location) => found(&location),
        Err(ContentError::PolicyDisabled) => (
            StatusCode::BAD_REQUEST,
            "Pinning requires publication policies.",
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::template::generate;

    fn form(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn action_from_named_field_or_button_key() {
        let mut f = form(&[("_action", "Publish"), ("title", "x")]);
        assert_eq!(EditAction::take(&mut f), EditAction::Publish);
        assert!(!f.contains_key("_action"));

        let mut f = form(&[("Delete", "Delete")]);
        assert_eq!(EditAction::take(&mut f), EditAction::Delete);
        assert!(f.is_empty());

        let mut f = form(&[("title", "x")]);
        assert_eq!(EditAction::take(&mut f), EditAction::Save);
    }

    #[test]
    fn fields_show_choice_labels_in_schema_order() {
        let template = generate(
            "event",
            &json!([
                {"name": "level", "type": "choice", "choices": [["adv", "Advanced"]]},
                {"name": "outdoors", "type": "boolean"},
                {"name": "venue", "type": "char"}
            ]),
        )
        .unwrap();
        let shown = field_display(
            Some(&template),
            &json!({"venue": "Hall", "outdoors": true, "level": "adv"}),
        );
        let pairs: Vec<(&str, &str)> = shown
            .iter()
            .map(|f| (f.label.as_str(), f.value.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![("Level", "Advanced"), ("Outdoors", "Yes"), ("Venue", "Hall")]
        );

        let orphaned = field_display(None, &json!({"ticket_price": 12.5}));
        assert_eq!(orphaned[0].label, "Ticket price");
        assert_eq!(orphaned[0].value, "12.5");
    }
}
