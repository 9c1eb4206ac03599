//! Content template administration pages.
//!
//! Administrators define templates from a JSON field list. Each submission
//! runs the generator, writes the artifact and replaces the registered
//! template of the same name.

use axum::extract::{Path, State};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Form, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tower_sessions::Session;
use tracing::info;

use crate::content::FormBuilder;
use crate::models::User;
use crate::routes::helpers::{
    check_csrf, error_response, found, not_found, page_context, render_template, require_admin,
};
use crate::serializers::{Links, TemplateSummary};
use crate::state::AppState;

/// Create the template admin router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/blogging/template/", get(list_templates).post(create_template))
        .route("/blogging/template/{name}/", get(show_template))
        .route("/blogging/template/{name}/delete", post(delete_template))
}

/// Template creation form.
#[derive(Debug, Default, Deserialize, Serialize)]
struct TemplateForm {
    #[serde(default)]
    name: String,
    #[serde(default)]
    label: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    schema: String,
    #[serde(rename = "_token", default, skip_serializing)]
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenForm {
    #[serde(rename = "_token")]
    token: Option<String>,
}

/// Combine the form's label and description with the submitted field list.
///
/// A bare array becomes `{label, description, fields}`. An object keeps its
/// own label and description when it has them.
fn schema_input(label: &str, description: &str, schema: Value) -> Value {
    let mut object = match schema {
        Value::Array(fields) => {
            let mut object = Map::new();
            object.insert("fields".to_string(), Value::Array(fields));
            object
        }
        Value::Object(object) => object,
        other => return other,
    };
    for (key, value) in [("label", label), ("description", description)] {
        let value = value.trim();
        if !value.is_empty() && !object.contains_key(key) {
            object.insert(key.to_string(), Value::String(value.to_string()));
        }
    }
    Value::Object(object)
}

async fn render_list(
    state: &AppState,
    session: &Session,
    user: &User,
    form: &TemplateForm,
    errors: &[String],
) -> Response {
    let links = Links::new(&state.settings().site_url);
    let templates: Vec<TemplateSummary> = state
        .templates()
        .list()
        .iter()
        .map(|t| TemplateSummary::new(&links, t))
        .collect();

    let mut context = page_context(session, Some(user)).await;
    context.insert("templates", &templates);
    context.insert("form", form);
    context.insert("errors", errors);
    render_template(state, "blogging/template_list.html", &context)
}

/// Template list and creation form.
///
/// GET /blogging/template/
async fn list_templates(State(state): State<AppState>, session: Session) -> Response {
    let user = match require_admin(&state, &session, "/blogging/template/").await {
        Ok(user) => user,
        Err(response) => return response,
    };
    render_list(&state, &session, &user, &TemplateForm::default(), &[]).await
}

/// Generate and install a template.
///
/// POST /blogging/template/
async fn create_template(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<TemplateForm>,
) -> Response {
    let user = match require_admin(&state, &session, "/blogging/template/").await {
        Ok(user) => user,
        Err(response) => return response,
    };
    if let Err(rejection) = check_csrf(&session, form.token.as_deref()).await {
        return rejection;
    }

    let name = form.name.trim().to_string();
    let schema: Value = match serde_json::from_str(&form.schema) {
        Ok(schema) => schema,
        Err(e) => {
            let errors = vec![format!("schema: invalid JSON ({e})")];
            return render_list(&state, &session, &user, &form, &errors).await;
        }
    };

    let input = schema_input(&form.label, &form.description, schema);
    match state.templates().install(&name, &input) {
        Ok(template) => {
            info!(template = %template.name, admin = %user.id, "template saved from admin form");
            found(&format!("/blogging/template/{}/", template.name))
        }
        Err(e) => {
            let errors = e.messages();
            render_list(&state, &session, &user, &form, &errors).await
        }
    }
}

/// Generated form and model for one template.
///
/// GET /blogging/template/{name}/
async fn show_template(
    State(state): State<AppState>,
    session: Session,
    Path(name): Path<String>,
) -> Response {
    let user = match require_admin(&state, &session, &format!("/blogging/template/{name}/")).await
    {
        Ok(user) => user,
        Err(response) => return response,
    };
    let Some(template) = state.templates().get(&name) else {
        return not_found();
    };

    let preview = FormBuilder::new(&template.form).render();
    let mut context = page_context(&session, Some(&user)).await;
    context.insert("template", template.as_ref());
    context.insert("preview", &preview);
    render_template(&state, "blogging/template_detail.html", &context)
}

/// Remove a template and its artifact.
///
/// POST /blogging/template/{name}/delete
async fn delete_template(
    State(state): State<AppState>,
    session: Session,
    Path(name): Path<String>,
    Form(form): Form<TokenForm>,
) -> Response {
    let user = match require_admin(&state, &session, "/blogging/template/").await {
        Ok(user) => user,
        Err(response) => return response,
    };
    if let Err(rejection) = check_csrf(&session, form.token.as_deref()).await {
        return rejection;
    }

    match state.templates().remove(&name) {
        Ok(true) => {
            info!(template = %name, admin = %user.id, "template deleted from admin form");
            found("/blogging/template/")
        }
        Ok(false) => not_found(),
        Err(e) => error_response(anyhow::Error::from(e)),
    }
}
