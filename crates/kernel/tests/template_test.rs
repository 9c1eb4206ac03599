#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Content template admin pages and template-backed entries.

use axum::http::StatusCode;

use blogging_test_utils::{admin_user, assert, schemas, test_entry, test_user};

mod common;
use common::{TestApp, body_string, location};

const ADMIN_PAGE: &str = "/blogging/template/";

async fn install_recipe(app: &TestApp) {
    app.state
        .templates()
        .install("recipe", &schemas::recipe())
        .expect("recipe schema is valid");
}

#[tokio::test]
async fn admin_page_requires_login() {
    let app = TestApp::new();
    let response = app.get(ADMIN_PAGE, "").await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        location(&response),
        "/user/login?next=%2Fblogging%2Ftemplate%2F"
    );
}

#[tokio::test]
async fn admin_page_requires_admin() {
    let app = TestApp::new();
    let (_, cookies) = app.create_and_login(&test_user("writer")).await;
    let response = app.get(ADMIN_PAGE, &cookies).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_page_lists_templates() {
    let app = TestApp::new();
    let (_, cookies) = app.create_and_login(&admin_user("root")).await;

    let html = body_string(app.get(ADMIN_PAGE, &cookies).await).await;
    assert::contains(&html, "No templates have been defined.");

    install_recipe(&app).await;
    let html = body_string(app.get(ADMIN_PAGE, &cookies).await).await;
    assert::not_contains(&html, "No templates have been defined.");
    assert::contains(&html, r#"<a href="/blogging/template/recipe/">recipe</a>"#);
    assert::contains(&html, "<td>Recipe</td>");
}

#[tokio::test]
async fn admin_form_generates_template() {
    let app = TestApp::new();
    let (_, cookies) = app.create_and_login(&admin_user("root")).await;

    let schema = schemas::event().to_string();
    let response = app
        .submit_form(
            ADMIN_PAGE,
            ADMIN_PAGE,
            &cookies,
            &[
                ("name", "event"),
                ("label", "Event"),
                ("description", "Something happening"),
                ("schema", schema.as_str()),
            ],
        )
        .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/blogging/template/event/");

    let template = app.state.templates().get("event").unwrap();
    assert_eq!(template.label, "Event");
    assert_eq!(template.description, "Something happening");
    assert!(app.dir.path().join("event.yml").exists());

    let html = body_string(app.get("/blogging/template/event/", &cookies).await).await;
    assert::contains(&html, "Event <small>event</small>");
    assert::contains(&html, "<td>venue</td>");
    assert::contains(&html, "<td>Starts on</td>");
    assert::contains(&html, r#"name="free_entry""#);
}

#[tokio::test]
async fn admin_form_reports_errors() {
    let app = TestApp::new();
    let (_, cookies) = app.create_and_login(&admin_user("root")).await;

    let response = app
        .submit_form(
            ADMIN_PAGE,
            ADMIN_PAGE,
            &cookies,
            &[("name", "broken"), ("schema", "{not json")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_string(response).await;
    assert::contains(&html, "schema: invalid JSON");
    assert::contains(&html, r#"value="broken""#);

    let response = app
        .submit_form(
            ADMIN_PAGE,
            ADMIN_PAGE,
            &cookies,
            &[
                ("name", "Bad Name"),
                ("schema", r#"[{"name": "servings", "type": "integer"}]"#),
            ],
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert::contains(&body_string(response).await, "must start with a lowercase letter");
    assert!(app.state.templates().is_empty());
}

#[tokio::test]
async fn admin_form_requires_csrf() {
    let app = TestApp::new();
    let (_, cookies) = app.create_and_login(&admin_user("root")).await;
    let schema = schemas::event().to_string();
    let response = app
        .post_form(ADMIN_PAGE, &cookies, &[("name", "event"), ("schema", schema.as_str())])
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(app.state.templates().is_empty());
}

#[tokio::test]
async fn admin_form_deletes_template() {
    let app = TestApp::new();
    let (_, cookies) = app.create_and_login(&admin_user("root")).await;
    install_recipe(&app).await;

    let response = app
        .submit_form(
            "/blogging/template/recipe/",
            "/blogging/template/recipe/delete",
            &cookies,
            &[],
        )
        .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), ADMIN_PAGE);
    assert!(app.state.templates().get("recipe").is_none());
    assert!(!app.dir.path().join("recipe.yml").exists());

    let response = app.get("/blogging/template/recipe/", &cookies).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn templates_survive_a_reload() {
    let app = TestApp::new();
    install_recipe(&app).await;

    let reloaded = blogging_kernel::template::TemplateRegistry::new(app.dir.path());
    assert_eq!(reloaded.load_from_dir().unwrap(), 1);
    assert_eq!(reloaded.get("recipe").unwrap().label, "Recipe");
}

// =============================================================================
// Entry form with a template
// =============================================================================

#[tokio::test]
async fn new_entry_form_offers_templates() {
    let app = TestApp::new();
    install_recipe(&app).await;
    let (_, cookies) = app.create_and_login(&test_user("writer")).await;

    let html = body_string(app.get("/blogging/edit/", &cookies).await).await;
    assert::contains(&html, r#"<a href="/blogging/edit/?template=recipe">Recipe</a>"#);
    assert::not_contains(&html, r#"name="servings""#);

    let html = body_string(app.get("/blogging/edit/?template=recipe", &cookies).await).await;
    assert::contains(&html, "New post (Recipe)");
    assert::contains(&html, r#"<input type="hidden" name="template" value="recipe">"#);
    assert::contains(&html, r#"name="servings""#);
    assert::contains(&html, r#"<option value="hard">Hard</option>"#);
    assert::contains(&html, "One per line");

    let response = app.get("/blogging/edit/?template=missing", &cookies).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn entry_form_saves_template_fields() {
    let app = TestApp::new();
    install_recipe(&app).await;
    let (_, cookies) = app.create_and_login(&test_user("writer")).await;

    let soup = test_entry("Soup", "Warm and simple")
        .with_template("recipe")
        .with_field("servings", serde_json::json!(3))
        .with_field("difficulty", serde_json::json!("hard"))
        .with_field("ingredients", serde_json::json!("Salt"));
    let mut fields: Vec<(&str, &str)> = Vec::new();
    let owned = soup.form_fields();
    fields.extend(owned.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    fields.push(("_action", "Publish"));

    let page = "/blogging/edit/?template=recipe";
    let response = app.submit_form(page, "/blogging/edit/", &cookies, &fields).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/blogging/1/");

    let entry = app.state.store().find_entry(1).await.unwrap().unwrap();
    assert_eq!(entry.template.as_deref(), Some("recipe"));
    assert_eq!(entry.fields["servings"], 3);
    assert_eq!(entry.fields["difficulty"], "hard");

    let html = body_string(app.get("/blogging/1/", "").await).await;
    assert::contains(&html, "blog-fields-recipe");
    assert::contains(&html, "<dt>Servings</dt>");
    assert::contains(&html, "<dd>3</dd>");
    assert::contains(&html, "<dd>Hard</dd>");

    // The edit form comes back pre-filled.
    let html = body_string(app.get("/blogging/1/edit/", &cookies).await).await;
    assert::contains(&html, r#"name="servings" value="3""#);
    assert::contains(&html, r#"<option value="hard" selected>Hard</option>"#);
}

#[tokio::test]
async fn entry_form_shows_field_errors() {
    let app = TestApp::new();
    install_recipe(&app).await;
    let (_, cookies) = app.create_and_login(&test_user("writer")).await;

    let page = "/blogging/edit/?template=recipe";
    let response = app
        .submit_form(
            page,
            "/blogging/edit/",
            &cookies,
            &[
                ("title", "Stew"),
                ("data", ""),
                ("template", "recipe"),
                ("servings", "0"),
                ("_action", "Save"),
            ],
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_string(response).await;
    assert::contains_count(&html, "Ensure this value is greater than or equal to 1.", 1);
    assert::contains(&html, r#"value="Stew""#);
    assert!(app.state.store().find_entry(1).await.unwrap().is_none());

    let response = app
        .submit_form(
            page,
            "/blogging/edit/",
            &cookies,
            &[("title", "Stew"), ("template", "recipe"), ("servings", "")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert::contains_count(&body_string(response).await, "This field is required.", 1);
}

#[tokio::test]
async fn entries_outlive_their_template() {
    let app = TestApp::new();
    install_recipe(&app).await;
    let (_, cookies) = app.create_and_login(&test_user("writer")).await;

    let response = app
        .submit_form(
            "/blogging/edit/?template=recipe",
            "/blogging/edit/",
            &cookies,
            &[
                ("title", "Bread"),
                ("template", "recipe"),
                ("servings", "8"),
                ("_action", "Publish"),
            ],
        )
        .await;
    assert_eq!(response.status(), StatusCode::FOUND);

    app.state.templates().remove("recipe").unwrap();

    let html = body_string(app.get("/blogging/1/", "").await).await;
    assert::contains(&html, "<dt>Servings</dt>");
    assert::contains(&html, "<dd>8</dd>");

    // The edit form still carries the template name.
    let edit = "/blogging/1/edit/";
    let html = body_string(app.get(edit, &cookies).await).await;
    assert::contains(&html, r#"<input type="hidden" name="template" value="recipe">"#);

    for fields in [
        vec![("title", "Bread v2"), ("template", "recipe"), ("_action", "Save")],
        vec![("title", "Bread v3"), ("_action", "Save")],
    ] {
        let response = app.submit_form(edit, edit, &cookies, &fields).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        let entry = app.state.store().find_entry(1).await.unwrap().unwrap();
        assert_eq!(entry.template.as_deref(), Some("recipe"));
        assert_eq!(entry.fields["servings"], 8);
    }
    let entry = app.state.store().find_entry(1).await.unwrap().unwrap();
    assert_eq!(entry.title, "Bread v3");
}
