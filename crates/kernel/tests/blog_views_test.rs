#![allow(clippy::unwrap_used, clippy::expect_used)]
//! HTML view tests: index, detail, manage and the edit form.

use axum::http::StatusCode;
use chrono::{Duration, Utc};

use blogging_kernel::content::EntryDraft;
use blogging_kernel::models::{Entry, PolicyInput, PolicyKind, User};
use blogging_test_utils::{assert, test_user};

mod common;
use common::{TestApp, body_string, location};

const EMPTY: &str = "No posts have been created yet. Start writing!";

async fn create_post(app: &TestApp, author: &User, title: &str, data: &str) -> Entry {
    create_post_with(app, author, title, data, Vec::new()).await
}

async fn create_post_with(
    app: &TestApp,
    author: &User,
    title: &str,
    data: &str,
    policies: Vec<PolicyInput>,
) -> Entry {
    let draft = EntryDraft {
        title: Some(title.to_string()),
        data: Some(data.to_string()),
        ..Default::default()
    };
    app.state
        .entries()
        .create(author, draft, policies)
        .await
        .unwrap()
        .0
}

fn published_now() -> Vec<PolicyInput> {
    vec![PolicyInput::open_from(PolicyKind::Publish, Utc::now())]
}

// =============================================================================
// Index
// =============================================================================

#[tokio::test]
async fn index_shows_empty_message() {
    let app = TestApp::new();

    let response = app.get("/blogging/", "").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert::contains_count(&body_string(response).await, EMPTY, 1);
}

#[tokio::test]
async fn index_lists_published_posts() {
    let app = TestApp::new();
    let author = app.create_user(&test_user("tester")).await;
    create_post_with(&app, &author, "Post 1", "This is post number 1", published_now()).await;
    create_post_with(&app, &author, "Post 2", "This is post number 2", published_now()).await;

    let html = body_string(app.get("/blogging/", "").await).await;
    assert::contains_count(&html, "Post 1", 1);
    assert::contains_count(&html, "Post 2", 1);
    assert::not_contains(&html, EMPTY);
}

#[tokio::test]
async fn index_hides_posts_without_open_publish_window() {
    let app = TestApp::new();
    let author = app.create_user(&test_user("tester")).await;
    create_post_with(&app, &author, "Post 1", "This is post number 1", published_now()).await;
    create_post_with(
        &app,
        &author,
        "Post 2",
        "This is post number 2",
        vec![PolicyInput::closed(PolicyKind::Publish)],
    )
    .await;
    create_post_with(
        &app,
        &author,
        "Post 3",
        "Scheduled",
        vec![PolicyInput::open_from(
            PolicyKind::Publish,
            Utc::now() + Duration::days(1),
        )],
    )
    .await;

    let html = body_string(app.get("/blogging/", "").await).await;
    assert::contains_count(&html, "Post 1", 1);
    assert::not_contains(&html, "Post 2");
    assert::not_contains(&html, "Post 3");
}

#[tokio::test]
async fn index_puts_pinned_posts_first() {
    let app = TestApp::new();
    let author = app.create_user(&test_user("tester")).await;
    let start = Utc::now() - Duration::hours(1);
    create_post_with(
        &app,
        &author,
        "Pinned post",
        "",
        vec![
            PolicyInput::open_from(PolicyKind::Publish, start),
            PolicyInput::open_from(PolicyKind::Pin, start),
        ],
    )
    .await;
    create_post_with(&app, &author, "Newer post", "", published_now()).await;

    let html = body_string(app.get("/blogging/", "").await).await;
    let pinned = html.find("Pinned post").unwrap();
    let newer = html.find("Newer post").unwrap();
    assert!(pinned < newer, "pinned entry should be listed first");
    assert::contains(&html, "blog-entry-pinned");
}

#[tokio::test]
async fn index_uses_active_flag_without_policies() {
    let app = TestApp::without_policies();
    let author = app.create_user(&test_user("tester")).await;
    app.state
        .entries()
        .create(
            &author,
            EntryDraft {
                title: Some("Visible".to_string()),
                is_active: Some(true),
                ..Default::default()
            },
            Vec::new(),
        )
        .await
        .unwrap();
    create_post(&app, &author, "Hidden", "").await;

    let html = body_string(app.get("/blogging/", "").await).await;
    assert::contains_count(&html, "Visible", 1);
    assert::not_contains(&html, "Hidden");
}

#[tokio::test]
async fn index_paginates() {
    let app = TestApp::new();
    let author = app.create_user(&test_user("tester")).await;
    for i in 1..=12 {
        create_post_with(&app, &author, &format!("Entry #{i:02}"), "", published_now()).await;
    }

    let first = body_string(app.get("/blogging/", "").await).await;
    assert::contains(&first, "/blogging/?page=2");
    assert::not_contains(&first, "Newer posts");

    let second = body_string(app.get("/blogging/?page=2", "").await).await;
    assert::contains(&second, "Newer posts");
    assert::contains_count(&second, "Entry #", 2);
}

#[tokio::test]
async fn index_page_far_past_the_end_is_empty() {
    let app = TestApp::new();
    let author = app.create_user(&test_user("tester")).await;
    create_post_with(&app, &author, "Only entry", "", published_now()).await;

    let response = app.get("/blogging/?page=18446744073709551615", "").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert::not_contains(&body_string(response).await, "Only entry");
}

// =============================================================================
// Detail
// =============================================================================

#[tokio::test]
async fn detail_of_missing_post_is_404() {
    let app = TestApp::new();
    let response = app.get("/blogging/1/", "").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn detail_shows_post() {
    let app = TestApp::new();
    let author = app.create_user(&test_user("tester")).await;
    create_post(&app, &author, "Post 1", "This is post number 1").await;

    let response = app.get("/blogging/1/", "").await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_string(response).await;
    assert::contains_count(&html, "This is post number 1", 1);
    assert::contains(&html, "by tester");
    // Edit link only for the author.
    assert::not_contains(&html, "/blogging/1/edit/");
}

#[tokio::test]
async fn detail_offers_edit_link_to_author() {
    let app = TestApp::new();
    let user = test_user("tester");
    let (author, cookies) = app.create_and_login(&user).await;
    create_post(&app, &author, "Post 1", "Body").await;

    let html = body_string(app.get("/blogging/1/", &cookies).await).await;
    assert::contains(&html, "/blogging/1/edit/");
    assert::contains(&html, "Draft");
}

// =============================================================================
// Manage
// =============================================================================

#[tokio::test]
async fn manage_redirects_anonymous_to_login() {
    let app = TestApp::new();
    let response = app.get("/blogging/manage/", "").await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/user/login?next=%2Fblogging%2Fmanage%2F");
}

#[tokio::test]
async fn manage_shows_empty_message() {
    let app = TestApp::new();
    let (_, cookies) = app.create_and_login(&test_user("tester")).await;

    let response = app.get("/blogging/manage/", &cookies).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert::contains_count(&body_string(response).await, EMPTY, 1);
}

#[tokio::test]
async fn manage_lists_only_own_posts() {
    let app = TestApp::new();
    let (author, cookies) = app.create_and_login(&test_user("tester")).await;
    let other = app.create_user(&test_user("other")).await;
    create_post(&app, &author, "Post 1", "This is post number 1").await;
    create_post(&app, &author, "Post 2", "This is post number 2").await;
    create_post(&app, &other, "Foreign post", "").await;

    let html = body_string(app.get("/blogging/manage/", &cookies).await).await;
    assert::contains_count(&html, "Post 1", 1);
    assert::contains_count(&html, "Post 2", 1);
    assert::not_contains(&html, "Foreign post");
}

#[tokio::test]
async fn manage_filters_by_status() {
    let app = TestApp::new();
    let (author, cookies) = app.create_and_login(&test_user("tester")).await;
    create_post_with(&app, &author, "Live one", "", published_now()).await;
    create_post(&app, &author, "Draft one", "").await;

    let drafts = body_string(app.get("/blogging/manage/?filter=draft", &cookies).await).await;
    assert::contains(&drafts, "Draft one");
    assert::not_contains(&drafts, "Live one");

    let published =
        body_string(app.get("/blogging/manage/?filter=published", &cookies).await).await;
    assert::contains(&published, "Live one");
    assert::not_contains(&published, "Draft one");
}

// =============================================================================
// Edit form
// =============================================================================

#[tokio::test]
async fn edit_requires_login() {
    let app = TestApp::new();

    let response = app.get("/blogging/edit/", "").await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert!(location(&response).starts_with("/user/login"));

    let response = app
        .post_form(
            "/blogging/edit/",
            "",
            &[
                ("title", "This is a test post"),
                ("data", "These are the post contents"),
                ("Save", "Save"),
            ],
        )
        .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert!(location(&response).starts_with("/user/login"));
}

#[tokio::test]
async fn edit_rejects_missing_csrf_token() {
    let app = TestApp::new();
    let (_, cookies) = app.create_and_login(&test_user("tester")).await;

    let response = app
        .post_form(
            "/blogging/edit/",
            &cookies,
            &[("title", "Sneaky"), ("_action", "Save")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(app.state.store().find_entry(1).await.unwrap().is_none());
}

#[tokio::test]
async fn save_redirects_to_filled_form() {
    let app = TestApp::new();
    let (_, cookies) = app.create_and_login(&test_user("tester")).await;

    let response = app
        .submit_form(
            "/blogging/edit/",
            "/blogging/edit/",
            &cookies,
            &[
                ("title", "This is a test post"),
                ("data", "These are the post contents"),
                ("Save", "Save"),
            ],
        )
        .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/blogging/1/edit/");

    let response = app.get("/blogging/1/edit/", &cookies).await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_string(response).await;
    assert::contains_count(&html, "This is a test post", 1);
    assert::contains(&html, "Status: Draft");
}

#[tokio::test]
async fn publish_redirects_to_detail() {
    let app = TestApp::new();
    let (_, cookies) = app.create_and_login(&test_user("tester")).await;

    let response = app
        .submit_form(
            "/blogging/edit/",
            "/blogging/edit/",
            &cookies,
            &[
                ("title", "This is a test post"),
                ("data", "These are the post contents"),
                ("_action", "Publish"),
            ],
        )
        .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/blogging/1/");

    let html = body_string(app.get("/blogging/1/", &cookies).await).await;
    assert::contains_count(&html, "This is a test post", 1);

    let index = body_string(app.get("/blogging/", "").await).await;
    assert::contains_count(&index, "This is a test post", 1);
}

#[tokio::test]
async fn edit_form_shows_existing_post() {
    let app = TestApp::new();
    let (author, cookies) = app.create_and_login(&test_user("tester")).await;
    let entry = create_post(&app, &author, "Post Edit 1", "Content of post 1").await;

    let response = app.get(&format!("/blogging/{}/edit/", entry.id), &cookies).await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_string(response).await;
    assert::contains_count(&html, "Post Edit 1", 1);
    assert::contains_count(&html, "Content of post 1", 1);
}

#[tokio::test]
async fn edit_replaces_title_and_data() {
    let app = TestApp::new();
    let (author, cookies) = app.create_and_login(&test_user("tester")).await;
    let entry = create_post(&app, &author, "Post Edit 1", "Content of post 1").await;
    let url = format!("/blogging/{}/edit/", entry.id);

    let response = app
        .submit_form(
            &url,
            &url,
            &cookies,
            &[("title", "Altered title"), ("data", "Altered data"), ("Save", "Save")],
        )
        .await;
    assert_eq!(location(&response), url);

    let html = body_string(app.get(&url, &cookies).await).await;
    assert::not_contains(&html, "Post Edit 1");
    assert::not_contains(&html, "Content of post 1");
    assert::contains_count(&html, "Altered title", 1);
    assert::contains_count(&html, "Altered data", 1);
}

#[tokio::test]
async fn delete_redirects_to_index() {
    let app = TestApp::new();
    let (author, cookies) = app.create_and_login(&test_user("tester")).await;
    create_post(&app, &author, "Post Edit 1", "Content of post 1").await;

    let response = app
        .submit_form(
            "/blogging/1/edit/",
            "/blogging/1/edit/",
            &cookies,
            &[("Delete", "Delete")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/blogging/");
    assert!(app.state.store().find_entry(1).await.unwrap().is_none());
}

#[tokio::test]
async fn other_authors_cannot_edit() {
    let app = TestApp::new();
    let owner = app.create_user(&test_user("owner")).await;
    let (_, cookies) = app.create_and_login(&test_user("intruder")).await;
    create_post(&app, &owner, "Mine", "Hands off").await;

    let response = app.get("/blogging/1/edit/", &cookies).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .submit_form(
            "/blogging/edit/",
            "/blogging/1/edit/",
            &cookies,
            &[("_action", "Delete")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(app.state.store().find_entry(1).await.unwrap().is_some());
}

#[tokio::test]
async fn empty_post_shows_error() {
    let app = TestApp::new();
    let (_, cookies) = app.create_and_login(&test_user("tester")).await;

    let response = app
        .submit_form(
            "/blogging/edit/",
            "/blogging/edit/",
            &cookies,
            &[("title", ""), ("data", ""), ("Publish", "Publish")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert::contains_count(
        &body_string(response).await,
        "Either title or content must be non-empty",
        1,
    );
    assert!(app.state.store().find_entry(1).await.unwrap().is_none());
}

#[tokio::test]
async fn post_with_data_only_uses_data_as_title() {
    let app = TestApp::new();
    let (_, cookies) = app.create_and_login(&test_user("tester")).await;

    let response = app
        .submit_form(
            "/blogging/edit/",
            "/blogging/edit/",
            &cookies,
            &[("title", ""), ("data", "Some data is present"), ("Publish", "Publish")],
        )
        .await;
    assert_eq!(location(&response), "/blogging/1/");

    let html = body_string(app.get("/blogging/1/", &cookies).await).await;
    assert::contains_count(&html, "Some data", 2);
}

#[tokio::test]
async fn post_with_title_only() {
    let app = TestApp::new();
    let (_, cookies) = app.create_and_login(&test_user("tester")).await;

    let response = app
        .submit_form(
            "/blogging/edit/",
            "/blogging/edit/",
            &cookies,
            &[("title", "Contains title"), ("data", ""), ("Publish", "Publish")],
        )
        .await;
    assert_eq!(location(&response), "/blogging/1/");

    let html = body_string(app.get("/blogging/1/", &cookies).await).await;
    assert::contains_count(&html, "Contains title", 1);
}

#[tokio::test]
async fn pin_and_unpin_from_edit_form() {
    let app = TestApp::new();
    let (author, cookies) = app.create_and_login(&test_user("tester")).await;
    create_post_with(&app, &author, "Pin me", "", published_now()).await;

    let response = app
        .submit_form(
            "/blogging/1/edit/",
            "/blogging/1/edit/",
            &cookies,
            &[("title", "Pin me"), ("_action", "Pin")],
        )
        .await;
    assert_eq!(location(&response), "/blogging/1/edit/");
    let html = body_string(app.get("/blogging/1/edit/", &cookies).await).await;
    assert::contains(&html, r#"value="Unpin""#);
    assert::contains(&html, "Status: Pinned");

    app.submit_form(
        "/blogging/1/edit/",
        "/blogging/1/edit/",
        &cookies,
        &[("title", "Pin me"), ("_action", "Unpin")],
    )
    .await;
    let html = body_string(app.get("/blogging/1/edit/", &cookies).await).await;
    assert::contains(&html, r#"value="Pin""#);
    assert::contains(&html, "Status: Published");
}

#[tokio::test]
async fn pin_is_rejected_without_policies() {
    let app = TestApp::without_policies();
    let (author, cookies) = app.create_and_login(&test_user("tester")).await;
    create_post(&app, &author, "No pins", "").await;

    let response = app
        .submit_form(
            "/blogging/1/edit/",
            "/blogging/1/edit/",
            &cookies,
            &[("title", "No pins"), ("_action", "Pin")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn publish_without_policies_sets_active_flag() {
    let app = TestApp::without_policies();
    let (_, cookies) = app.create_and_login(&test_user("tester")).await;

    app.submit_form(
        "/blogging/edit/",
        "/blogging/edit/",
        &cookies,
        &[("title", "Flagged"), ("_action", "Publish")],
    )
    .await;

    let entry = app.state.store().find_entry(1).await.unwrap().unwrap();
    assert!(entry.is_active);
    let index = body_string(app.get("/blogging/", "").await).await;
    assert::contains_count(&index, "Flagged", 1);
}
