#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Common test utilities for integration tests.
//!
//! [`TestApp`] drives the REAL router and services over the in-memory content
//! store and the in-memory session store. Every test gets its own app, so
//! entry IDs start at 1 and no state leaks between tests.

#![allow(dead_code)]

use argon2::{Algorithm, Argon2, Params, Version};
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use axum::response::Response;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;
use tower_sessions::cookie::SameSite;

use blogging_kernel::AppState;
use blogging_kernel::config::BlogSettings;
use blogging_kernel::models::user::hash_password_with;
use blogging_kernel::models::{NewUser, User};
use blogging_kernel::routes::app_router;
use blogging_kernel::session::memory_session_layer;
use blogging_test_utils::TestUser;

/// Test application wrapper using the REAL kernel routes and state.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    /// Generated template artifacts for this app.
    pub dir: TempDir,
}

impl TestApp {
    /// App with publication policies enabled.
    pub fn new() -> Self {
        Self::with_settings(BlogSettings::default())
    }

    /// App where the `is_active` flag decides publication.
    pub fn without_policies() -> Self {
        Self::with_settings(BlogSettings {
            use_policy: false,
            ..BlogSettings::default()
        })
    }

    pub fn with_settings(settings: BlogSettings) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create artifact dir");
        let state = AppState::in_memory(settings, dir.path()).expect("Failed to build AppState");

        // Must match the layer order in main.rs.
        let router = app_router()
            .layer(memory_session_layer(SameSite::Strict))
            .layer(tower_http::trace::TraceLayer::new_for_http())
            .with_state(state.clone());

        Self { router, state, dir }
    }

    /// Send a request to the test application.
    pub async fn request(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request")
    }

    /// Send a request with cookies from a previous response.
    pub async fn request_with_cookies(&self, mut request: Request<Body>, cookies: &str) -> Response {
        if !cookies.is_empty() {
            request.headers_mut().insert(
                header::COOKIE,
                cookies.parse().expect("Invalid cookie header"),
            );
        }
        self.request(request).await
    }

    pub async fn get(&self, uri: &str, cookies: &str) -> Response {
        self.request_with_cookies(Request::get(uri).body(Body::empty()).unwrap(), cookies)
            .await
    }

    /// POST url-encoded form fields.
    pub async fn post_form(&self, uri: &str, cookies: &str, fields: &[(&str, &str)]) -> Response {
        let request = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(encode_form(fields)))
            .unwrap();
        self.request_with_cookies(request, cookies).await
    }

    /// Fetch `page` for a fresh CSRF token, then POST the form to `uri`.
    pub async fn submit_form(
        &self,
        page: &str,
        uri: &str,
        cookies: &str,
        fields: &[(&str, &str)],
    ) -> Response {
        let token = self.csrf_token(page, cookies).await;
        let mut with_token: Vec<(&str, &str)> = vec![("_token", token.as_str())];
        with_token.extend_from_slice(fields);
        self.post_form(uri, cookies, &with_token).await
    }

    /// Send a JSON request. `body` of `None` sends no body.
    pub async fn json(
        &self,
        method: Method,
        uri: &str,
        cookies: &str,
        body: Option<Value>,
    ) -> Response {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.request_with_cookies(request, cookies).await
    }

    /// Render `page` and pull the CSRF token out of its first form.
    pub async fn csrf_token(&self, page: &str, cookies: &str) -> String {
        let response = self.get(page, cookies).await;
        assert_eq!(response.status(), StatusCode::OK, "GET {page} failed");
        let html = body_string(response).await;
        extract_csrf_token(&html).expect("page has no CSRF token")
    }

    /// Create a user directly in the store.
    ///
    /// Uses minimal Argon2 params for test speed.
    pub async fn create_user(&self, user: &TestUser) -> User {
        let params = Params::new(4 * 1024, 1, 1, None).expect("test Argon2 params are valid");
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let pass = hash_password_with(&argon2, &user.password).expect("Failed to hash password");

        self.state
            .store()
            .create_user(NewUser {
                name: user.name.clone(),
                pass,
                mail: user.mail.clone(),
                is_admin: user.is_admin,
            })
            .await
            .expect("Failed to create test user")
    }

    /// Login via JSON API and return session cookies.
    ///
    /// # Panics
    ///
    /// Panics if the login response is not 200 OK.
    pub async fn login(&self, user: &TestUser) -> String {
        let response = self
            .json(Method::POST, "/user/login/json", "", Some(user.login_json()))
            .await;
        assert_eq!(
            response.status(),
            StatusCode::OK,
            "Login failed for user '{}'",
            user.name
        );
        extract_cookies(&response)
    }

    /// Create a user and return it with session cookies after logging in.
    pub async fn create_and_login(&self, user: &TestUser) -> (User, String) {
        let created = self.create_user(user).await;
        let cookies = self.login(user).await;
        (created, cookies)
    }
}

/// Extract Set-Cookie headers from a response for use in subsequent requests.
pub fn extract_cookies(response: &Response) -> String {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|cookie| cookie.split(';').next())
        .collect::<Vec<_>>()
        .join("; ")
}

/// The value of the first `name="_token"` input.
pub fn extract_csrf_token(html: &str) -> Option<String> {
    let marker = r#"name="_token" value=""#;
    let start = html.find(marker)? + marker.len();
    let end = html[start..].find('"')?;
    Some(html[start..start + end].to_string())
}

/// The Location header of a redirect.
pub fn location(response: &Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

pub fn encode_form(fields: &[(&str, &str)]) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

pub async fn body_string(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
