//! Shared test helpers for integration tests.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use bazaar_api::{AppState, Stores, build_app};
use bazaar_auth::PasswordHasher;
use bazaar_core::config::AppConfig;
use bazaar_core::types::{SessionId, UserId};
use bazaar_database::store::UserStore;
use bazaar_entity::user::{CreateUser, UserRole};

/// A password the strength policy accepts.
pub const PASSWORD: &str = "umbrella-quartz-lantern-91-meadow";

/// Test application context
pub struct TestApp {
    /// The Axum router for making test requests
    pub router: Router,
    /// Shared state, for reaching the hub and dispatcher directly
    pub state: AppState,
    /// Backing stores
    pub stores: Stores,
    /// Fires on drop of the app
    pub shutdown: CancellationToken,
}

/// Credentials returned by register and login.
#[derive(Debug, Clone)]
pub struct TestSession {
    pub user_id: UserId,
    pub session_id: SessionId,
    pub access_token: String,
    pub refresh_token: String,
}

impl TestApp {
    /// Create a new test application over empty in-memory stores
    pub async fn new() -> Self {
        let mut config = AppConfig {
            environment: "test".into(),
            ..AppConfig::default()
        };
        config.auth.jwt_secret = "integration-test-secret-0123456789abcdef".into();

        let stores = Stores::memory();
        let shutdown = CancellationToken::new();
        let (state, _hub_task) = AppState::build(config, stores.clone(), shutdown.clone())
            .expect("Failed to build app state");
        let router = build_app(state.clone());

        Self {
            router,
            state,
            stores,
            shutdown,
        }
    }

    /// Create a user with the given role directly in the store
    pub async fn create_user(&self, email: &str, role: UserRole) -> UserId {
        let hash = PasswordHasher::new()
            .hash_password(PASSWORD)
            .expect("Failed to hash password");
        self.stores
            .users
            .create(
                &CancellationToken::new(),
                CreateUser {
                    email: email.to_string(),
                    display_name: email.split('@').next().unwrap_or(email).to_string(),
                    password_hash: hash,
                    role,
                },
            )
            .await
            .expect("Failed to create test user")
            .id
    }

    /// Register a member account through the API
    pub async fn register(&self, email: &str) -> TestSession {
        let response = self
            .request(
                "POST",
                "/api/auth/register",
                Some(serde_json::json!({
                    "email": email,
                    "password": PASSWORD,
                    "display_name": "Test User",
                })),
                None,
            )
            .await;
        assert_eq!(
            response.status,
            StatusCode::CREATED,
            "Register failed: {:?}",
            response.body
        );
        session_from(&response.body)
    }

    /// Login and return the new session's credentials
    pub async fn login(&self, email: &str) -> TestSession {
        let response = self
            .request(
                "POST",
                "/api/auth/login",
                Some(serde_json::json!({
                    "email": email,
                    "password": PASSWORD,
                })),
                None,
            )
            .await;
        assert_eq!(
            response.status,
            StatusCode::OK,
            "Login failed: {:?}",
            response.body
        );
        session_from(&response.body)
    }

    /// Make an HTTP request to the test app
    pub async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> TestResponse {
        let mut req = Request::builder().method(method).uri(path);

        if body.is_some() {
            req = req.header("Content-Type", "application/json");
        }
        if let Some(token) = token {
            req = req.header("Authorization", format!("Bearer {token}"));
        }

        let body_str = body
            .map(|b| serde_json::to_string(&b).expect("Failed to serialize body"))
            .unwrap_or_default();
        let req = req
            .body(Body::from(body_str))
            .expect("Failed to build request");

        let response = self
            .router
            .clone()
            .oneshot(req)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("Failed to read body");

        let body: Value = serde_json::from_slice(&body_bytes).unwrap_or(Value::Null);

        TestResponse { status, body }
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn session_from(body: &Value) -> TestSession {
    let data = &body["data"];
    let text = |field: &str| {
        data[field]
            .as_str()
            .unwrap_or_else(|| panic!("No {field} in response: {body}"))
            .to_string()
    };
    TestSession {
        user_id: data["user"]["id"]
            .as_str()
            .and_then(|id| id.parse().ok())
            .unwrap_or_else(|| panic!("No user id in response: {body}")),
        session_id: text("session_id").parse().unwrap(),
        access_token: text("access_token"),
        refresh_token: text("refresh_token"),
    }
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// Parsed JSON body
    pub body: Value,
}

impl TestResponse {
    /// The machine-readable error code of an error response.
    pub fn error_code(&self) -> &str {
        self.body["error"].as_str().unwrap_or_default()
    }
}
