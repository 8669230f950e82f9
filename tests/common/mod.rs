#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    response::Response,
    Router,
};
use keelson::{
    api::{build_router, ApiState},
    auth::{AuthContext, MemoryPrincipalStore, PrincipalStore},
    config::{ConvergenceConfig, ServerConfig},
    domain::PrincipalId,
    services::ConvergenceWaiter,
    storage::MemoryTemplateStore,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tower::ServiceExt;

pub const ADMIN_TOKEN: &str = "kls_0000000000000000000000000000000000000000000000000000000000000000";

pub struct TestApp {
    state: ApiState,
    server: ServerConfig,
    pub store: Arc<MemoryTemplateStore>,
    pub principals: Arc<MemoryPrincipalStore>,
}

pub struct TestUser {
    pub id: String,
    pub principal_id: String,
    pub token: String,
}

impl TestApp {
    pub fn router(&self) -> Router {
        build_router(self.state.clone(), &self.server)
    }

    /// Waiter polling the same store the router writes to.
    pub fn waiter(&self) -> ConvergenceWaiter {
        ConvergenceWaiter::with_timing(
            self.store.clone(),
            Duration::from_millis(5),
            Duration::from_secs(5),
        )
    }

    pub async fn context_for(&self, user: &TestUser) -> AuthContext {
        let principal = self
            .principals
            .get(&PrincipalId::from_string(user.id.clone()))
            .await
            .expect("principal exists");
        AuthContext::from_principal(&principal)
    }
}

/// App on the in-memory backends with a bootstrapped admin.
pub async fn setup_test_app() -> TestApp {
    setup_test_app_with_delay(Duration::from_millis(100)).await
}

pub async fn setup_test_app_with_delay(reconcile_delay: Duration) -> TestApp {
    let store = Arc::new(MemoryTemplateStore::new());
    let principals = Arc::new(MemoryPrincipalStore::new());
    principals.ensure_admin("admin", ADMIN_TOKEN).await.expect("bootstrap admin");

    let convergence = ConvergenceConfig {
        reconcile_delay_ms: reconcile_delay.as_millis() as u64,
        ..Default::default()
    };
    let state = ApiState::new(store.clone(), principals.clone(), &convergence);

    TestApp { state, server: ServerConfig::default(), store, principals }
}

pub async fn send_request(
    app: &TestApp,
    method: Method,
    path: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Response {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }

    let request = if let Some(json) = body {
        let bytes = serde_json::to_vec(&json).expect("serialize body");
        builder
            .header("content-type", "application/json")
            .body(Body::from(bytes))
            .expect("build request")
    } else {
        builder.body(Body::empty()).expect("build request")
    };

    app.router().oneshot(request).await.expect("request")
}

pub async fn read_json<T: DeserializeOwned>(response: Response) -> T {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("read body");
    serde_json::from_slice(&bytes).expect("parse json")
}

/// Send a request, assert the status and return the JSON body.
pub async fn expect_json(
    app: &TestApp,
    method: Method,
    path: &str,
    token: &str,
    body: Option<Value>,
    status: StatusCode,
) -> Value {
    let response = send_request(app, method.clone(), path, Some(token), body).await;
    let actual = response.status();
    let json: Value = read_json(response).await;
    assert_eq!(actual, status, "{} {} returned {}", method, path, json);
    json
}

/// Assert an error response with the given status and code.
pub async fn expect_error(
    app: &TestApp,
    method: Method,
    path: &str,
    token: &str,
    body: Option<Value>,
    status: StatusCode,
    code: &str,
) {
    let json = expect_json(app, method, path, token, body, status).await;
    assert_eq!(json["type"], "error");
    assert_eq!(json["status"], status.as_u16());
    assert_eq!(json["code"], code);
}

pub async fn create_user(app: &TestApp, username: &str, roles: &[&str]) -> TestUser {
    let issued = expect_json(
        app,
        Method::POST,
        "/api/v1/users",
        ADMIN_TOKEN,
        Some(json!({"username": username, "globalRoles": roles})),
        StatusCode::CREATED,
    )
    .await;

    TestUser {
        id: issued["principal"]["id"].as_str().expect("id").to_string(),
        principal_id: issued["principal"]["principalIds"][0].as_str().expect("principal id").to_string(),
        token: issued["token"].as_str().expect("token").to_string(),
    }
}

pub async fn create_template(app: &TestApp, token: &str, name: &str, members: Value) -> Value {
    expect_json(
        app,
        Method::POST,
        "/api/v1/cluster-templates",
        token,
        Some(json!({"name": name, "members": members})),
        StatusCode::CREATED,
    )
    .await
}

pub async fn create_revision(app: &TestApp, token: &str, template_id: &str, body: Value) -> Value {
    expect_json(
        app,
        Method::POST,
        &format!("/api/v1/cluster-templates/{}/revisions", template_id),
        token,
        Some(body),
        StatusCode::CREATED,
    )
    .await
}

/// Revision pinning `rancherKubernetesEngineConfig.kubernetesVersion` through a question.
pub fn versioned_revision(name: &str, version: &str) -> Value {
    json!({
        "name": name,
        "clusterConfig": {
            "dockerRootDir": "/var/lib/docker",
            "rancherKubernetesEngineConfig": {"kubernetesVersion": version}
        },
        "questions": [{
            "variable": "rancherKubernetesEngineConfig.kubernetesVersion",
            "required": true,
            "type": "string",
            "default": version
        }]
    })
}
