//! Test utilities and common setup.

#![allow(dead_code)]

use axum::Router;
use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use shelflife::api::{self, AppState};
use shelflife::auth::{AuthConfig, AuthState};
use shelflife::ws::Hub;

pub const TEST_SECRET: &str = "test-secret-for-integration-tests-minimum-32-chars";

/// A router plus a handle on the hub behind it.
pub struct TestApp {
    pub router: Router,
    pub hub: Arc<Hub>,
}

/// Create a test AuthConfig with a JWT secret for testing.
fn test_auth_config() -> AuthConfig {
    AuthConfig {
        jwt_secret: Some(TEST_SECRET.to_string()),
        ..AuthConfig::default()
    }
}

/// Create a test application with the default auth config.
pub fn test_app() -> TestApp {
    test_app_with(|_| {})
}

/// Create a test application after tweaking the auth config.
pub fn test_app_with(f: impl FnOnce(&mut AuthConfig)) -> TestApp {
    let mut config = test_auth_config();
    f(&mut config);

    let hub = Arc::new(Hub::new());
    let state = AppState::new(hub.clone(), AuthState::new(config));
    TestApp {
        router: api::create_router(state),
        hub,
    }
}

/// Sign arbitrary claims with the test secret.
pub fn sign(claims: Value) -> String {
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .unwrap()
}

/// A valid token for `user_id`, expiring in an hour.
pub fn token_for(user_id: &str) -> String {
    sign(json!({
        "sub": user_id,
        "aud": "authenticated",
        "role": "authenticated",
        "exp": Utc::now().timestamp() + 3600,
    }))
}

/// Serve `app` on an ephemeral local port.
pub async fn spawn_server(app: TestApp) -> (SocketAddr, Arc<Hub>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app.router;
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (addr, app.hub)
}

/// Poll until `cond` holds, failing the test after five seconds.
pub async fn eventually(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
