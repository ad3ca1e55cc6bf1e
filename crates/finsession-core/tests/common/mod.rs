//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use finsession_core::auth::credentials::ACCESS_TOKEN_KEY;
use finsession_core::auth::{
    CredentialStore, KeyValueStore, LifecyclePolicy, MemoryStore, Session, SessionState,
    TokenLifecycleManager,
};
use finsession_core::models::UserProfile;
use finsession_core::{ApiClient, EventSink, EventStream, SessionController, SessionEvent};
use serde_json::{json, Value};
use tokio::time::Duration;
use wiremock::MockServer;

pub const API_PREFIX: &str = "/api/v1";

pub fn api_path(endpoint: &str) -> String {
    format!("{}{}", API_PREFIX, endpoint)
}

pub fn controller_with_store(
    server: &MockServer,
    store: CredentialStore,
) -> (SessionController, EventStream) {
    let (events, rx) = EventSink::channel(4096);
    let session = SessionState::init(store, events);
    let lifecycle = TokenLifecycleManager::new(session, LifecyclePolicy::default());
    let api = ApiClient::new(&format!("{}{}", server.uri(), API_PREFIX), lifecycle).unwrap();
    (SessionController::new(api), rx)
}

pub fn controller(server: &MockServer) -> (SessionController, EventStream) {
    controller_with_store(server, CredentialStore::in_memory())
}

/// A controller whose backend refuses connections, for tests on a paused
/// clock where a mock server's own timers would be frozen.
pub fn offline_controller() -> (SessionController, EventStream) {
    let addr = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap();
    let (events, rx) = EventSink::channel(4096);
    let session = SessionState::init(CredentialStore::in_memory(), events);
    let lifecycle = TokenLifecycleManager::new(session, LifecyclePolicy::default());
    let api = ApiClient::with_timeout(
        &format!("http://{}{}", addr, API_PREFIX),
        lifecycle,
        Duration::from_secs(3600),
    )
    .unwrap();
    (SessionController::new(api), rx)
}

/// Advance the paused clock one second at a time, letting timer tasks run.
pub async fn advance_secs(secs: u64) {
    for _ in 0..secs {
        tokio::time::advance(Duration::from_secs(1)).await;
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }
}

/// A store holding an access token and nothing else.
pub fn access_only_store(access: &str) -> CredentialStore {
    let backend = MemoryStore::new();
    backend.set_many(&[(ACCESS_TOKEN_KEY, access)]).unwrap();
    CredentialStore::new(Box::new(backend))
}

pub fn user_json(id: &str, role: &str) -> Value {
    json!({
        "id": id,
        "nombre": "Ana",
        "email": "ana@example.com",
        "rol": role,
        "estado": "active"
    })
}

pub fn user(id: &str, role: &str) -> UserProfile {
    serde_json::from_value(user_json(id, role)).unwrap()
}

pub fn transaction_json(id: &str, day: u32) -> Value {
    json!({
        "id": id,
        "usuarioId": "u1",
        "tipo": "egreso",
        "categoriaId": "c1",
        "monto": 10.0,
        "moneda": "USD",
        "fecha": format!("2024-03-{:02}T12:00:00Z", day),
        "descripcion": format!("gasto {}", id)
    })
}

/// Put a signed-in session in place without going through `/auth/login`.
pub fn sign_in(controller: &SessionController, access: &str, refresh: &str, role: &str) {
    let session = Session {
        access_token: access.to_string(),
        refresh_token: refresh.to_string(),
        user: user("u1", role),
    };
    controller.session().establish(&session).unwrap();
    controller.lifecycle().start();
}

pub fn drain(rx: &mut EventStream) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
