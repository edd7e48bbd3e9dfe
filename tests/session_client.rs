mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use archive_auth::client::{
    ApiClient, ClientError, LoginNavigator, MemoryStorage, SessionStore,
};
use common::{spawn_app, PASSWORD};
use secrecy::Secret;
use serde_json::{json, Value};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct RecordingNavigator {
    calls: AtomicUsize,
}

impl LoginNavigator for RecordingNavigator {
    fn navigate_to_login(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl RecordingNavigator {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn session_with(access: &str, refresh: &str) -> SessionStore {
    let session = SessionStore::open(
        Box::new(MemoryStorage::new()),
        &Secret::new("test device passphrase".to_string()),
    )
    .unwrap();
    session.save_tokens(access, refresh).unwrap();
    session
}

fn client(base_url: &str, session: SessionStore) -> (ApiClient, Arc<RecordingNavigator>) {
    let navigator = Arc::new(RecordingNavigator::default());
    let client = ApiClient::new(base_url, session, navigator.clone()).unwrap();
    (client, navigator)
}

async fn mount_documents(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/documents"))
        .and(header("Authorization", "Bearer stale-access"))
        .respond_with(ResponseTemplate::new(401))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/documents"))
        .and(header("Authorization", "Bearer fresh-access"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "documents": [] })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn concurrent_401s_trigger_a_single_refresh() {
    let server = MockServer::start().await;
    mount_documents(&server).await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .and(body_json(json!({ "refreshToken": "refresh-1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "fresh-access",
            "refreshToken": "refresh-2",
            "tokenType": "Bearer",
            "expiresIn": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (client, navigator) = client(&server.uri(), session_with("stale-access", "refresh-1"));

    let requests = (0..5).map(|_| client.get("/api/documents"));
    let responses = futures::future::join_all(requests).await;

    for response in responses {
        assert_eq!(200, response.unwrap().status().as_u16());
    }
    assert_eq!(
        client.session().refresh_token().unwrap().as_deref(),
        Some("refresh-2")
    );
    assert_eq!(
        client.session().access_token().unwrap().as_deref(),
        Some("fresh-access")
    );
    assert_eq!(navigator.calls(), 0);
}

#[tokio::test]
async fn replay_happens_at_most_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/documents"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "fresh-access",
            "refreshToken": "refresh-2"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (client, _) = client(&server.uri(), session_with("stale-access", "refresh-1"));

    let response = client.get("/api/documents").await.unwrap();

    assert_eq!(401, response.status().as_u16());
}

#[tokio::test]
async fn failed_refresh_clears_session_and_navigates_to_login() {
    let server = MockServer::start().await;
    mount_documents(&server).await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "code": "TOKEN_REUSED" })))
        .expect(1)
        .mount(&server)
        .await;

    let (client, navigator) = client(&server.uri(), session_with("stale-access", "refresh-1"));

    let result = client.get("/api/documents").await;

    assert!(matches!(result, Err(ClientError::SessionExpired)));
    assert!(!client.session().is_authenticated().unwrap());
    assert_eq!(navigator.calls(), 1);
}

#[tokio::test]
async fn concurrent_failures_navigate_to_login_once() {
    let server = MockServer::start().await;
    mount_documents(&server).await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "code": "TOKEN_REUSED" })))
        .expect(1)
        .mount(&server)
        .await;

    let (client, navigator) = client(&server.uri(), session_with("stale-access", "refresh-1"));

    let requests = (0..5).map(|_| client.get("/api/documents"));
    let results = futures::future::join_all(requests).await;

    assert!(results
        .iter()
        .all(|result| matches!(result, Err(ClientError::SessionExpired))));
    assert_eq!(navigator.calls(), 1);
}

#[tokio::test]
async fn login_rearms_navigation_for_the_next_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/documents"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user": { "id": "1", "email": "a@x.com", "name": "A", "role": "clerk" },
            "accessToken": "second-access",
            "refreshToken": "second-refresh"
        })))
        .mount(&server)
        .await;

    let (client, navigator) = client(&server.uri(), session_with("stale-access", "refresh-1"));

    assert!(client.get("/api/documents").await.is_err());
    assert_eq!(navigator.calls(), 1);

    client.login("a@x.com", PASSWORD).await.unwrap();
    assert!(client.get("/api/documents").await.is_err());
    assert_eq!(navigator.calls(), 2);
}

#[tokio::test]
async fn missing_refresh_token_ends_session_without_calling_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/documents"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let session = session_with("stale-access", "refresh-1");
    session.clear().unwrap();
    let (client, navigator) = client(&server.uri(), session);

    let result = client.get("/api/documents").await;

    assert!(matches!(result, Err(ClientError::SessionExpired)));
    assert_eq!(navigator.calls(), 1);
}

#[tokio::test]
async fn logout_clears_local_state_even_when_server_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/logout"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let (client, navigator) = client(&server.uri(), session_with("access", "refresh"));

    assert!(client.logout(false).await.is_err());
    assert!(!client.session().is_authenticated().unwrap());
    assert_eq!(navigator.calls(), 1);
}

#[tokio::test]
async fn client_session_works_against_the_real_server() {
    let app = spawn_app().await;
    app.seed_principal("a@x.com", "clerk");
    let session = SessionStore::open(
        Box::new(MemoryStorage::new()),
        &Secret::new("test device passphrase".to_string()),
    )
    .unwrap();
    let (client, navigator) = client(&app.address, session);

    let user = client.login("a@x.com", PASSWORD).await.unwrap();
    assert_eq!(user.email, "a@x.com");

    let me = client.get("/auth/me").await.unwrap();
    assert_eq!(200, me.status().as_u16());
    let body: Value = me.json().await.unwrap();
    assert_eq!(body["email"], "a@x.com");

    client.logout(false).await.unwrap();
    assert!(!client.session().is_authenticated().unwrap());
    assert_eq!(navigator.calls(), 1);
}

#[tokio::test]
async fn login_failure_surfaces_server_code() {
    let app = spawn_app().await;
    let session = SessionStore::open(
        Box::new(MemoryStorage::new()),
        &Secret::new("test device passphrase".to_string()),
    )
    .unwrap();
    let (client, _) = client(&app.address, session);

    let err = client.login("nobody@x.com", PASSWORD).await.unwrap_err();

    match err {
        ClientError::Api { status, code } => {
            assert_eq!(status, 401);
            assert_eq!(code, "INVALID_CREDENTIALS");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}
