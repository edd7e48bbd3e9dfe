#![allow(dead_code)]

use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use archive_auth::auth::password::hash_password_with_cost;
use archive_auth::auth::recovery_token::PasswordResetAttempt;
use archive_auth::auth::AuthContext;
use archive_auth::configuration::{
    ApplicationSettings, DatabaseSettings, EmailClientSettings, JwtSettings, RateLimitSettings,
    RecoverySettings, Settings,
};
use archive_auth::email_client::{EmailClient, SenderEmail};
use archive_auth::startup::run;
use archive_auth::store::{MemoryStore, PrincipalRecord};
use secrecy::Secret;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const PASSWORD: &str = "Correct-horse9";

pub struct TestApp {
    pub address: String,
    pub store: Arc<MemoryStore>,
    pub email_server: MockServer,
    pub jwt: JwtSettings,
    pub client: reqwest::Client,
}

pub fn test_settings(login_requests_per_minute: u32) -> Settings {
    Settings {
        database: DatabaseSettings {
            username: "unused".into(),
            password: Secret::new("unused".into()),
            port: 5432,
            host: "127.0.0.1".into(),
            database_name: "unused".into(),
            max_connections: 1,
        },
        application: ApplicationSettings {
            host: "127.0.0.1".into(),
            port: 0,
        },
        jwt: JwtSettings {
            secret: Secret::new("integration-test-secret-with-enough-length".into()),
            access_token_expiry: 3600,
            refresh_token_expiry: 604800,
            issuer: "archive-test".into(),
            revoke_lineage_on_reuse: true,
            enforce_permission_version: true,
        },
        recovery: RecoverySettings::default(),
        email_client: EmailClientSettings {
            base_url: "http://127.0.0.1:1".into(),
            sender_email: "archive@municipality.example".into(),
            timeout_milliseconds: 2000,
        },
        rate_limit: RateLimitSettings {
            login_requests_per_minute,
            max_content_length: 4096,
        },
    }
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(test_settings(1000)).await
}

pub async fn spawn_app_with(settings: Settings) -> TestApp {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    let email_server = MockServer::start().await;
    Mock::given(path("/email"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&email_server)
        .await;

    let email_client = EmailClient::new(
        email_server.uri(),
        SenderEmail::parse(settings.email_client.sender_email.clone()).unwrap(),
        settings.email_client.timeout(),
    );

    let store = Arc::new(MemoryStore::new());
    let context = AuthContext::in_memory(
        store.clone(),
        Arc::new(email_client),
        settings.jwt.clone(),
        settings.recovery.clone(),
    );
    let jwt = settings.jwt.clone();

    let server = run(listener, context, settings).expect("Failed to bind address");
    let _ = tokio::spawn(server);

    TestApp {
        address,
        store,
        email_server,
        jwt,
        client: reqwest::Client::new(),
    }
}

impl TestApp {
    pub fn seed_principal(&self, email: &str, role: &str) -> PrincipalRecord {
        let hash = hash_password_with_cost(PASSWORD, 4).unwrap();
        let record = PrincipalRecord::new(email, "Test Principal", role, &hash);
        self.store.add_principal(record.clone()).unwrap();
        record
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(&format!("{}{}", self.address, path))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn post_json_with_bearer(
        &self,
        path: &str,
        token: &str,
        body: &Value,
    ) -> reqwest::Response {
        self.client
            .post(&format!("{}{}", self.address, path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn get_with_bearer(&self, path: &str, token: &str) -> reqwest::Response {
        self.client
            .get(&format!("{}{}", self.address, path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn login(&self, email: &str, password: &str) -> reqwest::Response {
        self.post_json("/auth/login", &json!({ "email": email, "password": password }))
            .await
    }

    /// Log in and return the parsed 200 body.
    pub async fn login_ok(&self, email: &str) -> Value {
        let response = self.login(email, PASSWORD).await;
        assert_eq!(200, response.status().as_u16());
        response.json().await.unwrap()
    }

    pub async fn refresh(&self, refresh_token: &str) -> reqwest::Response {
        self.post_json("/auth/refresh", &json!({ "refreshToken": refresh_token }))
            .await
    }

    /// Wait until the background recovery work has logged `count` attempts.
    ///
    /// Attempts are recorded after delivery, so emails are settled too.
    pub async fn wait_for_reset_attempts(&self, count: usize) -> Vec<PasswordResetAttempt> {
        for _ in 0..100 {
            let attempts = self.store.reset_attempts().unwrap();
            if attempts.len() >= count {
                return attempts;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("Expected {} reset attempts", count);
    }

    /// POST /auth/forgot-password and wait for its background work.
    pub async fn forgot_password(&self, email: &str) -> reqwest::Response {
        let before = self.store.reset_attempts().unwrap().len();
        let response = self
            .post_json("/auth/forgot-password", &json!({ "email": email }))
            .await;
        self.wait_for_reset_attempts(before + 1).await;
        response
    }

    /// Recovery token from the most recent email the fake API received.
    pub async fn last_recovery_token(&self) -> String {
        let requests = self.email_server.received_requests().await.unwrap();
        let last = requests.last().expect("No email was sent");
        let body: Value = serde_json::from_slice(&last.body).unwrap();
        let text = body["TextBody"].as_str().unwrap();
        let start = text.find("token=").unwrap() + "token=".len();
        text[start..]
            .chars()
            .take_while(|c| c.is_ascii_hexdigit())
            .collect()
    }
}

pub async fn error_code(response: reqwest::Response) -> String {
    let body: Value = response.json().await.unwrap();
    body["code"].as_str().unwrap_or_default().to_string()
}
