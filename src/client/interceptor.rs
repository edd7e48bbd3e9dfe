//! HTTP client that keeps a session alive.
//!
//! Outgoing requests carry the stored access credential. A `401` triggers one
//! refresh through a separate client that never passes through this
//! pipeline, then one replay. Refreshes are single-flight: concurrent
//! requests that fail with the same stale credential wait for the first
//! refresh and replay with its result instead of spending the refresh token
//! again. When the refresh fails the session is wiped and the navigator is
//! sent to the login entry point.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Method, Request, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::client::session::{SessionStore, SessionUser};
use crate::client::storage::StorageError;
use crate::error::ErrorResponse;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("Session has ended; sign in again")]
    SessionExpired,
    #[error("Invalid header value")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
    #[error("Server rejected the request ({status}): {code}")]
    Api { status: u16, code: String },
}

/// Where the application sends the user when the session is over.
pub trait LoginNavigator: Send + Sync {
    fn navigate_to_login(&self);
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshBody<'a> {
    refresh_token: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LogoutBody<'a> {
    refresh_token: Option<&'a str>,
    all_devices: bool,
}

#[derive(Serialize)]
struct LoginBody<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenPair {
    access_token: String,
    refresh_token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResult {
    user: SessionUser,
    access_token: String,
    refresh_token: String,
}

pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
    /// Bypass channel for `/auth/refresh`.
    refresh_http: reqwest::Client,
    session: SessionStore,
    navigator: Arc<dyn LoginNavigator>,
    refresh_lock: tokio::sync::Mutex<()>,
    default_headers: RwLock<HeaderMap>,
    /// Set once the session is torn down; cleared by `login`.
    session_ended: AtomicBool,
}

fn poisoned<T>(_: T) -> ClientError {
    ClientError::Storage(StorageError::Poisoned)
}

fn bearer(token: &str) -> Result<HeaderValue, ClientError> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token))?;
    value.set_sensitive(true);
    Ok(value)
}

async fn api_error(response: Response) -> ClientError {
    let status = response.status().as_u16();
    let code = match response.json::<ErrorResponse>().await {
        Ok(body) => body.code,
        Err(_) => "UNKNOWN".to_string(),
    };
    ClientError::Api { status, code }
}

impl ApiClient {
    pub fn new(
        base_url: impl Into<String>,
        session: SessionStore,
        navigator: Arc<dyn LoginNavigator>,
    ) -> Result<Self, ClientError> {
        let mut default_headers = HeaderMap::new();
        if let Some(token) = session.access_token()? {
            default_headers.insert(AUTHORIZATION, bearer(&token)?);
        }

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            refresh_http: reqwest::Client::new(),
            session,
            navigator,
            refresh_lock: tokio::sync::Mutex::new(()),
            default_headers: RwLock::new(default_headers),
            session_ended: AtomicBool::new(false),
        })
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Builder on the intercepted channel; finish it with `execute`.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, self.url(path))
    }

    pub async fn get(&self, path: &str) -> Result<Response, ClientError> {
        self.execute(self.request(Method::GET, path).build()?).await
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<Response, ClientError> {
        self.execute(self.request(Method::POST, path).json(body).build()?)
            .await
    }

    fn current_authorization(&self) -> Result<Option<HeaderValue>, ClientError> {
        Ok(self.default_headers.read().map_err(poisoned)?.get(AUTHORIZATION).cloned())
    }

    fn set_authorization(&self, token: Option<&str>) -> Result<(), ClientError> {
        let value = token.map(bearer).transpose()?;
        let mut headers = self.default_headers.write().map_err(poisoned)?;
        match value {
            Some(value) => headers.insert(AUTHORIZATION, value),
            None => headers.remove(AUTHORIZATION),
        };
        Ok(())
    }

    async fn send_with(
        &self,
        mut request: Request,
        authorization: Option<HeaderValue>,
    ) -> Result<Response, ClientError> {
        if let Some(value) = authorization {
            request.headers_mut().insert(AUTHORIZATION, value);
        }
        Ok(self.http.execute(request).await?)
    }

    /// Send with the current credential; on `401`, refresh once and replay once.
    pub async fn execute(&self, request: Request) -> Result<Response, ClientError> {
        let replay = request.try_clone();
        let sent = self.current_authorization()?;

        let response = self.send_with(request, sent.clone()).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }
        // Streaming bodies cannot be replayed.
        let Some(replay) = replay else {
            return Ok(response);
        };

        match self.refresh_after(sent.as_ref()).await {
            Ok(fresh) => self.send_with(replay, Some(fresh)).await,
            Err(e) => {
                self.end_session();
                Err(e)
            }
        }
    }

    /// Single-flight refresh. `stale` is the credential the failed request
    /// carried; if the store already holds a different one, another request
    /// refreshed first and that credential is reused.
    async fn refresh_after(&self, stale: Option<&HeaderValue>) -> Result<HeaderValue, ClientError> {
        let _guard = self.refresh_lock.lock().await;

        if let Some(current) = self.session.access_token()? {
            let current = bearer(&current)?;
            if Some(&current) != stale {
                return Ok(current);
            }
        }

        let refresh_token = self
            .session
            .refresh_token()?
            .ok_or(ClientError::SessionExpired)?;

        let response = self
            .refresh_http
            .post(self.url("/auth/refresh"))
            .json(&RefreshBody {
                refresh_token: &refresh_token,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            tracing::warn!(status = response.status().as_u16(), "Session refresh rejected");
            return Err(ClientError::SessionExpired);
        }

        let pair: TokenPair = response.json().await?;
        self.session.save_tokens(&pair.access_token, &pair.refresh_token)?;
        self.set_authorization(Some(&pair.access_token))?;
        tracing::debug!("Session refreshed");

        bearer(&pair.access_token)
    }

    /// Wipe every trace of the session and go to the login entry point.
    /// Concurrent failures of one session navigate only once.
    fn end_session(&self) {
        if let Err(e) = self.session.clear() {
            tracing::error!(error = %e, "Failed to clear session storage");
        }
        if let Err(e) = self.set_authorization(None) {
            tracing::error!(error = %e, "Failed to clear default headers");
        }
        if !self.session_ended.swap(true, Ordering::SeqCst) {
            self.navigator.navigate_to_login();
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<SessionUser, ClientError> {
        let response = self
            .refresh_http
            .post(self.url("/auth/login"))
            .json(&LoginBody { email, password })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let result: LoginResult = response.json().await?;
        self.session.save_tokens(&result.access_token, &result.refresh_token)?;
        self.session.save_user(&result.user)?;
        self.set_authorization(Some(&result.access_token))?;
        self.session_ended.store(false, Ordering::SeqCst);

        Ok(result.user)
    }

    /// Server-side logout is best effort; local state always goes.
    pub async fn logout(&self, all_devices: bool) -> Result<(), ClientError> {
        let refresh_token = self.session.refresh_token().unwrap_or(None);
        let body = LogoutBody {
            refresh_token: refresh_token.as_deref(),
            all_devices,
        };

        let result = match self.request(Method::POST, "/auth/logout").json(&body).build() {
            Ok(request) => match self.send_with(request, self.current_authorization()?).await {
                Ok(response) if response.status().is_success() => Ok(()),
                Ok(response) => Err(api_error(response).await),
                Err(e) => Err(e),
            },
            Err(e) => Err(e.into()),
        };

        if let Err(e) = &result {
            tracing::warn!(error = %e, "Server-side logout failed");
        }
        self.end_session();
        result
    }
}
