//! HTTP session client.
//!
//! Every request reads the stored credential and sends it as a bearer token.
//! A 401 is recovered at most once per logical request: the client asks
//! `/auth/refresh` for a new credential, stores it, and resends. A failed
//! refresh clears the stored credential and notifies the
//! [`SessionObserver`] so the front end can send the user back to login.
//! 429 responses are returned straight away.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tasklane_shared::RefreshResponse;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::storage::{KeyValueStore, TOKEN_KEY};

pub const REFRESH_PATH: &str = "/auth/refresh";

/// Receives the "go back to login" side effect of an unrecoverable refresh.
pub trait SessionObserver: Send + Sync {
    fn session_expired(&self);
}

/// Observer that only logs; used where nobody needs to react.
#[derive(Debug, Default)]
pub struct LogObserver;

impl SessionObserver for LogObserver {
    fn session_expired(&self) {
        warn!("session expired; credential cleared");
    }
}

/// Where a logical request is in its recovery path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    First,
    Retried,
}

/// An owned request description, kept around so it can be resent.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub params: Vec<(String, String)>,
    /// Where the request starts; `Retried` means a 401 is returned as is.
    pub attempt: Attempt,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            params: Vec::new(),
            attempt: Attempt::First,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, ApiError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    /// For endpoints whose 401 means "bad credentials" rather than
    /// "expired session", such as login.
    pub fn without_refresh(mut self) -> Self {
        self.attempt = Attempt::Retried;
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }
}

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000/api".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

pub struct SessionClient {
    http: reqwest::Client,
    base_url: String,
    store: Arc<dyn KeyValueStore>,
    observer: Arc<dyn SessionObserver>,
}

impl SessionClient {
    pub fn new(
        settings: &ClientSettings,
        store: Arc<dyn KeyValueStore>,
        observer: Arc<dyn SessionObserver>,
    ) -> anyhow::Result<Self> {
        let base_url = settings.base_url.trim_end_matches('/').to_string();
        Url::parse(&base_url)
            .map_err(|err| anyhow::anyhow!("invalid api url {base_url}: {err}"))?;

        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(settings.timeout)
            .build()?;

        debug!(base_url = %base_url, timeout = ?settings.timeout, "built session client");

        Ok(Self {
            http,
            base_url,
            store,
            observer,
        })
    }

    pub fn credential(&self) -> Result<Option<String>, ApiError> {
        Ok(self.store.get(TOKEN_KEY)?.filter(|token| !token.is_empty()))
    }

    pub fn store_credential(&self, token: &str) -> Result<(), ApiError> {
        self.store.set(TOKEN_KEY, token)?;
        Ok(())
    }

    pub fn clear_credential(&self) -> Result<(), ApiError> {
        self.store.remove(TOKEN_KEY)?;
        Ok(())
    }

    /// Sends `request` and decodes the JSON response body.
    pub async fn request<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        let body = self.execute(request).await?;
        let body = if body.trim().is_empty() { "null" } else { body.as_str() };
        Ok(serde_json::from_str(body)?)
    }

    /// Sends `request` and ignores whatever body comes back.
    pub async fn request_empty(&self, request: ApiRequest) -> Result<(), ApiError> {
        self.execute(request).await.map(|_| ())
    }

    /// Runs one logical request, including the single refresh-and-resend on
    /// 401. Returns the raw body of the successful response.
    pub async fn execute(&self, request: ApiRequest) -> Result<String, ApiError> {
        let span = info_span!(
            "api_request",
            request_id = %Uuid::new_v4(),
            method = %request.method,
            path = %request.path,
        );

        async move {
            let mut attempt = request.attempt;
            let mut token = self.credential()?;

            loop {
                match self.send_once(&request, token.as_deref(), attempt).await {
                    Ok(body) => return Ok(body),
                    Err(err) if err.is_unauthorized() && attempt == Attempt::First => {
                        info!("credential rejected; refreshing once");
                        attempt = Attempt::Retried;
                        token = Some(self.refresh().await?);
                    }
                    Err(err) => {
                        if err.is_rate_limited() {
                            warn!("rate limited; not retrying");
                        }
                        return Err(err);
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Exchanges the current credential for a new one and stores it.
    ///
    /// On failure the stored credential is removed and the observer is told
    /// the session has expired.
    pub async fn refresh(&self) -> Result<String, ApiError> {
        let outcome = self.try_refresh().await;
        match outcome {
            Ok(token) => {
                info!("credential refreshed");
                Ok(token)
            }
            Err(err) => {
                warn!(error = %err, "credential refresh failed; clearing session");
                if let Err(clear_err) = self.store.remove(TOKEN_KEY) {
                    warn!(error = %clear_err, "failed to clear stored credential");
                }
                self.observer.session_expired();
                Err(ApiError::RefreshFailed {
                    source: Box::new(err),
                })
            }
        }
    }

    async fn try_refresh(&self) -> Result<String, ApiError> {
        // Sent as an already-retried request: a 401 here ends the session.
        let current = self.credential()?;
        let body = self
            .send_once(&ApiRequest::post(REFRESH_PATH), current.as_deref(), Attempt::Retried)
            .await?;
        let parsed: RefreshResponse = serde_json::from_str(&body)?;
        self.store_credential(&parsed.token)?;
        Ok(parsed.token)
    }

    async fn send_once(
        &self,
        request: &ApiRequest,
        token: Option<&str>,
        attempt: Attempt,
    ) -> Result<String, ApiError> {
        let url = self.url_for(request)?;
        debug!(%url, ?attempt, authenticated = token.is_some(), "sending request");

        let mut builder = self.http.request(request.method.clone(), url);
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let text = response.text().await?;

        debug!(%status, ?attempt, bytes = text.len(), "received response");

        if status.is_success() {
            Ok(text)
        } else {
            Err(ApiError::from_response(status, &headers, &text))
        }
    }

    fn url_for(&self, request: &ApiRequest) -> Result<Url, ApiError> {
        let path = if request.path.starts_with('/') {
            request.path.clone()
        } else {
            format!("/{}", request.path)
        };
        let mut url = Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|err| ApiError::Validation(format!("invalid request path {path}: {err}")))?;

        if !request.params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &request.params {
                pairs.append_pair(key, value);
            }
        }

        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn client(base: &str) -> SessionClient {
        let settings = ClientSettings {
            base_url: base.to_string(),
            ..ClientSettings::default()
        };
        SessionClient::new(&settings, Arc::new(MemoryStore::new()), Arc::new(LogObserver))
            .expect("client")
    }

    #[test]
    fn url_keeps_base_path_prefix() {
        let client = client("http://localhost:5000/api/");
        let url = client
            .url_for(&ApiRequest::get("/todos").param("status", "pending"))
            .expect("url");
        assert_eq!(url.as_str(), "http://localhost:5000/api/todos?status=pending");

        let url = client.url_for(&ApiRequest::delete("todos/42")).expect("url");
        assert_eq!(url.as_str(), "http://localhost:5000/api/todos/42");
    }

    #[test]
    fn rejects_invalid_base_url() {
        let settings = ClientSettings {
            base_url: "not a url".to_string(),
            ..ClientSettings::default()
        };
        assert!(
            SessionClient::new(&settings, Arc::new(MemoryStore::new()), Arc::new(LogObserver))
                .is_err()
        );
    }

    #[test]
    fn empty_credential_counts_as_absent() {
        let store = Arc::new(MemoryStore::with_entry(TOKEN_KEY, ""));
        let client = SessionClient::new(&ClientSettings::default(), store, Arc::new(LogObserver))
            .expect("client");
        assert_eq!(client.credential().expect("credential"), None);
    }
}
