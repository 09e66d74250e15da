use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;
use tasklane_shared::{AuthResponse, Envelope, LoginRequest, RegisterRequest, User};
use tracing::{info, instrument, warn};

use crate::error::ApiError;
use crate::session::{ApiRequest, SessionClient};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum UserPayload {
    Wrapped(Envelope<User>),
    Bare(User),
}

impl UserPayload {
    fn into_user(self) -> User {
        match self {
            Self::Wrapped(envelope) => envelope.data,
            Self::Bare(user) => user,
        }
    }
}

/// The signed-in user and the client that carries their credential.
pub struct Session {
    client: Arc<SessionClient>,
    user: Mutex<Option<User>>,
}

impl Session {
    pub fn new(client: Arc<SessionClient>) -> Self {
        Self {
            client,
            user: Mutex::new(None),
        }
    }

    pub fn user(&self) -> Option<User> {
        self.user.lock().clone()
    }

    pub fn has_credential(&self) -> Result<bool, ApiError> {
        Ok(self.client.credential()?.is_some())
    }

    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<User, ApiError> {
        require("email", email)?;
        require("password", password)?;

        let request = ApiRequest::post("/auth/login").without_refresh().json(&LoginRequest {
            email: email.trim().to_string(),
            password: password.to_string(),
        })?;
        let response: AuthResponse = self.client.request(request).await?;
        self.client.store_credential(&response.token)?;
        info!("logged in");

        self.current_user().await
    }

    #[instrument(skip(self, password))]
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        user_name: &str,
    ) -> Result<User, ApiError> {
        require("email", email)?;
        require("password", password)?;
        require("user name", user_name)?;

        let request = ApiRequest::post("/auth/register").without_refresh().json(&RegisterRequest {
            email: email.trim().to_string(),
            password: password.to_string(),
            user_name: user_name.trim().to_string(),
        })?;
        let response: AuthResponse = self.client.request(request).await?;
        self.client.store_credential(&response.token)?;
        info!("registered");

        match response.user {
            Some(user) => {
                *self.user.lock() = Some(user.clone());
                Ok(user)
            }
            None => self.current_user().await,
        }
    }

    /// Ends the session on the server, then always drops local session
    /// state. A server-side failure is returned after the local cleanup.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<(), ApiError> {
        let result = self.client.request_empty(ApiRequest::post("/auth/logout")).await;
        if let Err(err) = &result {
            warn!(error = %err, "server logout failed; clearing local session anyway");
        }

        self.client.clear_credential()?;
        *self.user.lock() = None;
        info!("logged out");
        result
    }

    #[instrument(skip(self))]
    pub async fn current_user(&self) -> Result<User, ApiError> {
        let payload: UserPayload = self.client.request(ApiRequest::get("/user")).await?;
        let user = payload.into_user();
        *self.user.lock() = Some(user.clone());
        Ok(user)
    }
}

fn require(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::Validation(format!("{field} is required")));
    }
    Ok(())
}
