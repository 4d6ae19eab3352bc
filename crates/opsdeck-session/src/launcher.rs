//! HTTP task launcher.

use async_trait::async_trait;
use opsdeck_core::{Endpoint, LaunchError, TaskLauncher, TaskTicket, error::is_auth_rejection};
use reqwest::{Client, redirect};
use serde_json::Value;

/// Starts tasks with `POST {base}{path}`.
///
/// Redirects are not followed: an auth proxy answering with a redirect means
/// the session has expired.
#[derive(Clone)]
pub struct HttpTaskLauncher {
    http: Client,
    endpoint: Endpoint,
    token: Option<String>,
}

impl HttpTaskLauncher {
    /// Create a launcher for `endpoint`.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(endpoint: Endpoint) -> Result<Self, LaunchError> {
        let http = Client::builder()
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| LaunchError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            endpoint,
            token: None,
        })
    }

    /// Send `token` as a bearer token with every request.
    #[must_use]
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

#[async_trait]
impl TaskLauncher for HttpTaskLauncher {
    async fn launch(&self, path: &str, body: Option<&Value>) -> Result<TaskTicket, LaunchError> {
        let url = self
            .endpoint
            .api(path)
            .map_err(|e| LaunchError::Transport(e.to_string()))?;

        let mut request = self.http.post(url);
        if let Some(body) = body {
            request = request.json(body);
        }
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| LaunchError::Transport(e.to_string()))?;
        let status = response.status();

        if is_auth_rejection(status.as_u16()) {
            return Err(LaunchError::SessionExpired {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            // FastAPI-style `{"detail": "..."}`; anything else gets a generic message.
            let detail = response
                .json::<Value>()
                .await
                .ok()
                .and_then(|body| body.get("detail")?.as_str().map(str::to_owned))
                .unwrap_or_else(|| format!("request failed with status {}", status.as_u16()));
            return Err(LaunchError::Rejected {
                status: status.as_u16(),
                detail,
            });
        }

        response
            .json::<TaskTicket>()
            .await
            .map_err(|e| LaunchError::InvalidResponse(e.to_string()))
    }
}
