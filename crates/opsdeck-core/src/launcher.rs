//! The non-streaming call that starts a task.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Response of a task-starting call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskTicket {
    /// Identifier to stream output for.
    pub task_id: String,
}

/// Launch error.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Credentials are no longer accepted. Reload instead of retrying.
    #[error("session expired (HTTP {status})")]
    SessionExpired { status: u16 },
    /// The server refused the request.
    #[error("{detail}")]
    Rejected { status: u16, detail: String },
    /// The request did not complete.
    #[error("request failed: {0}")]
    Transport(String),
    /// The server answered with something other than a ticket.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl LaunchError {
    /// Whether no further protocol operation can succeed.
    #[must_use]
    pub const fn is_session_expired(&self) -> bool {
        matches!(self, Self::SessionExpired { .. })
    }
}

/// Starts tasks on the server.
#[async_trait]
pub trait TaskLauncher: Send + Sync {
    /// POST `path` with an optional JSON body and return the new task's ticket.
    async fn launch(&self, path: &str, body: Option<&Value>) -> Result<TaskTicket, LaunchError>;
}
