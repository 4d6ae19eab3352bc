//! Session identity and lifecycle states.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a session streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// Batch task output.
    Task,
    /// Interactive terminal.
    Terminal,
}

/// Lifecycle state of a session's connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Handshake in progress.
    Connecting,
    /// Handshake done, nothing received yet.
    Connected,
    /// Frames are flowing.
    Active,
    /// The server reported a final status.
    Finished,
    /// Closed by either side.
    Closed,
    /// Transport or server failure. Must be reopened.
    Errored,
}

impl SessionState {
    /// Whether the socket is open and frames can be sent.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Connected | Self::Active | Self::Finished)
    }

    /// Whether no physical connection is held in this state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Errored)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Active => "active",
            Self::Finished => "finished",
            Self::Closed => "closed",
            Self::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// One logical stream bound to at most one physical connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque identifier (task id or host name).
    pub id: String,
    /// Stream kind.
    pub kind: SessionKind,
    /// Current lifecycle state.
    pub state: SessionState,
}

impl Session {
    /// Create a session that has not connected yet.
    #[must_use]
    pub fn new(id: impl Into<String>, kind: SessionKind) -> Self {
        Self {
            id: id.into(),
            kind,
            state: SessionState::Closed,
        }
    }
}

/// Identifies one physical connection attempt.
///
/// A session gets a fresh id on every `connect`, so events from a torn-down
/// connection can be told apart from the live one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Allocate a new id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
