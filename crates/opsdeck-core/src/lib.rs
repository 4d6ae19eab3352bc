//! Wire protocol and session model for opsdeck streaming sessions.
//!
//! This crate provides the fundamental building blocks:
//! - `Envelope` / `Inbound` - JSON message envelope and its decode result
//! - `wire` - base64 transcoding of terminal bytes
//! - `Session` - session identity and lifecycle states
//! - `Endpoint` - streaming and API URLs derived from a base URL
//! - `ClientConfig` - client tunables
//! - `TaskLauncher` - the non-streaming call that starts a task

pub mod config;
pub mod endpoint;
pub mod envelope;
pub mod error;
pub mod launcher;
pub mod session;
pub mod wire;

pub use config::ClientConfig;
pub use endpoint::Endpoint;
pub use envelope::{Envelope, Inbound};
pub use error::StreamError;
pub use launcher::{LaunchError, TaskLauncher, TaskTicket};
pub use session::{ConnectionId, Session, SessionKind, SessionState};
