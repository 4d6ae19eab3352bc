//! Task output streams and terminal bridges for opsdeck.
//!
//! Provides:
//! - `TaskStream` - ordered task output with a finish latch
//! - `TerminalBridge` - byte-level terminal I/O over a session
//! - `HttpTaskLauncher` - starts tasks over HTTP (feature: http)
//! - crossterm event mapping for terminal bridges (feature: tui)

pub mod task;
pub mod terminal;

#[cfg(feature = "http")]
pub mod launcher;

#[cfg(feature = "tui")]
pub mod tui;

pub use task::{TaskSnapshot, TaskStream};
pub use terminal::{Direction, TerminalBridge, TerminalFrame};

#[cfg(feature = "http")]
pub use launcher::HttpTaskLauncher;
