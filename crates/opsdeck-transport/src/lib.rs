//! WebSocket connection lifecycle for opsdeck streaming sessions.
//!
//! Provides:
//! - `Connection` - one physical WebSocket per session with callback slots
//! - `CallbackSlot` - a single replaceable callback
//! - `ViewportRegistry` - shared, reference-counted window-change listener

pub mod connection;
pub mod slot;
pub mod viewport;

pub use connection::Connection;
pub use slot::CallbackSlot;
pub use viewport::{Viewport, ViewportGuard, ViewportRegistry, ViewportSource};

#[cfg(all(unix, feature = "tui"))]
pub use viewport::WindowChangeSource;
