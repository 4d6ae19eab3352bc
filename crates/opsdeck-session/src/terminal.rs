//! Byte-level terminal I/O over a streaming session.

use std::sync::Arc;

use bytes::Bytes;
use opsdeck_core::{
    ClientConfig, Endpoint, Envelope, Inbound, SessionKind, SessionState, StreamError,
    wire::{self, DecodeError},
};
use opsdeck_transport::{CallbackSlot, Connection};
use tokio::sync::watch;

/// Which way a frame travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Server to client.
    Inbound,
    /// Client to server.
    Outbound,
}

/// One terminal chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalFrame {
    /// Output from the remote terminal.
    Data(Bytes),
    /// Keystrokes for the remote terminal.
    Input(Bytes),
    /// New viewport size.
    Resize { cols: u16, rows: u16 },
}

impl TerminalFrame {
    #[must_use]
    pub const fn direction(&self) -> Direction {
        match self {
            Self::Data(_) => Direction::Inbound,
            Self::Input(_) | Self::Resize { .. } => Direction::Outbound,
        }
    }

    /// Extract a frame from an envelope.
    ///
    /// Returns `None` for envelopes that don't carry terminal data.
    pub fn from_envelope(envelope: &Envelope) -> Option<Result<Self, DecodeError>> {
        let frame = match envelope {
            Envelope::Output { data } => wire::from_wire(data).map(|b| Self::Data(b.into())),
            Envelope::Input { data } => wire::from_wire(data).map(|b| Self::Input(b.into())),
            Envelope::Resize { cols, rows } => Ok(Self::Resize {
                cols: *cols,
                rows: *rows,
            }),
            _ => return None,
        };
        Some(frame)
    }

    #[must_use]
    pub fn to_envelope(&self) -> Envelope {
        match self {
            Self::Data(data) => Envelope::output_bytes(data),
            Self::Input(data) => Envelope::input(data),
            Self::Resize { cols, rows } => Envelope::Resize {
                cols: *cols,
                rows: *rows,
            },
        }
    }
}

#[derive(Default)]
struct Callbacks {
    data: CallbackSlot<dyn FnMut(Bytes) + Send>,
    connected: CallbackSlot<dyn FnMut() + Send>,
    closed: CallbackSlot<dyn FnMut(&str) + Send>,
    error: CallbackSlot<dyn FnMut(&StreamError) + Send>,
}

/// Interactive terminal on a remote host.
///
/// One callback of each kind can be registered; registering again replaces
/// the previous one. Dropping the bridge disconnects it.
pub struct TerminalBridge {
    endpoint: Endpoint,
    host: String,
    connection: Connection,
    callbacks: Arc<Callbacks>,
}

impl TerminalBridge {
    /// Create a disconnected bridge for `host`.
    #[must_use]
    pub fn new(endpoint: Endpoint, host: impl Into<String>) -> Self {
        Self::with_config(endpoint, host, &ClientConfig::default())
    }

    /// Create a disconnected bridge using the close timeout from `config`.
    #[must_use]
    pub fn with_config(endpoint: Endpoint, host: impl Into<String>, config: &ClientConfig) -> Self {
        let connection =
            Connection::with_close_timeout(SessionKind::Terminal, config.close_timeout());
        let callbacks = Arc::new(Callbacks::default());

        let route = Arc::clone(&callbacks);
        connection.on_message(move |inbound| match inbound {
            Inbound::Envelope(envelope @ Envelope::Output { .. }) => {
                match TerminalFrame::from_envelope(&envelope) {
                    Some(Ok(TerminalFrame::Data(bytes))) => {
                        route.data.fire(|f| f(bytes));
                    }
                    Some(Err(err)) => tracing::warn!(%err, "dropping undecodable terminal output"),
                    _ => {}
                }
            }
            Inbound::Envelope(Envelope::Connected) => {
                route.connected.fire(|f| f());
            }
            Inbound::Envelope(other) => {
                tracing::trace!(kind = other.kind(), "ignoring envelope on terminal");
            }
            Inbound::RawText(_) | Inbound::Unrecognized { .. } => {
                tracing::trace!("ignoring non-protocol frame on terminal");
            }
        });
        let route = Arc::clone(&callbacks);
        connection.on_close(move |reason| {
            route.closed.fire(|f| f(reason));
        });
        let route = Arc::clone(&callbacks);
        connection.on_error(move |err| {
            route.error.fire(|f| f(err));
        });

        Self {
            endpoint,
            host: host.into(),
            connection,
            callbacks,
        }
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Open the terminal with an initial size, replacing any open one.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    pub fn connect(&self, cols: u16, rows: u16) {
        let url = self.endpoint.terminal(&self.host, cols, rows);
        tracing::info!(host = %self.host, cols, rows, "opening terminal");
        self.connection.connect(&self.host, url);
    }

    pub fn disconnect(&self) {
        self.connection.disconnect();
    }

    /// Send keystrokes. Dropped unless the terminal is open.
    pub fn send_input(&self, data: &[u8]) -> bool {
        self.send_frame(&TerminalFrame::Input(Bytes::copy_from_slice(data)))
    }

    /// Send text as keystrokes. Dropped unless the terminal is open.
    pub fn send_text(&self, text: &str) -> bool {
        self.send_input(text.as_bytes())
    }

    /// Tell the server about a new viewport size. Dropped unless the
    /// terminal is open.
    pub fn send_resize(&self, cols: u16, rows: u16) -> bool {
        self.send_frame(&TerminalFrame::Resize { cols, rows })
    }

    fn send_frame(&self, frame: &TerminalFrame) -> bool {
        self.connection.send(&frame.to_envelope())
    }

    /// Called with each chunk of terminal output, in order.
    pub fn on_data(&self, handler: impl FnMut(Bytes) + Send + 'static) {
        self.callbacks.data.set(Box::new(handler));
    }

    /// Called when the server reports the remote shell is ready.
    pub fn on_connected(&self, handler: impl FnMut() + Send + 'static) {
        self.callbacks.connected.set(Box::new(handler));
    }

    /// Called with a human-readable reason when the terminal closes.
    pub fn on_closed(&self, handler: impl FnMut(&str) + Send + 'static) {
        self.callbacks.closed.set(Box::new(handler));
    }

    /// Called when the terminal fails. `StreamError::SessionExpired` means the
    /// credentials must be renewed.
    pub fn on_error(&self, handler: impl FnMut(&StreamError) + Send + 'static) {
        self.callbacks.error.set(Box::new(handler));
    }

    /// Whether the socket is open.
    #[must_use]
    pub fn connected(&self) -> bool {
        self.connection.connected()
    }

    #[must_use]
    pub fn watch_connected(&self) -> watch::Receiver<bool> {
        self.connection.watch_connected()
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.connection.state()
    }
}
