//! One physical WebSocket per session.
//!
//! `Connection::connect` returns immediately; the handshake and all reads
//! happen in a spawned driver task that reports back through four callback
//! slots (open, message, close, error). Each `connect` gets a fresh
//! [`ConnectionId`]; once a connection is torn down its driver can no longer
//! change state or fire callbacks. Callbacks run one at a time, and the
//! currency check happens under the same lock that runs them.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread::{self, ThreadId},
    time::Duration,
};

use futures::{SinkExt, StreamExt};
use opsdeck_core::{
    ConnectionId, Envelope, Inbound, Session, SessionKind, SessionState, StreamError, envelope,
};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite::{self, Message};
use url::Url;

use crate::slot::CallbackSlot;

/// Reason reported when the remote end closes without one.
pub const DEFAULT_CLOSE_REASON: &str = "connection closed";

/// Reason reported when `disconnect` tears the connection down.
pub const LOCAL_CLOSE_REASON: &str = "closed by client";

const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

type OpenFn = dyn FnMut() + Send;
type MessageFn = dyn FnMut(Inbound) + Send;
type CloseFn = dyn FnMut(&str) + Send;
type ErrorFn = dyn FnMut(&StreamError) + Send;

#[derive(Default)]
struct Handlers {
    open: CallbackSlot<OpenFn>,
    message: CallbackSlot<MessageFn>,
    close: CallbackSlot<CloseFn>,
    error: CallbackSlot<ErrorFn>,
}

/// Handle to the live physical connection.
///
/// Dropping it closes the outbound channel and signals the driver to shut down.
struct Live {
    id: ConnectionId,
    outbound: mpsc::UnboundedSender<Message>,
    _shutdown: oneshot::Sender<()>,
}

struct Link {
    session: Session,
    live: Option<Live>,
}

impl Link {
    fn is_current(&self, id: ConnectionId) -> bool {
        self.live.as_ref().is_some_and(|live| live.id == id)
    }
}

enum Ended {
    Closed(String),
    Errored(StreamError),
}

struct Inner {
    link: Mutex<Link>,
    handlers: Handlers,
    /// Held while callbacks run, so they fire one at a time and never race
    /// a teardown.
    dispatch: Mutex<()>,
    /// Thread currently holding `dispatch`, for calls made from inside a
    /// callback.
    dispatcher: Mutex<Option<ThreadId>>,
    connected: watch::Sender<bool>,
    close_timeout: Duration,
}

/// Clears the dispatcher on drop, including when a callback panics.
struct Dispatching<'a> {
    inner: &'a Inner,
    _guard: MutexGuard<'a, ()>,
}

impl Drop for Dispatching<'_> {
    fn drop(&mut self) {
        *self.inner.dispatcher() = None;
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatcher(&self) -> MutexGuard<'_, Option<ThreadId>> {
        self.dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, id: ConnectionId) -> bool {
        self.lock().is_current(id)
    }

    /// Run `f` with callbacks serialized. Reentrant on the dispatching thread.
    fn dispatch<R>(&self, f: impl FnOnce() -> R) -> R {
        let me = thread::current().id();
        if *self.dispatcher() == Some(me) {
            return f();
        }
        let _dispatching = Dispatching {
            inner: self,
            _guard: self.dispatch.lock().unwrap_or_else(PoisonError::into_inner),
        };
        *self.dispatcher() = Some(me);
        f()
    }

    /// Handshake finished. Returns whether the connection is still wanted.
    fn opened(&self, id: ConnectionId) -> bool {
        self.dispatch(|| {
            {
                let mut link = self.lock();
                if !link.is_current(id) {
                    return;
                }
                link.session.state = SessionState::Connected;
                self.connected.send_replace(true);
                tracing::debug!(session = %link.session.id, connection = %id, "connected");
            }
            self.handlers.open.fire(|f| f());
        });
        self.is_current(id)
    }

    /// Route one inbound text frame. Returns whether to keep reading.
    fn deliver(&self, id: ConnectionId, raw: &str) -> bool {
        let inbound = match envelope::decode(raw) {
            Inbound::Unrecognized { kind } => {
                tracing::trace!(connection = %id, ?kind, "ignoring unrecognized envelope");
                return self.is_current(id);
            }
            Inbound::Envelope(Envelope::Closed { reason }) => {
                let reason = reason.unwrap_or_else(|| DEFAULT_CLOSE_REASON.to_owned());
                self.end(id, Ended::Closed(reason));
                return false;
            }
            Inbound::Envelope(Envelope::Error { message }) => {
                self.end(id, Ended::Errored(StreamError::remote(message)));
                return false;
            }
            inbound => inbound,
        };

        self.dispatch(|| {
            {
                let mut link = self.lock();
                if !link.is_current(id) {
                    tracing::trace!(connection = %id, "dropping frame from released connection");
                    return false;
                }
                if link.session.state == SessionState::Connected {
                    link.session.state = SessionState::Active;
                }
            }
            self.handlers.message.fire(|f| f(inbound));
            true
        }) && self.is_current(id)
    }

    /// Release the connection after a remote close or failure.
    fn end(&self, id: ConnectionId, ended: Ended) {
        self.dispatch(|| {
            {
                let mut link = self.lock();
                if !link.is_current(id) {
                    return;
                }
                link.live = None;
                link.session.state = match ended {
                    Ended::Closed(_) => SessionState::Closed,
                    Ended::Errored(_) => SessionState::Errored,
                };
                self.connected.send_replace(false);
            }

            match ended {
                Ended::Closed(reason) => {
                    tracing::debug!(connection = %id, %reason, "connection closed");
                    self.handlers.close.fire(|f| f(&reason));
                }
                Ended::Errored(err) => {
                    tracing::warn!(connection = %id, %err, "connection failed");
                    self.handlers.error.fire(|f| f(&err));
                }
            }
        });
    }
}

/// Client side of one streaming session.
///
/// At most one physical WebSocket is live at a time. Dropping the
/// `Connection` disconnects it.
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    /// Create a disconnected connection for a session of `kind`.
    #[must_use]
    pub fn new(kind: SessionKind) -> Self {
        Self::with_close_timeout(kind, DEFAULT_CLOSE_TIMEOUT)
    }

    /// Create a connection that waits at most `close_timeout` for a close
    /// frame to go out on teardown.
    #[must_use]
    pub fn with_close_timeout(kind: SessionKind, close_timeout: Duration) -> Self {
        let (connected, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                link: Mutex::new(Link {
                    session: Session::new(String::new(), kind),
                    live: None,
                }),
                handlers: Handlers::default(),
                dispatch: Mutex::new(()),
                dispatcher: Mutex::new(None),
                connected,
                close_timeout,
            }),
        }
    }

    /// Called once the handshake completes.
    pub fn on_open(&self, handler: impl FnMut() + Send + 'static) {
        self.inner.handlers.open.set(Box::new(handler));
    }

    /// Called for every delivered frame, in arrival order. `closed` and
    /// `error` envelopes and unrecognized envelopes are not delivered here.
    pub fn on_message(&self, handler: impl FnMut(Inbound) + Send + 'static) {
        self.inner.handlers.message.set(Box::new(handler));
    }

    /// Called when the connection closes, locally or remotely.
    pub fn on_close(&self, handler: impl FnMut(&str) + Send + 'static) {
        self.inner.handlers.close.set(Box::new(handler));
    }

    /// Called when the connection fails or the server reports an error.
    pub fn on_error(&self, handler: impl FnMut(&StreamError) + Send + 'static) {
        self.inner.handlers.error.set(Box::new(handler));
    }

    /// Open a connection to `url` for session `session_id`, closing any
    /// existing one first.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    pub fn connect(&self, session_id: &str, url: Url) {
        self.disconnect();

        let id = ConnectionId::new();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = oneshot::channel();
        {
            let mut link = self.inner.lock();
            link.session.id = session_id.to_owned();
            link.session.state = SessionState::Connecting;
            link.live = Some(Live {
                id,
                outbound,
                _shutdown: shutdown,
            });
        }

        tracing::debug!(
            session = %session_id,
            connection = %id,
            kind = ?self.kind(),
            %url,
            "connecting"
        );
        tokio::spawn(drive(
            Arc::clone(&self.inner),
            id,
            url,
            outbound_rx,
            shutdown_rx,
        ));
    }

    /// Release the connection. A no-op when nothing is connected.
    ///
    /// Waits for a callback running on another thread to return. On return
    /// the connected signal is false and no further callbacks from the
    /// released connection will fire, apart from the close callback this call
    /// itself fires.
    pub fn disconnect(&self) {
        self.inner.dispatch(|| {
            let released = {
                let mut link = self.inner.lock();
                let live = link.live.take();
                if live.is_some() {
                    link.session.state = SessionState::Closed;
                }
                self.inner.connected.send_replace(false);
                live
            };

            if let Some(live) = released {
                tracing::debug!(connection = %live.id, "disconnecting");
                drop(live);
                self.inner.handlers.close.fire(|f| f(LOCAL_CLOSE_REASON));
            }
        });
    }

    /// Send an envelope. Dropped silently unless the socket is open.
    ///
    /// Returns whether the envelope was queued.
    pub fn send(&self, envelope: &Envelope) -> bool {
        let link = self.inner.lock();
        match &link.live {
            Some(live) if link.session.state.is_open() => live
                .outbound
                .send(Message::text(envelope.encode()))
                .is_ok(),
            _ => {
                tracing::trace!(
                    kind = envelope.kind(),
                    state = %link.session.state,
                    "dropping send"
                );
                false
            }
        }
    }

    /// Mark the session finished. Only applies while the socket is open.
    pub fn mark_finished(&self) {
        let mut link = self.inner.lock();
        if link.session.state.is_open() {
            link.session.state = SessionState::Finished;
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.inner.lock().session.state
    }

    /// Snapshot of the session this connection serves.
    #[must_use]
    pub fn session(&self) -> Session {
        self.inner.lock().session.clone()
    }

    #[must_use]
    pub fn kind(&self) -> SessionKind {
        self.inner.lock().session.kind
    }

    /// Whether the socket is open.
    #[must_use]
    pub fn connected(&self) -> bool {
        *self.inner.connected.borrow()
    }

    /// Observe the connected signal.
    #[must_use]
    pub fn watch_connected(&self) -> watch::Receiver<bool> {
        self.inner.connected.subscribe()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Map a failed handshake to a session error.
fn handshake_error(err: tungstenite::Error) -> StreamError {
    if let tungstenite::Error::Http(response) = &err {
        if let Some(expired) = StreamError::from_http_status(response.status().as_u16()) {
            return expired;
        }
    }
    StreamError::Transport(err.to_string())
}

async fn drive(
    inner: Arc<Inner>,
    id: ConnectionId,
    url: Url,
    mut outbound_rx: mpsc::UnboundedReceiver<Message>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let ws = tokio::select! {
        result = tokio_tungstenite::connect_async(url.as_str()) => match result {
            Ok((ws, _response)) => ws,
            Err(err) => {
                inner.end(id, Ended::Errored(handshake_error(err)));
                return;
            }
        },
        _ = &mut shutdown_rx => {
            tracing::debug!(connection = %id, "handshake abandoned");
            return;
        }
    };

    let (mut sink, mut stream) = ws.split();

    if inner.opened(id) {
        loop {
            tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        if !inner.deliver(id, text.as_str()) {
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                        Ok(text) => {
                            if !inner.deliver(id, text) {
                                break;
                            }
                        }
                        Err(_) => {
                            tracing::trace!(connection = %id, "dropping non-UTF-8 binary frame");
                        }
                    },
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| f.reason.as_str().to_owned())
                            .filter(|reason| !reason.is_empty())
                            .unwrap_or_else(|| DEFAULT_CLOSE_REASON.to_owned());
                        inner.end(id, Ended::Closed(reason));
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        inner.end(id, Ended::Errored(StreamError::Transport(err.to_string())));
                        break;
                    }
                    None => {
                        inner.end(id, Ended::Closed(DEFAULT_CLOSE_REASON.to_owned()));
                        break;
                    }
                },
                outbound = outbound_rx.recv() => match outbound {
                    Some(message) => {
                        if let Err(err) = sink.send(message).await {
                            inner.end(id, Ended::Errored(StreamError::Transport(err.to_string())));
                            break;
                        }
                    }
                    None => break,
                },
                _ = &mut shutdown_rx => break,
            }
        }
    }

    if tokio::time::timeout(inner.close_timeout, sink.close())
        .await
        .is_err()
    {
        tracing::debug!(connection = %id, "close frame timed out");
    }
    tracing::trace!(connection = %id, "driver finished");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use axum::{
        Router,
        extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        response::IntoResponse,
        routing::get,
    };
    use tokio::net::TcpListener;
    use tokio_test::assert_ok;

    use super::*;

    /// Serve one WebSocket route that runs `script` per connection.
    async fn serve<F, Fut>(script: F) -> Url
    where
        F: Fn(WebSocket) -> Fut + Clone + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let app = Router::new().route(
            "/ws",
            get(move |ws: WebSocketUpgrade| {
                let script = script.clone();
                async move { ws.on_upgrade(script).into_response() }
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Url::parse(&format!("ws://{addr}/ws")).unwrap()
    }

    async fn wait_for(rx: &mut watch::Receiver<bool>, value: bool) {
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|v| *v == value))
            .await
            .expect("timed out waiting for connected signal")
            .unwrap();
    }

    #[tokio::test]
    async fn test_delivers_frames_in_order() {
        let url = serve(|mut socket: WebSocket| async move {
            for frame in [r#"{"type":"output","data":"a"}"#, r#"{"type":"pong"}"#, "plain"] {
                socket.send(WsMessage::Text(frame.into())).await.unwrap();
            }
            socket
                .send(WsMessage::Text(r#"{"type":"closed","reason":"done"}"#.into()))
                .await
                .unwrap();
        })
        .await;

        let connection = Connection::new(SessionKind::Task);
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        connection.on_message(move |inbound| sink.lock().unwrap().push(inbound));
        let (close_tx, close_rx) = oneshot::channel();
        let mut close_tx = Some(close_tx);
        connection.on_close(move |reason| {
            if let Some(tx) = close_tx.take() {
                let _ = tx.send(reason.to_owned());
            }
        });

        connection.connect("t1", url);
        let reason = tokio::time::timeout(Duration::from_secs(5), close_rx)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(reason, "done");
        assert_eq!(connection.state(), SessionState::Closed);
        assert!(!connection.connected());
        assert_eq!(
            *received.lock().unwrap(),
            vec![
                Inbound::Envelope(Envelope::Output { data: "a".into() }),
                Inbound::RawText("plain".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_error_envelope_errors_connection() {
        let url = serve(|mut socket: WebSocket| async move {
            socket
                .send(WsMessage::Text(r#"{"type":"error"}"#.into()))
                .await
                .unwrap();
        })
        .await;

        let connection = Connection::new(SessionKind::Terminal);
        let (tx, rx) = oneshot::channel();
        let mut tx = Some(tx);
        connection.on_error(move |err| {
            if let Some(tx) = tx.take() {
                let _ = tx.send(err.clone());
            }
        });
        connection.connect("web-01", url);

        let err = tokio::time::timeout(Duration::from_secs(5), rx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(err, StreamError::remote(None));
        assert_eq!(connection.state(), SessionState::Errored);
    }

    #[tokio::test]
    async fn test_send_reaches_server() {
        let (seen_tx, seen_rx) = mpsc::unbounded_channel::<String>();
        let url = serve(move |mut socket: WebSocket| {
            let seen_tx = seen_tx.clone();
            async move {
                while let Some(Ok(WsMessage::Text(text))) = socket.recv().await {
                    let _ = seen_tx.send(text.as_str().to_owned());
                }
            }
        })
        .await;

        let connection = Connection::new(SessionKind::Terminal);
        assert!(!connection.send(&Envelope::Resize { cols: 1, rows: 1 }));

        let mut connected = connection.watch_connected();
        connection.connect("web-01", url);
        wait_for(&mut connected, true).await;

        assert!(connection.send(&Envelope::Resize { cols: 100, rows: 30 }));
        let mut seen_rx = seen_rx;
        let frame = tokio::time::timeout(Duration::from_secs(5), seen_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            envelope::decode(&frame),
            Inbound::Envelope(Envelope::Resize { cols: 100, rows: 30 })
        );
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let url = serve(|mut socket: WebSocket| async move {
            while socket.recv().await.is_some() {}
        })
        .await;

        let connection = Connection::new(SessionKind::Task);
        let closes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&closes);
        connection.on_close(move |reason| {
            assert_eq!(reason, LOCAL_CLOSE_REASON);
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let mut connected = connection.watch_connected();
        connection.connect("t1", url);
        wait_for(&mut connected, true).await;

        connection.disconnect();
        assert!(!connection.connected());
        assert_eq!(connection.state(), SessionState::Closed);

        connection.disconnect();
        assert!(!connection.connected());
        assert_eq!(connection.state(), SessionState::Closed);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disconnect_while_connecting() {
        // Accepts TCP but never answers the handshake.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let connection = Connection::new(SessionKind::Terminal);
        let opened = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&opened);
        connection.on_open(move || flag.store(true, Ordering::SeqCst));

        connection.connect("web-01", Url::parse(&format!("ws://{addr}/ws")).unwrap());
        assert_eq!(connection.state(), SessionState::Connecting);

        connection.disconnect();
        assert_eq!(connection.state(), SessionState::Closed);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!opened.load(Ordering::SeqCst));
        assert!(!connection.connected());
    }

    #[tokio::test]
    async fn test_refused_connection_errors() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let connection = Connection::new(SessionKind::Task);
        let (tx, rx) = oneshot::channel();
        let mut tx = Some(tx);
        connection.on_error(move |err| {
            if let Some(tx) = tx.take() {
                let _ = tx.send(err.clone());
            }
        });
        connection.connect("t1", Url::parse(&format!("ws://{addr}/ws")).unwrap());

        let err = assert_ok!(assert_ok!(tokio::time::timeout(Duration::from_secs(5), rx).await));
        assert!(matches!(err, StreamError::Transport(_)));
        assert_eq!(connection.state(), SessionState::Errored);
    }

    #[tokio::test]
    async fn test_reconnect_replaces_previous_connection() {
        let url = serve(|mut socket: WebSocket| async move {
            while socket.recv().await.is_some() {}
        })
        .await;

        let connection = Connection::new(SessionKind::Terminal);
        let opens = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&opens);
        connection.on_open(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let mut connected = connection.watch_connected();
        connection.connect("web-01", url.clone());
        wait_for(&mut connected, true).await;
        connection.connect("web-01", url);
        assert!(!connection.connected());
        wait_for(&mut connected, true).await;

        assert_eq!(opens.load(Ordering::SeqCst), 2);
        assert_eq!(connection.session().id, "web-01");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_reconnect_waits_for_running_callback() {
        let accepted = Arc::new(AtomicUsize::new(0));
        let url = serve(move |mut socket: WebSocket| {
            let n = accepted.fetch_add(1, Ordering::SeqCst);
            async move {
                let frame = format!(r#"{{"type":"output","data":"conn{n}"}}"#);
                socket.send(WsMessage::Text(frame.into())).await.unwrap();
                while socket.recv().await.is_some() {}
            }
        })
        .await;

        let connection = Connection::new(SessionKind::Task);
        let received = Arc::new(Mutex::new(Vec::new()));
        let entered = Arc::new(AtomicBool::new(false));
        let (sink, flag) = (Arc::clone(&received), Arc::clone(&entered));
        connection.on_message(move |inbound| {
            let Inbound::Envelope(Envelope::Output { data }) = inbound else {
                return;
            };
            if data == "conn0" {
                flag.store(true, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(300));
            }
            sink.lock().unwrap().push(data);
        });

        connection.connect("t1", url.clone());
        tokio::time::timeout(Duration::from_secs(5), async {
            while !entered.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        // The first connection's callback is mid-flight on another worker.
        connection.connect("t1", url);
        assert_eq!(*received.lock().unwrap(), vec!["conn0"]);

        tokio::time::timeout(Duration::from_secs(5), async {
            while received.lock().unwrap().len() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(*received.lock().unwrap(), vec!["conn0", "conn1"]);
        assert_eq!(connection.state(), SessionState::Active);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_disconnect_from_inside_a_callback() {
        let url = serve(|mut socket: WebSocket| async move {
            socket
                .send(WsMessage::Text(r#"{"type":"output","data":"bye"}"#.into()))
                .await
                .unwrap();
            while socket.recv().await.is_some() {}
        })
        .await;

        let connection = Arc::new(Connection::new(SessionKind::Terminal));
        let weak = Arc::downgrade(&connection);
        connection.on_message(move |_| {
            if let Some(connection) = weak.upgrade() {
                connection.disconnect();
            }
        });
        let (tx, rx) = oneshot::channel();
        let mut tx = Some(tx);
        connection.on_close(move |reason| {
            if let Some(tx) = tx.take() {
                let _ = tx.send(reason.to_owned());
            }
        });

        connection.connect("web-01", url);
        let reason = assert_ok!(assert_ok!(tokio::time::timeout(Duration::from_secs(5), rx).await));
        assert_eq!(reason, LOCAL_CLOSE_REASON);
        assert_eq!(connection.state(), SessionState::Closed);
    }
}
