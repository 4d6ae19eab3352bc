//! Task output aggregation.
//!
//! Frames are appended to an internal log as they arrive. A reconcile loop
//! publishes the log's growth on a fixed cadence, so bursts of output show
//! up as one update. Once the server reports a status or an error the
//! stream is finished and nothing more is appended.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use opsdeck_core::{
    ClientConfig, Endpoint, Envelope, Inbound, LaunchError, SessionKind, SessionState,
    StreamError, TaskLauncher,
};
use opsdeck_transport::Connection;
use serde_json::Value;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tokio_stream::wrappers::WatchStream;

/// Prefix of the synthetic line appended when a task stream fails.
pub const ERROR_PREFIX: &str = "ERROR: ";

/// What a consumer sees of a task stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskSnapshot {
    /// Task being streamed.
    pub task_id: Option<String>,
    /// Output units in arrival order.
    pub lines: Vec<String>,
    /// Final status reported by the server.
    pub status: Option<String>,
    /// Exit code reported alongside the status.
    pub exit_code: Option<i64>,
    /// Set once; never cleared for the same task.
    pub finished: bool,
    /// Started and not yet finished.
    pub running: bool,
    /// Set when the stream ended on an error that must be escalated.
    pub failure: Option<StreamError>,
}

/// Everything received for one task, before reconciliation.
#[derive(Debug, Default)]
struct TaskLog {
    messages: Vec<String>,
    status: Option<String>,
    exit_code: Option<i64>,
    finished: bool,
    failure: Option<StreamError>,
}

impl TaskLog {
    fn on_message(&mut self, inbound: Inbound) {
        if self.finished {
            return;
        }
        match inbound {
            Inbound::Envelope(Envelope::Output { data }) => self.messages.push(data),
            Inbound::RawText(text) => self.messages.push(text),
            Inbound::Envelope(Envelope::Status { status, exit_code }) => {
                self.status = Some(status);
                self.exit_code = exit_code;
                self.finished = true;
            }
            Inbound::Envelope(other) => {
                tracing::trace!(kind = other.kind(), "ignoring envelope on task stream");
            }
            Inbound::Unrecognized { .. } => {}
        }
    }

    fn on_error(&mut self, err: &StreamError) {
        if self.finished {
            return;
        }
        if err.is_session_expired() {
            self.failure = Some(err.clone());
        } else {
            self.messages.push(format!("{ERROR_PREFIX}{err}"));
        }
        self.finished = true;
    }

    fn on_close(&mut self, reason: &str) {
        if self.finished {
            return;
        }
        self.messages.push(format!("{ERROR_PREFIX}{reason}"));
        self.finished = true;
    }

    /// Copy growth and the finish latch into `snapshot`. Returns whether
    /// anything changed.
    fn publish(&self, snapshot: &mut TaskSnapshot) -> bool {
        let mut changed = false;
        if self.messages.len() > snapshot.lines.len() {
            snapshot
                .lines
                .extend_from_slice(&self.messages[snapshot.lines.len()..]);
            changed = true;
        }
        if self.finished && !snapshot.finished {
            snapshot.status.clone_from(&self.status);
            snapshot.exit_code = self.exit_code;
            snapshot.failure.clone_from(&self.failure);
            snapshot.finished = true;
            snapshot.running = false;
            changed = true;
        }
        changed
    }
}

fn lock(log: &Mutex<TaskLog>) -> MutexGuard<'_, TaskLog> {
    log.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Streams the output of one task at a time.
///
/// Dropping the stream disconnects it.
pub struct TaskStream {
    endpoint: Endpoint,
    reconcile_interval: Duration,
    connection: Arc<Connection>,
    log: Arc<Mutex<TaskLog>>,
    snapshot: watch::Sender<TaskSnapshot>,
    reconciler: Option<JoinHandle<()>>,
}

impl TaskStream {
    /// Create an idle stream with default settings.
    #[must_use]
    pub fn new(endpoint: Endpoint) -> Self {
        Self::with_config(endpoint, &ClientConfig::default())
    }

    /// Create an idle stream using the cadence and close timeout from `config`.
    #[must_use]
    pub fn with_config(endpoint: Endpoint, config: &ClientConfig) -> Self {
        let (snapshot, _) = watch::channel(TaskSnapshot::default());
        Self {
            endpoint,
            reconcile_interval: config.reconcile_interval(),
            connection: Arc::new(Connection::with_close_timeout(
                SessionKind::Task,
                config.close_timeout(),
            )),
            log: Arc::new(Mutex::new(TaskLog::default())),
            snapshot,
            reconciler: None,
        }
    }

    /// Start a task on the server and stream its output.
    ///
    /// # Errors
    /// Returns the launcher's error. `LaunchError::SessionExpired` means the
    /// credentials must be renewed before anything else can succeed.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    pub async fn launch<L>(
        &mut self,
        launcher: &L,
        path: &str,
        body: Option<&Value>,
    ) -> Result<String, LaunchError>
    where
        L: TaskLauncher + ?Sized,
    {
        self.reset(None);

        let ticket = match launcher.launch(path, body).await {
            Ok(ticket) => ticket,
            Err(err) => {
                tracing::warn!(%path, %err, "failed to launch task");
                self.snapshot.send_modify(|snapshot| snapshot.running = false);
                return Err(err);
            }
        };

        tracing::info!(%path, task_id = %ticket.task_id, "task launched");
        self.start(&ticket.task_id);
        Ok(ticket.task_id)
    }

    /// Stream the output of `task_id`, discarding whatever was streamed before.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    pub fn start(&mut self, task_id: &str) {
        let log = self.reset(Some(task_id));
        self.connection
            .connect(task_id, self.endpoint.task_stream(task_id));

        self.reconciler = Some(tokio::spawn(reconcile(
            log,
            Arc::clone(&self.connection),
            self.snapshot.clone(),
            self.reconcile_interval,
        )));
    }

    /// Tear down the previous task and point the handlers at a fresh log.
    fn reset(&mut self, task_id: Option<&str>) -> Arc<Mutex<TaskLog>> {
        if let Some(reconciler) = self.reconciler.take() {
            reconciler.abort();
        }
        // Handlers still point at the previous log here.
        self.connection.disconnect();

        let log = Arc::new(Mutex::new(TaskLog::default()));
        let target = Arc::clone(&log);
        self.connection
            .on_message(move |inbound| lock(&target).on_message(inbound));
        let target = Arc::clone(&log);
        self.connection
            .on_error(move |err| lock(&target).on_error(err));
        let target = Arc::clone(&log);
        self.connection
            .on_close(move |reason| lock(&target).on_close(reason));
        self.log = Arc::clone(&log);

        self.snapshot.send_replace(TaskSnapshot {
            task_id: task_id.map(str::to_owned),
            running: true,
            ..TaskSnapshot::default()
        });
        log
    }

    /// Close the connection. The stream finishes with a synthetic error
    /// line if the task had not finished yet.
    pub fn disconnect(&self) {
        self.connection.disconnect();
    }

    /// Latest published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> TaskSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Published output lines.
    #[must_use]
    pub fn output(&self) -> Vec<String> {
        self.snapshot.borrow().lines.clone()
    }

    #[must_use]
    pub fn status(&self) -> Option<String> {
        self.snapshot.borrow().status.clone()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.snapshot.borrow().finished
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.snapshot.borrow().running
    }

    /// Whether the underlying socket is open.
    #[must_use]
    pub fn connected(&self) -> bool {
        self.connection.connected()
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.connection.state()
    }

    /// Observe published snapshots.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<TaskSnapshot> {
        self.snapshot.subscribe()
    }

    /// Published snapshots as a stream, starting with the current one.
    #[must_use]
    pub fn updates(&self) -> WatchStream<TaskSnapshot> {
        WatchStream::new(self.snapshot.subscribe())
    }

    /// Wait until the task finishes and return the final snapshot.
    ///
    /// Waits forever if no task was started.
    ///
    /// # Errors
    /// Returns the escalated error if the session expired mid-stream.
    pub async fn wait(&self) -> Result<TaskSnapshot, StreamError> {
        let mut rx = self.snapshot.subscribe();
        let snapshot = rx
            .wait_for(|snapshot| snapshot.finished)
            .await
            .map_err(|_| StreamError::Transport("task stream dropped".to_owned()))?
            .clone();
        match snapshot.failure {
            Some(err) => Err(err),
            None => Ok(snapshot),
        }
    }
}

impl Drop for TaskStream {
    fn drop(&mut self) {
        if let Some(reconciler) = self.reconciler.take() {
            reconciler.abort();
        }
        self.connection.disconnect();
    }
}

async fn reconcile(
    log: Arc<Mutex<TaskLog>>,
    connection: Arc<Connection>,
    snapshot: watch::Sender<TaskSnapshot>,
    period: Duration,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let finished = {
            let log = lock(&log);
            snapshot.send_if_modified(|current| log.publish(current));
            log.finished
        };
        if finished {
            connection.mark_finished();
            let current = snapshot.borrow();
            tracing::debug!(
                task_id = current.task_id.as_deref().unwrap_or_default(),
                lines = current.lines.len(),
                status = current.status.as_deref().unwrap_or_default(),
                "task stream finished"
            );
            break;
        }
    }
}
