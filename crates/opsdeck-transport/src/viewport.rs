//! Shared window-change listener.
//!
//! Several terminal bridges may want to follow the local window size, but
//! only one listener should be installed per process. `ViewportRegistry`
//! counts acquisitions: the listener is installed when the count goes from
//! 0 to 1 and removed when it drops back to 0.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::{sync::watch, task::JoinHandle};

/// Local terminal size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub cols: u16,
    pub rows: u16,
}

impl Viewport {
    #[must_use]
    pub const fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }

    /// Whether the viewport is narrower than `breakpoint` columns.
    #[must_use]
    pub const fn is_compact(self, breakpoint: u16) -> bool {
        self.cols < breakpoint
    }
}

/// Where viewport changes come from.
pub trait ViewportSource: Send + Sync + 'static {
    /// Current size, if it can be determined.
    fn current(&self) -> Option<Viewport>;

    /// Spawn a listener that publishes every change into `tx` until aborted.
    fn install(&self, tx: watch::Sender<Viewport>) -> JoinHandle<()>;
}

struct Listener {
    count: usize,
    task: Option<JoinHandle<()>>,
}

struct Shared {
    source: Box<dyn ViewportSource>,
    listener: Mutex<Listener>,
    tx: watch::Sender<Viewport>,
}

/// Reference-counted owner of the single window-change listener.
#[derive(Clone)]
pub struct ViewportRegistry {
    shared: Arc<Shared>,
}

impl ViewportRegistry {
    /// Create a registry. `fallback` is reported until the source knows better.
    #[must_use]
    pub fn new(source: impl ViewportSource, fallback: Viewport) -> Self {
        let (tx, _) = watch::channel(fallback);
        Self {
            shared: Arc::new(Shared {
                source: Box::new(source),
                listener: Mutex::new(Listener {
                    count: 0,
                    task: None,
                }),
                tx,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Listener> {
        self.shared
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Start following the viewport. The listener is installed on the first
    /// acquisition; every acquisition refreshes the current size.
    ///
    /// # Panics
    /// The first acquisition panics if called outside a Tokio runtime.
    #[must_use]
    pub fn acquire(&self) -> ViewportGuard {
        {
            let mut listener = self.lock();
            if listener.count == 0 {
                tracing::debug!("installing viewport listener");
                listener.task = Some(self.shared.source.install(self.shared.tx.clone()));
            }
            listener.count += 1;
        }
        self.refresh();

        ViewportGuard {
            registry: self.clone(),
            rx: self.shared.tx.subscribe(),
            released: false,
        }
    }

    fn release(&self) {
        let mut listener = self.lock();
        match listener.count {
            0 => tracing::warn!("viewport registry released more often than acquired"),
            1 => {
                listener.count = 0;
                if let Some(task) = listener.task.take() {
                    tracing::debug!("removing viewport listener");
                    task.abort();
                }
            }
            _ => listener.count -= 1,
        }
    }

    fn refresh(&self) {
        if let Some(viewport) = self.shared.source.current() {
            self.shared.tx.send_if_modified(|current| {
                let changed = *current != viewport;
                *current = viewport;
                changed
            });
        }
    }

    /// Number of outstanding acquisitions.
    #[must_use]
    pub fn count(&self) -> usize {
        self.lock().count
    }

    /// Whether the listener is installed.
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.lock().task.is_some()
    }

    /// Last known viewport.
    #[must_use]
    pub fn current(&self) -> Viewport {
        *self.shared.tx.borrow()
    }
}

/// One acquisition of a [`ViewportRegistry`]. Released on drop.
pub struct ViewportGuard {
    registry: ViewportRegistry,
    rx: watch::Receiver<Viewport>,
    released: bool,
}

impl ViewportGuard {
    /// Last known viewport.
    #[must_use]
    pub fn viewport(&self) -> Viewport {
        *self.rx.borrow()
    }

    /// Wait for the next change.
    ///
    /// The guard keeps the registry alive, so this only returns `None` if the
    /// watch channel itself fails.
    pub async fn changed(&mut self) -> Option<Viewport> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }

    /// Release explicitly. Equivalent to dropping the guard.
    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            self.registry.release();
        }
    }
}

impl Drop for ViewportGuard {
    fn drop(&mut self) {
        self.release_once();
    }
}

/// Follows `SIGWINCH` and reads the size through crossterm.
#[cfg(all(unix, feature = "tui"))]
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowChangeSource;

#[cfg(all(unix, feature = "tui"))]
impl ViewportSource for WindowChangeSource {
    fn current(&self) -> Option<Viewport> {
        crossterm::terminal::size()
            .ok()
            .map(|(cols, rows)| Viewport::new(cols, rows))
    }

    fn install(&self, tx: watch::Sender<Viewport>) -> JoinHandle<()> {
        use tokio::signal::unix::{SignalKind, signal};

        tokio::spawn(async move {
            let mut signals = match signal(SignalKind::window_change()) {
                Ok(signals) => signals,
                Err(err) => {
                    tracing::warn!(%err, "failed to listen for window changes");
                    return;
                }
            };
            while signals.recv().await.is_some() {
                if let Ok((cols, rows)) = crossterm::terminal::size() {
                    let viewport = Viewport::new(cols, rows);
                    tx.send_if_modified(|current| {
                        let changed = *current != viewport;
                        *current = viewport;
                        changed
                    });
                }
            }
        })
    }
}
