//! A single replaceable callback.

use std::sync::{Mutex, MutexGuard, PoisonError};

struct State<F: ?Sized> {
    handler: Option<Box<F>>,
    version: u64,
}

/// Holds at most one callback. Registering replaces the previous one.
///
/// The callback is taken out of the slot while it runs, so it may register,
/// clear, or trigger other slots without deadlocking. A replacement made
/// while it runs wins over the running callback.
pub struct CallbackSlot<F: ?Sized> {
    state: Mutex<State<F>>,
}

impl<F: ?Sized> Default for CallbackSlot<F> {
    fn default() -> Self {
        Self {
            state: Mutex::new(State {
                handler: None,
                version: 0,
            }),
        }
    }
}

impl<F: ?Sized> CallbackSlot<F> {
    /// Create an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State<F>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a callback, replacing any previous one.
    pub fn set(&self, handler: Box<F>) {
        let mut state = self.lock();
        state.handler = Some(handler);
        state.version = state.version.wrapping_add(1);
    }

    /// Remove the callback.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.handler = None;
        state.version = state.version.wrapping_add(1);
    }

    /// Whether a callback is registered.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.lock().handler.is_some()
    }

    /// Invoke the callback, if any. Returns whether it ran.
    pub fn fire(&self, call: impl FnOnce(&mut F)) -> bool {
        let (mut handler, version) = {
            let mut state = self.lock();
            match state.handler.take() {
                Some(handler) => (handler, state.version),
                None => return false,
            }
        };

        call(&mut *handler);

        let mut state = self.lock();
        if state.version == version {
            state.handler = Some(handler);
        }
        true
    }
}
