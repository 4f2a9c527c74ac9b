//! Readiness gate for the catalog source.
//!
//! ```text
//!   Uninitialized ──► Initializing ──► Initialized
//!                                 └──► Error
//! ```
//!
//! Callers register with [`ReadinessGate::when_ready`].  Once the gate reaches
//! a terminal state every queued callback is drained under the lock and then
//! invoked exactly once, outside the lock.  Registrations that arrive after
//! that point run synchronously on the caller.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    Uninitialized,
    Initializing,
    Initialized,
    /// The source could not reach a usable state at all.
    Error,
}

impl SourceState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SourceState::Initialized | SourceState::Error)
    }
}

type ReadyCallback = Box<dyn FnOnce(bool) + Send + 'static>;

struct GateInner {
    state: SourceState,
    waiters: Vec<ReadyCallback>,
}

pub struct ReadinessGate {
    inner: Mutex<GateInner>,
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessGate {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(GateInner {
                state: SourceState::Uninitialized,
                waiters: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> SourceState {
        self.lock().state
    }

    /// Run `callback` with `true` once the source is initialized, or `false`
    /// if it ended in `Error`.
    ///
    /// Returns `true` when the callback already ran on this thread, `false`
    /// when it was queued and will run when the source settles.
    pub fn when_ready<F>(&self, callback: F) -> bool
    where
        F: FnOnce(bool) + Send + 'static,
    {
        let mut inner = self.lock();
        match inner.state {
            SourceState::Uninitialized | SourceState::Initializing => {
                inner.waiters.push(Box::new(callback));
                debug!("readiness: queued waiter ({} pending)", inner.waiters.len());
                false
            }
            state => {
                drop(inner);
                callback(state == SourceState::Initialized);
                true
            }
        }
    }

    /// Await readiness.  Resolves to the same flag `when_ready` would pass.
    pub async fn ready(&self) -> bool {
        let (tx, rx) = oneshot::channel();
        self.when_ready(move |ok| {
            let _ = tx.send(ok);
        });
        rx.await.unwrap_or(false)
    }

    /// Move to `state`.  Terminal states are final: later transitions are
    /// ignored and `false` is returned.
    pub fn set_state(&self, state: SourceState) -> bool {
        let waiters = {
            let mut inner = self.lock();
            if inner.state.is_terminal() {
                debug!(
                    "readiness: ignoring {:?} after terminal {:?}",
                    state, inner.state
                );
                return false;
            }
            inner.state = state;
            if state.is_terminal() {
                std::mem::take(&mut inner.waiters)
            } else {
                Vec::new()
            }
        };

        let success = state == SourceState::Initialized;
        if !waiters.is_empty() {
            debug!("readiness: releasing {} waiters (success={})", waiters.len(), success);
        }
        for waiter in waiters {
            waiter(success);
        }
        true
    }
}
