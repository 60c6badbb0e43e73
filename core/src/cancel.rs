//! Caller-driven cancellation.
//!
//! A `CancelToken` travels inside the request descriptor; its paired
//! `Canceler` stays with the caller. Cancelling resolves the token once and
//! wakes every listener with the same `Cancel` reason. Later calls to
//! `Canceler::cancel` are ignored.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use futures::channel::oneshot;

/// The reason a request was cancelled. Surfaced verbatim to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Cancel {
    pub message: Option<String>,
}

impl Cancel {
    pub fn new(message: Option<String>) -> Self {
        Self { message }
    }
}

impl fmt::Display for Cancel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "Cancel: {message}"),
            None => write!(f, "Cancel"),
        }
    }
}

type Listener = Box<dyn FnOnce(Cancel) + Send>;

/// Identifies one `subscribe` call so it can be withdrawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerKey(u64);

#[derive(Default)]
struct State {
    reason: Option<Cancel>,
    next_key: u64,
    listeners: Vec<(ListenerKey, Listener)>,
}

/// Read side of a cancellation pair. Cheap to clone; all clones observe the
/// same reason.
#[derive(Clone)]
pub struct CancelToken {
    state: Arc<Mutex<State>>,
}

/// Write side of a cancellation pair.
#[derive(Clone)]
pub struct Canceler {
    state: Arc<Mutex<State>>,
}

impl CancelToken {
    /// Create a linked token and canceler.
    pub fn source() -> (CancelToken, Canceler) {
        let state = Arc::new(Mutex::new(State::default()));
        (
            CancelToken {
                state: Arc::clone(&state),
            },
            Canceler { state },
        )
    }

    pub fn reason(&self) -> Option<Cancel> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reason
            .clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }

    /// `Err` with the reason once cancellation has been requested.
    pub fn throw_if_requested(&self) -> Result<(), Cancel> {
        match self.reason() {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }

    /// Run `listener` once with the reason. Runs immediately on the calling
    /// thread when the token is already cancelled.
    ///
    /// A token shared by many requests outlives each of them, so callers
    /// withdraw listeners they no longer need with `unsubscribe`.
    pub fn subscribe(&self, listener: impl FnOnce(Cancel) + Send + 'static) -> ListenerKey {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let key = ListenerKey(state.next_key);
        state.next_key += 1;
        match state.reason.clone() {
            Some(reason) => {
                drop(state);
                listener(reason);
            }
            None => state.listeners.push((key, Box::new(listener))),
        }
        key
    }

    /// Drop the listener registered under `key`. `false` if it already ran
    /// or was withdrawn.
    pub fn unsubscribe(&self, key: ListenerKey) -> bool {
        let removed = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state
                .listeners
                .iter()
                .position(|(k, _)| *k == key)
                .map(|index| state.listeners.swap_remove(index))
        };
        removed.is_some()
    }

    #[cfg(test)]
    pub(crate) fn listener_count(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .listeners
            .len()
    }

    /// Future resolving with the reason. Stays pending forever if every
    /// canceler and token is dropped without cancelling.
    pub fn cancelled(&self) -> impl Future<Output = Cancel> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        // Never withdrawn; the future exists to wait for the reason.
        self.subscribe(move |reason| {
            let _ = tx.send(reason);
        });
        async move {
            match rx.await {
                Ok(reason) => reason,
                Err(_) => futures::future::pending().await,
            }
        }
    }
}

impl Canceler {
    /// Resolve the token. Returns `false` if it was already cancelled.
    pub fn cancel(&self, message: Option<String>) -> bool {
        let (reason, listeners) = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.reason.is_some() {
                return false;
            }
            let reason = Cancel::new(message);
            state.reason = Some(reason.clone());
            (reason, std::mem::take(&mut state.listeners))
        };
        tracing::debug!(reason = %reason, listeners = listeners.len(), "cancellation requested");
        for (_, listener) in listeners {
            listener(reason.clone());
        }
        true
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("reason", &self.reason())
            .finish()
    }
}

impl fmt::Debug for Canceler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Canceler").finish_non_exhaustive()
    }
}
