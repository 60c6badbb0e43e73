//! Claim-once cells shared between the host callbacks and the cancellation
//! listener.
//!
//! # Design
//! Three triggers race to finish a request: host success, host failure and
//! caller cancellation. Whichever claims first proceeds; the others observe
//! the claim and do nothing. A mutex makes the claim atomic, so hosts may
//! deliver callbacks from any thread.

use std::sync::{Arc, Mutex, PoisonError};

use crate::cancel::{CancelToken, ListenerKey};
use crate::error::AdapterError;
use crate::response::Response;

pub type Outcome = Result<Response, AdapterError>;

enum Slot<T> {
    /// Host not invoked yet, or invoked but its task not returned yet.
    Pending,
    Live(T),
    Settled,
}

/// The live host task, cleared once the request is over.
pub(crate) struct TaskSlot<T> {
    slot: Mutex<Slot<T>>,
}

impl<T> TaskSlot<T> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            slot: Mutex::new(Slot::Pending),
        })
    }

    /// Store the task the host returned. If the host already completed
    /// synchronously the task is dropped.
    pub(crate) fn install(&self, task: T) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(*slot, Slot::Pending) {
            *slot = Slot::Live(task);
        }
    }

    /// Mark the request finished by the host. `false` if something else
    /// finished it first.
    pub(crate) fn finish(&self) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        !matches!(std::mem::replace(&mut *slot, Slot::Settled), Slot::Settled)
    }

    /// Take the live task for aborting. `None` when there is no live task;
    /// a pending slot stays pending.
    pub(crate) fn claim(&self) -> Option<T> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        match std::mem::replace(&mut *slot, Slot::Settled) {
            Slot::Live(task) => Some(task),
            Slot::Pending => {
                *slot = Slot::Pending;
                None
            }
            Slot::Settled => None,
        }
    }
}

type OnComplete = Box<dyn FnOnce(Outcome) + Send>;

/// The resolve/reject contract: the first outcome wins.
pub(crate) struct Completion {
    on_complete: Mutex<Option<OnComplete>>,
}

impl Completion {
    pub(crate) fn new(on_complete: impl FnOnce(Outcome) + Send + 'static) -> Arc<Self> {
        Arc::new(Self {
            on_complete: Mutex::new(Some(Box::new(on_complete))),
        })
    }

    /// Deliver `outcome` unless an earlier one was delivered. The closure
    /// runs outside the lock.
    pub(crate) fn complete(&self, outcome: Outcome) -> bool {
        let on_complete = self
            .on_complete
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match on_complete {
            Some(on_complete) => {
                on_complete(outcome);
                true
            }
            None => false,
        }
    }
}

enum Watch {
    Unset,
    Active(CancelToken, ListenerKey),
    Released,
}

/// The cancel listener a request registered. Withdrawn when the host settles
/// the request, so a token reused across requests only holds listeners for
/// requests still in flight.
pub(crate) struct CancelWatch {
    watch: Mutex<Watch>,
}

impl CancelWatch {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            watch: Mutex::new(Watch::Unset),
        })
    }

    /// Remember the listener. If the request already settled it is
    /// withdrawn straight away.
    pub(crate) fn register(&self, token: CancelToken, key: ListenerKey) {
        let mut watch = self.watch.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(*watch, Watch::Released) {
            drop(watch);
            token.unsubscribe(key);
        } else {
            *watch = Watch::Active(token, key);
        }
    }

    pub(crate) fn release(&self) {
        let previous = std::mem::replace(
            &mut *self.watch.lock().unwrap_or_else(PoisonError::into_inner),
            Watch::Released,
        );
        if let Watch::Active(token, key) = previous {
            token.unsubscribe(key);
        }
    }
}
