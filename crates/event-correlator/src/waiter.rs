//! Single-slot rendezvous between an event listener and the task awaiting it.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::debug;

/// The slot a wait was armed on was replaced or dropped before it resolved.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("wait superseded before it resolved")]
pub struct Superseded;

/// Holds at most one pending continuation.
///
/// `arm` installs a new slot and hands back the future bound to it. The first
/// `fulfill` or `fail` afterwards drains the slot; later calls are no-ops until
/// the waiter is armed again. Arming over an unresolved slot drops the old one,
/// and its future resolves with `E::from(Superseded)`.
pub struct CorrelationWaiter<T, E> {
    slot: Mutex<Option<oneshot::Sender<Result<T, E>>>>,
}

impl<T, E> Default for CorrelationWaiter<T, E> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }
}

impl<T, E> CorrelationWaiter<T, E>
where
    E: From<Superseded>,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&self) -> Rendezvous<T, E> {
        let (tx, rx) = oneshot::channel();
        if let Some(previous) = self.slot.lock().replace(tx) {
            if !previous.is_closed() {
                debug!(target: "correlator", "replacing an unresolved wait");
            }
        }
        Rendezvous { rx }
    }

    /// Resolve the armed slot with `value`. Returns `false` when nothing was armed.
    pub fn fulfill(&self, value: T) -> bool {
        self.resolve(Ok(value))
    }

    /// Reject the armed slot with `error`. Returns `false` when nothing was armed.
    pub fn fail(&self, error: E) -> bool {
        self.resolve(Err(error))
    }

    /// Drop the armed slot; its future resolves as superseded.
    pub fn abandon(&self) -> bool {
        self.slot.lock().take().is_some()
    }

    pub fn is_armed(&self) -> bool {
        self.slot
            .lock()
            .as_ref()
            .map_or(false, |tx| !tx.is_closed())
    }

    fn resolve(&self, outcome: Result<T, E>) -> bool {
        let Some(tx) = self.slot.lock().take() else {
            return false;
        };
        if tx.send(outcome).is_err() {
            debug!(target: "correlator", "waiter resolved after its future was dropped");
        }
        true
    }
}

/// Future side of an armed [`CorrelationWaiter`] slot.
#[must_use = "a rendezvous does nothing unless awaited"]
pub struct Rendezvous<T, E> {
    rx: oneshot::Receiver<Result<T, E>>,
}

impl<T, E> Future for Rendezvous<T, E>
where
    E: From<Superseded>,
{
    type Output = Result<T, E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(E::from(Superseded))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Waiter = CorrelationWaiter<u32, Superseded>;

    #[tokio::test]
    async fn fulfill_resolves_the_armed_wait_once() {
        let waiter = Waiter::new();
        let wait = waiter.arm();
        assert!(waiter.is_armed());
        assert!(waiter.fulfill(7));
        assert!(!waiter.fulfill(8));
        assert!(!waiter.is_armed());
        assert_eq!(wait.await, Ok(7));
    }

    #[test]
    fn resolving_an_empty_waiter_is_a_no_op() {
        let waiter = Waiter::new();
        assert!(!waiter.fulfill(1));
        assert!(!waiter.fail(Superseded));
        assert!(!waiter.is_armed());
    }

    #[tokio::test]
    async fn rearming_supersedes_the_previous_wait() {
        let waiter = Waiter::new();
        let first = waiter.arm();
        let second = waiter.arm();
        assert_eq!(first.await, Err(Superseded));
        assert!(waiter.fulfill(2));
        assert_eq!(second.await, Ok(2));
    }

    #[tokio::test]
    async fn fail_rejects_and_abandon_supersedes() {
        let waiter = Waiter::new();
        let wait = waiter.arm();
        assert!(waiter.fail(Superseded));
        assert_eq!(wait.await, Err(Superseded));

        let wait = waiter.arm();
        assert!(waiter.abandon());
        assert_eq!(wait.await, Err(Superseded));
    }

    #[test]
    fn dropped_future_does_not_count_as_armed() {
        let waiter = Waiter::new();
        drop(waiter.arm());
        assert!(!waiter.is_armed());
    }
}
