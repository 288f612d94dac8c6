//! One-shot completion signalling between session callbacks and the
//! coordinating task.
//!
//! [`Trigger::fire`] may be called any number of times from any thread; only
//! the first call delivers. [`Waiter::wait`] consumes the waiter, so a signal
//! can be awaited at most once.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WaitError {
    #[error("timed out after {}", humantime::format_duration(*.0))]
    TimedOut(Duration),

    #[error("signal dropped without firing")]
    Abandoned,
}

/// Create a connected trigger/waiter pair.
pub fn oneshot<T>() -> (Trigger<T>, Waiter<T>) {
    let (tx, rx) = oneshot::channel();
    (
        Trigger {
            tx: Mutex::new(Some(tx)),
        },
        Waiter { rx },
    )
}

/// Firing side.
#[derive(Debug)]
pub struct Trigger<T> {
    tx: Mutex<Option<oneshot::Sender<T>>>,
}

impl<T> Trigger<T> {
    /// Deliver `value`. Returns `true` only for the call that fired.
    pub fn fire(&self, value: T) -> bool {
        let sender = self
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match sender {
            Some(tx) => {
                // A dropped waiter still counts as fired.
                let _ = tx.send(value);
                true
            }
            None => false,
        }
    }

    pub fn has_fired(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

/// Waiting side.
#[derive(Debug)]
pub struct Waiter<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> Waiter<T> {
    /// Wait for the trigger, giving up after `deadline` if one is set.
    pub async fn wait(self, deadline: Option<Duration>) -> Result<T, WaitError> {
        match deadline {
            Some(limit) => match tokio::time::timeout(limit, self.rx).await {
                Ok(result) => result.map_err(|_| WaitError::Abandoned),
                Err(_) => Err(WaitError::TimedOut(limit)),
            },
            None => self.rx.await.map_err(|_| WaitError::Abandoned),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn fires_exactly_once() {
        let (trigger, waiter) = oneshot::<u32>();
        assert!(!trigger.has_fired());
        assert!(trigger.fire(1));
        assert!(!trigger.fire(2));
        assert!(trigger.has_fired());
        assert_eq!(waiter.wait(None).await, Ok(1));
    }

    #[tokio::test]
    async fn concurrent_fires_deliver_once() {
        let (trigger, waiter) = oneshot::<usize>();
        let trigger = Arc::new(trigger);
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let trigger = Arc::clone(&trigger);
                std::thread::spawn(move || trigger.fire(i))
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|fired| *fired)
            .count();
        assert_eq!(wins, 1);
        assert!(waiter.wait(None).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_expires() {
        let (_trigger, waiter) = oneshot::<()>();
        let err = waiter
            .wait(Some(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert_eq!(err, WaitError::TimedOut(Duration::from_millis(50)));
        assert_eq!(err.to_string(), "timed out after 50ms");
    }

    #[tokio::test]
    async fn dropped_trigger_is_abandoned() {
        let (trigger, waiter) = oneshot::<()>();
        drop(trigger);
        assert_eq!(waiter.wait(None).await, Err(WaitError::Abandoned));
    }

    #[tokio::test]
    async fn fire_before_wait_is_not_lost() {
        let (trigger, waiter) = oneshot::<&str>();
        trigger.fire("done");
        let value = waiter.wait(Some(Duration::from_secs(1))).await.unwrap();
        assert_eq!(value, "done");
    }
}
