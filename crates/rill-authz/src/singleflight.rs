//! Keyed admission barrier: at most one task per key performs a piece of
//! work while every other requester for that key observes the same outcome.
use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::watch;

use crate::errors::GrantsError;

type Outcome<T> = Option<Result<T, GrantsError>>;

pub struct SingleFlight<T> {
    inflight: Mutex<HashMap<String, watch::Receiver<Outcome<T>>>>,
}

/// Result of [`SingleFlight::acquire`]: the leader runs the work, followers
/// wait for its outcome.
pub enum Flight<'a, T> {
    Leader(Completion<'a, T>),
    Follower(Waiter<T>),
}

impl<T> SingleFlight<T> {
    pub fn new() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Atomically install an in-flight marker for `key`, or join the one
    /// already present.
    pub fn acquire(&self, key: &str) -> Flight<'_, T> {
        let mut inflight = self.inflight.lock().expect("singleflight lock");
        if let Some(receiver) = inflight.get(key) {
            return Flight::Follower(Waiter {
                receiver: receiver.clone(),
            });
        }
        let (sender, receiver) = watch::channel(None);
        inflight.insert(key.to_string(), receiver);
        Flight::Leader(Completion {
            barrier: self,
            key: key.to_string(),
            sender,
        })
    }

    fn release(&self, key: &str) {
        self.inflight
            .lock()
            .expect("singleflight lock")
            .remove(key);
    }

    #[cfg(test)]
    fn inflight_len(&self) -> usize {
        self.inflight.lock().expect("singleflight lock").len()
    }
}

impl<T> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Leader handle. Dropping it releases the key, so a leader that never calls
/// [`Completion::complete`] (panic, task abort) closes the channel and every
/// waiter observes a service error instead of hanging.
pub struct Completion<'a, T> {
    barrier: &'a SingleFlight<T>,
    key: String,
    sender: watch::Sender<Outcome<T>>,
}

impl<T> Completion<'_, T> {
    /// Publish the outcome to every waiter parked on this key.
    pub fn complete(&self, outcome: Result<T, GrantsError>) {
        let _ = self.sender.send(Some(outcome));
    }
}

impl<T> Drop for Completion<'_, T> {
    fn drop(&mut self) {
        // Remove the key first so the next acquire starts a fresh epoch;
        // existing waiters keep their receiver and still see the outcome.
        self.barrier.release(&self.key);
    }
}

/// Follower handle awaiting the leader's outcome.
pub struct Waiter<T> {
    receiver: watch::Receiver<Outcome<T>>,
}

impl<T: Clone> Waiter<T> {
    pub async fn wait(mut self) -> Result<T, GrantsError> {
        loop {
            if let Some(outcome) = self.receiver.borrow_and_update().clone() {
                return outcome;
            }
            if self.receiver.changed().await.is_err() {
                // The sender is gone; pick up an outcome published just
                // before release, otherwise the work was interrupted.
                if let Some(outcome) = self.receiver.borrow().clone() {
                    return outcome;
                }
                return Err(GrantsError::Service(
                    "in-flight work was interrupted before completion".to_string(),
                ));
            }
        }
    }
}
