//! A single-flight gate.
//!
//! Several waiters may need the same shared action (for fan-out: "pull the
//! upstream once more"). The gate runs at most one instance of the action at a
//! time; everybody who waits while it runs observes the same completion.
//!
//! ```text
//!  waiter A ──┐
//!  waiter B ──┼──> [ one flight of `action` ] ──> same result to A, B, C
//!  waiter C ──┘
//! ```
//!
//! The in-flight marker is cleared from inside the flight, before any waiter
//! sees the result. A waiter that loops and calls [`Gate::wait`] again therefore
//! always starts (or joins) a fresh flight and never re-observes a stale one.

use crate::error::Result;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::trace;

/// The shared pending result of one run of the gate's action.
pub type Flight = Shared<BoxFuture<'static, Result<()>>>;

type Action = Box<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

pub struct Gate {
    slot: Arc<Mutex<Option<Flight>>>,
    action: Action,
}

impl Gate {
    pub fn new<F>(action: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<()>> + Send + Sync + 'static,
    {
        Self {
            slot: Arc::new(Mutex::new(None)),
            action: Box::new(action),
        }
    }

    /// Joins the in-flight action, starting one if none is running.
    ///
    /// This is the synchronous half of [`wait`](Self::wait): no suspension point
    /// separates the caller's own checks from the decision to join. The
    /// action itself only makes progress while some holder polls the returned
    /// `Flight`; a flight whose waiters all went away is resumed by the next
    /// caller.
    pub fn join(&self) -> Flight {
        let mut slot = self.slot.lock();
        if let Some(flight) = slot.as_ref() {
            return flight.clone();
        }

        let action = (self.action)();
        let marker: Weak<Mutex<Option<Flight>>> = Arc::downgrade(&self.slot);
        let flight = async move {
            let result = action.await;
            if let Some(slot) = marker.upgrade() {
                slot.lock().take();
            }
            trace!(ok = result.is_ok(), "gate flight finished");
            result
        }
        .boxed()
        .shared();

        trace!("gate flight started");
        *slot = Some(flight.clone());
        flight
    }

    /// Waits for the in-flight action, starting one if none is running.
    ///
    /// Every waiter of one flight gets the same `Ok` or the same `Err`. A
    /// failed flight does not wedge the gate: the next call starts over.
    pub async fn wait(&self) -> Result<()> {
        self.join().await
    }

    /// Returns true if no action is currently in flight.
    pub fn is_idle(&self) -> bool {
        self.slot.lock().is_none()
    }
}

impl std::fmt::Debug for Gate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gate")
            .field("idle", &self.is_idle())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;
    use tokio::time::{Duration, timeout};

    #[tokio::test]
    async fn test_concurrent_waiters_share_one_run() {
        let runs = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(Notify::new());

        let gate = {
            let runs = runs.clone();
            let release = release.clone();
            Arc::new(Gate::new(move || {
                let runs = runs.clone();
                let release = release.clone();
                async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    release.notified().await;
                    Ok(())
                }
                .boxed()
            }))
        };

        // 1. Three waiters pile up on the same flight
        let mut waiters = Vec::new();
        for _ in 0..3 {
            let gate = gate.clone();
            waiters.push(tokio::spawn(async move { gate.wait().await }));
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!gate.is_idle());

        // 2. Release the action; all of them finish together
        release.notify_one();
        for waiter in waiters {
            timeout(Duration::from_millis(500), waiter)
                .await
                .expect("waiter should finish")
                .unwrap()
                .unwrap();
        }

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(gate.is_idle());

        // 3. A later wait starts a fresh run
        let next = tokio::spawn({
            let gate = gate.clone();
            async move { gate.wait().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        release.notify_one();
        next.await.unwrap().unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failure_reaches_every_waiter_and_gate_retries() {
        let runs = Arc::new(AtomicUsize::new(0));
        let gate = {
            let runs = runs.clone();
            Gate::new(move || {
                let attempt = runs.fetch_add(1, Ordering::SeqCst);
                async move {
                    tokio::task::yield_now().await;
                    Err(Error::msg(format!("attempt {attempt} failed")))
                }
                .boxed()
            })
        };

        // 1. Both waiters join the same failing flight
        let a = gate.join();
        let b = gate.join();
        let (ra, rb) = tokio::join!(a, b);
        let (ea, eb) = (ra.unwrap_err(), rb.unwrap_err());
        assert!(ea.same_as(&eb));
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        // 2. The gate is not wedged: the next call is a fresh attempt
        assert!(gate.is_idle());
        let again = gate.wait().await.unwrap_err();
        assert!(!again.same_as(&ea));
        assert_eq!(again.to_string(), "upstream failed: attempt 1 failed");
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_abandoned_flight_is_resumed() {
        let runs = Arc::new(AtomicUsize::new(0));
        let gate = {
            let runs = runs.clone();
            Gate::new(move || {
                let runs = runs.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
                .boxed()
            })
        };

        // The only waiter gives up before the flight finishes
        assert!(timeout(Duration::from_millis(5), gate.wait()).await.is_err());
        assert!(!gate.is_idle());

        // The next waiter drives the same flight to completion instead of starting another
        gate.wait().await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(gate.is_idle());
    }
}
