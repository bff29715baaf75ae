//! A push-to-pull bridge: lets an event-driven producer feed a pull-driven consumer.
//!
//! [`bridge`] and [`bridge_with`] return a `(Producer, Bridge)` pair, the same
//! shape as a channel. The producer side is driven by whatever external events
//! it wraps; the consumer side is a [`Sequence`].
//!
//! # Production modes
//!
//! * **Direct push** ([`bridge`]): call [`Producer::push`] as each value arrives.
//!   Values queue up until a pull claims them.
//! * **Pull on demand** ([`bridge_with`]): call [`Producer::wake`] whenever a
//!   value *might* be ready. The bridge then calls the `pull_next` callback to
//!   fetch it; `None` means it was a false alarm.
//!
//! Either way, [`Producer::end`] finishes the sequence and [`Producer::error`]
//! fails it. Dropping the last `Producer` handle counts as `end`.
//!
//! # Ordering
//!
//! [`Bridge::pull`] registers its request the moment it is called, so any
//! number of pulls may be outstanding and they resolve strictly in the order
//! they were issued, whatever order the producer's events arrive in. On every
//! wake-up the oldest outstanding pull is served first, from, in priority:
//!
//! 1. the oldest queued pushed value,
//! 2. the pending error,
//! 3. the end marker, if the producer has ended,
//! 4. `pull_next()`, in pull-on-demand mode.
//!
//! When none of these yields anything the bridge stops and waits for the next
//! producer signal; it never polls.
//!
//! # Errors
//!
//! The error is sticky. Queued values still drain first, then every pull
//! (already outstanding or issued later) gets the same error.
//!
//! # Dropped pulls
//!
//! A pull whose future is dropped before it resolves gives up its place in the
//! line: it is skipped, and the value it would have received goes to the next
//! pull. This makes pulls safe to race against timers.

use crate::error::{Error, Result};
use crate::ids::Ids;
use crate::sequence::Sequence;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tracing::{debug, trace};

static IDS: Ids = Ids::new();

type Reply<T> = oneshot::Sender<Result<Option<T>>>;
type PullNext<T> = Box<dyn FnMut() -> Option<T> + Send>;

struct State<T> {
    pushed: VecDeque<T>,
    ended: bool,
    error: Option<Error>,
    waiting: VecDeque<Reply<T>>,
    pull_next: Option<PullNext<T>>,
}

impl<T> State<T> {
    /// Serves outstanding pulls, oldest first, until one cannot be served.
    fn wake(&mut self, id: u64) {
        trace!(
            bridge = id,
            pending = self.pushed.len(),
            waiting = self.waiting.len(),
            "wake"
        );

        while let Some(reply) = self.waiting.front() {
            if reply.is_closed() {
                self.waiting.pop_front();
                continue;
            }

            let outcome = if let Some(value) = self.pushed.pop_front() {
                Ok(Some(value))
            } else if let Some(e) = &self.error {
                Err(e.clone())
            } else if self.ended {
                Ok(None)
            } else {
                match self.pull_next.as_mut().and_then(|pull_next| pull_next()) {
                    Some(value) => Ok(Some(value)),
                    None => return,
                }
            };

            let Some(reply) = self.waiting.pop_front() else {
                return;
            };
            // The puller may have gone away since the check above; keep its value.
            if let Err(Ok(Some(value))) = reply.send(outcome) {
                self.pushed.push_front(value);
            }
        }
    }
}

struct Shared<T> {
    id: u64,
    state: Mutex<State<T>>,
}

impl<T> Shared<T> {
    fn update(&self, f: impl FnOnce(&mut State<T>)) {
        let mut state = self.state.lock();
        f(&mut state);
        state.wake(self.id);
    }
}

/// Ends the bridge when the last producer handle goes away.
struct ProducerInner<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Drop for ProducerInner<T> {
    fn drop(&mut self) {
        self.shared.update(|state| state.ended = true);
    }
}

/// The producer side of a bridge. Cheap to clone.
pub struct Producer<T> {
    inner: Arc<ProducerInner<T>>,
}

impl<T> Clone for Producer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Producer<T> {
    /// Queues `value` for the next outstanding or future pull.
    pub fn push(&self, value: T) {
        self.inner.shared.update(|state| state.pushed.push_back(value));
    }

    /// Signals that a value might be ready for `pull_next`.
    ///
    /// In direct-push mode this only re-checks the queue.
    pub fn wake(&self) {
        self.inner.shared.update(|_| {});
    }

    /// Finishes the sequence once the queued values are drained.
    pub fn end(&self) {
        self.inner.shared.update(|state| state.ended = true);
    }

    /// Fails the sequence. Queued values are still delivered first; every
    /// pull after them gets `error`.
    pub fn error(&self, error: Error) {
        debug!(bridge = self.inner.shared.id, error = %error, "bridge poisoned");
        self.inner.shared.update(|state| state.error = Some(error));
    }
}

/// The consumer side of a bridge.
///
/// Clones share one line of outstanding pulls, so ordering holds across all
/// of them.
pub struct Bridge<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Bridge<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Bridge<T> {
    /// Issues a pull. The request joins the line immediately, before the
    /// returned future is first polled.
    pub fn pull(&self) -> PendingPull<T> {
        let (tx, rx) = oneshot::channel();
        self.shared.update(|state| state.waiting.push_back(tx));
        PendingPull { rx }
    }

    /// Values pushed but not yet handed to a pull.
    pub fn pending(&self) -> usize {
        self.shared.state.lock().pushed.len()
    }

    /// Pulls issued but not yet resolved.
    pub fn waiting(&self) -> usize {
        self.shared.state.lock().waiting.len()
    }
}

impl<T: Send + 'static> Sequence for Bridge<T> {
    type Item = T;

    fn pull(&mut self) -> BoxFuture<'_, Result<Option<T>>> {
        Box::pin(Bridge::pull(&*self))
    }
}

impl<T> fmt::Display for Bridge<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        write!(
            f,
            "Bridge[{}](pending={}, wait={})",
            self.shared.id,
            state.pushed.len(),
            state.waiting.len()
        )
    }
}

/// The answer to one [`Bridge::pull`].
///
/// Dropping it before it resolves withdraws the request.
#[must_use = "a pull does nothing for the caller unless awaited"]
pub struct PendingPull<T> {
    rx: oneshot::Receiver<Result<Option<T>>>,
}

impl<T> Future for PendingPull<T> {
    type Output = Result<Option<T>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|reply| reply.unwrap_or(Err(Error::Closed)))
    }
}

fn pair<T>(pull_next: Option<PullNext<T>>) -> (Producer<T>, Bridge<T>) {
    let shared = Arc::new(Shared {
        id: IDS.next_id(),
        state: Mutex::new(State {
            pushed: VecDeque::new(),
            ended: false,
            error: None,
            waiting: VecDeque::new(),
            pull_next,
        }),
    });
    let producer = Producer {
        inner: Arc::new(ProducerInner {
            shared: Arc::clone(&shared),
        }),
    };
    (producer, Bridge { shared })
}

/// Creates a direct-push bridge.
pub fn bridge<T: Send + 'static>() -> (Producer<T>, Bridge<T>) {
    pair(None)
}

/// Creates a pull-on-demand bridge.
///
/// `pull_next` runs with the bridge locked, on whichever thread signalled or
/// pulled; it must not call back into the bridge.
pub fn bridge_with<T, F>(pull_next: F) -> (Producer<T>, Bridge<T>)
where
    T: Send + 'static,
    F: FnMut() -> Option<T> + Send + 'static,
{
    pair(Some(Box::new(pull_next)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use crate::SequenceExt;
    use tokio::time::{Duration, sleep, timeout};

    #[tokio::test]
    async fn test_pushes_then_end() {
        let (tx, mut rx) = bridge::<u32>();
        tx.push(4);
        tx.push(5);
        tx.end();

        assert_eq!(rx.collect().await.unwrap(), vec![4, 5]);
    }

    #[tokio::test]
    async fn test_wakes_up_as_data_arrives() {
        let (tx, mut rx) = bridge::<u32>();
        tokio::spawn(async move {
            sleep(Duration::from_millis(10)).await;
            tx.push(4);
            sleep(Duration::from_millis(10)).await;
            tx.push(5);
            sleep(Duration::from_millis(10)).await;
            tx.end();
        });

        let values = timeout(Duration::from_secs(1), rx.collect())
            .await
            .expect("bridge should finish")
            .unwrap();
        assert_eq!(values, vec![4, 5]);
    }

    #[tokio::test]
    async fn test_pull_on_demand() {
        let slot: Arc<Mutex<Option<u32>>> = Arc::new(Mutex::new(None));
        let (tx, mut rx) = bridge_with({
            let slot = slot.clone();
            move || slot.lock().take()
        });

        tokio::spawn({
            let slot = slot.clone();
            async move {
                sleep(Duration::from_millis(10)).await;
                *slot.lock() = Some(4);
                tx.wake();
                // A false alarm: nothing is ready
                sleep(Duration::from_millis(10)).await;
                tx.wake();
                sleep(Duration::from_millis(10)).await;
                *slot.lock() = Some(5);
                tx.wake();
                sleep(Duration::from_millis(10)).await;
                tx.end();
            }
        });

        let values = timeout(Duration::from_secs(1), rx.collect())
            .await
            .expect("bridge should finish")
            .unwrap();
        assert_eq!(values, vec![4, 5]);
    }

    #[tokio::test]
    async fn test_pulls_resolve_in_issue_order() {
        let (tx, rx) = bridge::<&str>();

        // 1. Three pulls are outstanding before anything arrives
        let p1 = rx.pull();
        let p2 = rx.pull();
        let p3 = rx.pull();
        assert_eq!(rx.waiting(), 3);

        // 2. Events arrive: a value, the failure, another value
        tx.push("first");
        tx.error(Error::msg("link lost"));
        tx.push("second");

        // 3. Awaiting out of order changes nothing: p1 got the first event
        let r3 = p3.await;
        let r2 = p2.await;
        let r1 = p1.await;
        assert_eq!(r1.unwrap(), Some("first"));

        // p2 and p3 were both outstanding when the error arrived
        let e2 = r2.unwrap_err();
        let e3 = r3.unwrap_err();
        assert!(e2.same_as(&e3));

        // 4. A value pushed after the failure is still handed out before the
        //    error repeats
        assert_eq!(rx.pull().await.unwrap(), Some("second"));
        assert!(rx.pull().await.unwrap_err().same_as(&e2));
    }

    #[tokio::test]
    async fn test_error_is_sticky() {
        let (tx, mut rx) = bridge::<u8>();
        tokio::spawn(async move {
            sleep(Duration::from_millis(10)).await;
            tx.error(Error::msg("foo"));
        });

        let e = rx.collect().await.unwrap_err();
        assert_eq!(e.to_string(), "upstream failed: foo");
        for _ in 0..3 {
            assert!(rx.pull().await.unwrap_err().same_as(&e));
        }
    }

    #[tokio::test]
    async fn test_dropped_pull_does_not_swallow_value() {
        let (tx, rx) = bridge::<u32>();

        let abandoned = rx.pull();
        let kept = rx.pull();
        drop(abandoned);

        tx.push(1);
        assert_eq!(kept.await.unwrap(), Some(1));
        assert_eq!(rx.waiting(), 0);
    }

    #[tokio::test]
    async fn test_dropping_last_producer_ends() {
        let (tx, mut rx) = bridge::<u32>();
        let tx2 = tx.clone();
        tx.push(1);
        drop(tx);
        tx2.push(2);

        let pending = rx.pull();
        assert_eq!(pending.await.unwrap(), Some(1));
        drop(tx2);
        assert_eq!(rx.collect().await.unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn test_display() {
        let (tx, rx) = bridge::<u32>();
        tx.push(1);
        tx.push(2);
        let id = rx.shared.id;
        assert_eq!(rx.to_string(), format!("Bridge[{id}](pending=2, wait=0)"));
        assert_eq!(rx.pending(), 2);
    }
}
