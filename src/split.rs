//! Splitting one sequence into a head and a tail at the first matching value.
//!
//! [`split_when`] is single-pass. The [`Head`] owns the upstream until it
//! meets the boundary value (the first one matching the predicate); at that
//! point it ends, and hands the boundary value together with the upstream over
//! to the [`Tail`]. The tail starts with the boundary value and continues with
//! everything after it.
//!
//! Unlike a tee, the two halves cannot be consumed in any order: the tail is
//! only usable once the head has been drained past the boundary (or to the
//! end). Pulling the tail earlier fails fast with [`Error::SplitOrder`] rather
//! than waiting for a handoff the same caller may never produce; the pull may
//! be retried once the head has finished.

use crate::error::{Error, Result};
use crate::sequence::Sequence;
use futures::future::BoxFuture;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tracing::debug;

enum Handoff<S: Sequence> {
    Boundary(S::Item, S),
    Exhausted,
    Failed(Error),
}

/// The values before the boundary.
pub struct Head<S: Sequence, P> {
    upstream: Option<S>,
    predicate: P,
    handoff: Option<oneshot::Sender<Handoff<S>>>,
    failed: Option<Error>,
}

impl<S: Sequence, P> Head<S, P> {
    fn hand_off(&mut self, handoff: Handoff<S>) {
        if let Some(tx) = self.handoff.take() {
            // A dropped tail simply never sees the rest.
            let _ = tx.send(handoff);
        }
    }
}

impl<S, P> Sequence for Head<S, P>
where
    S: Sequence,
    P: FnMut(&S::Item) -> bool + Send,
{
    type Item = S::Item;

    fn pull(&mut self) -> BoxFuture<'_, Result<Option<S::Item>>> {
        Box::pin(async move {
            if let Some(e) = &self.failed {
                return Err(e.clone());
            }
            let Some(upstream) = self.upstream.as_mut() else {
                return Ok(None);
            };

            let next = upstream.pull().await;
            match next {
                Ok(Some(item)) if (self.predicate)(&item) => {
                    if let Some(upstream) = self.upstream.take() {
                        self.hand_off(Handoff::Boundary(item, upstream));
                    }
                    Ok(None)
                }
                Ok(Some(item)) => Ok(Some(item)),
                Ok(None) => {
                    self.upstream = None;
                    self.hand_off(Handoff::Exhausted);
                    Ok(None)
                }
                Err(e) => {
                    debug!(error = %e, "split head failed");
                    self.upstream = None;
                    self.failed = Some(e.clone());
                    self.hand_off(Handoff::Failed(e.clone()));
                    Err(e)
                }
            }
        })
    }
}

enum TailState<S: Sequence> {
    Waiting(oneshot::Receiver<Handoff<S>>),
    Running(S),
    Done,
    Failed(Error),
}

/// The boundary value and everything after it.
pub struct Tail<S: Sequence> {
    state: TailState<S>,
    pending: Option<S::Item>,
}

impl<S: Sequence> Tail<S> {
    /// Returns true once the head has handed over, finished without a
    /// boundary, or failed. Until then the tail cannot be pulled.
    pub fn is_ready(&mut self) -> bool {
        let TailState::Waiting(rx) = &mut self.state else {
            return true;
        };
        let received = rx.try_recv();
        self.state = match received {
            Ok(Handoff::Boundary(item, upstream)) => {
                self.pending = Some(item);
                TailState::Running(upstream)
            }
            Ok(Handoff::Exhausted) => TailState::Done,
            Ok(Handoff::Failed(e)) => TailState::Failed(e),
            Err(TryRecvError::Empty) => return false,
            Err(TryRecvError::Closed) => {
                debug!("split head dropped before reaching the boundary");
                TailState::Failed(Error::SplitOrder)
            }
        };
        true
    }
}

impl<S: Sequence> Sequence for Tail<S> {
    type Item = S::Item;

    fn pull(&mut self) -> BoxFuture<'_, Result<Option<S::Item>>> {
        Box::pin(async move {
            if !self.is_ready() {
                return Err(Error::SplitOrder);
            }
            if let Some(item) = self.pending.take() {
                return Ok(Some(item));
            }
            match &mut self.state {
                TailState::Running(upstream) => upstream.pull().await,
                TailState::Done => Ok(None),
                TailState::Failed(e) => Err(e.clone()),
                TailState::Waiting(_) => Err(Error::SplitOrder),
            }
        })
    }
}

/// Splits `upstream` at the first value for which `predicate` returns true.
///
/// Drain the head before pulling the tail. If no value matches, the head
/// yields everything and the tail is empty.
pub fn split_when<S, P>(upstream: S, predicate: P) -> (Head<S, P>, Tail<S>)
where
    S: Sequence,
    P: FnMut(&S::Item) -> bool + Send,
{
    let (tx, rx) = oneshot::channel();
    let head = Head {
        upstream: Some(upstream),
        predicate,
        handoff: Some(tx),
        failed: None,
    };
    let tail = Tail {
        state: TailState::Waiting(rx),
        pending: None,
    };
    (head, tail)
}
