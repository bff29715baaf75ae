//! Deadline-bounded consumption.
//!
//! [`TakeUntil`] races every upstream pull against a deadline. When the
//! deadline wins, the operator ends for its own consumer and stays ended.
//!
//! # The losing pull
//!
//! The upstream pull that was in flight when the deadline passed is dropped.
//! In tokio, dropping a future cancels it, so whatever it had not produced yet
//! is discarded; it is never delivered later. For cancel-safe sources (the
//! [`Bridge`](crate::Bridge), [`ReadChunks`](crate::ReadChunks), iterator
//! sources) that means nothing is lost: the value stays available upstream.
//! A source with side effects half-way through a pull may lose that work.
//! Releasing the upstream resource after a timeout is the caller's job; this
//! operator only stops pulling.

use crate::error::Result;
use crate::sequence::Sequence;
use futures::future::BoxFuture;
use tokio::time::{Instant, timeout_at};
use tracing::debug;

pub struct TakeUntil<S> {
    upstream: S,
    deadline: Instant,
    finished: bool,
}

impl<S> TakeUntil<S> {
    pub(crate) fn new(upstream: S, deadline: Instant) -> Self {
        Self {
            upstream,
            deadline,
            finished: false,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn into_inner(self) -> S {
        self.upstream
    }
}

impl<S: Sequence> Sequence for TakeUntil<S> {
    type Item = S::Item;

    fn pull(&mut self) -> BoxFuture<'_, Result<Option<S::Item>>> {
        Box::pin(async move {
            if self.finished || Instant::now() >= self.deadline {
                self.finished = true;
                return Ok(None);
            }

            match timeout_at(self.deadline, self.upstream.pull()).await {
                Ok(Ok(Some(item))) => Ok(Some(item)),
                Ok(Ok(None)) => {
                    self.finished = true;
                    Ok(None)
                }
                Ok(Err(e)) => Err(e),
                Err(_) => {
                    debug!("deadline passed with a pull in flight; dropping it");
                    self.finished = true;
                    Ok(None)
                }
            }
        })
    }
}
