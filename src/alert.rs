//! Completion signalling for a sequence.
//!
//! [`Alerting`] passes values through untouched and, as a side channel, lets
//! anybody holding a [`Completion`] wait until the sequence has ended or
//! failed. This is handy when the values go one way (say, into a fan-out) and
//! a supervisor elsewhere only cares that the pipeline is done.

use crate::error::{Error, Result};
use crate::sequence::Sequence;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::future::IntoFuture;
use tokio::sync::watch;
use tracing::debug;

type Outcome = Option<Result<()>>;

pub struct Alerting<S> {
    upstream: S,
    tx: watch::Sender<Outcome>,
}

impl<S> Alerting<S> {
    pub fn new(upstream: S) -> Self {
        let (tx, _) = watch::channel(None);
        Self { upstream, tx }
    }

    /// A handle that resolves once the wrapped sequence ends or fails.
    ///
    /// If the `Alerting` is dropped first, the handle resolves to
    /// [`Error::Closed`].
    pub fn done(&self) -> Completion {
        Completion {
            rx: self.tx.subscribe(),
        }
    }

    /// Whether the wrapped sequence has already reported end or an error.
    pub fn is_done(&self) -> bool {
        self.tx.borrow().is_some()
    }

    fn settle(&self, outcome: Result<()>) {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(outcome);
            true
        });
    }
}

impl<S: Sequence> Sequence for Alerting<S> {
    type Item = S::Item;

    fn pull(&mut self) -> BoxFuture<'_, Result<Option<S::Item>>> {
        Box::pin(async move {
            let next = self.upstream.pull().await;
            match &next {
                Ok(Some(_)) => {}
                Ok(None) => self.settle(Ok(())),
                Err(e) => {
                    debug!(error = %e, "alerting sequence failed");
                    self.settle(Err(e.clone()));
                }
            }
            next
        })
    }
}

/// Awaitable end-of-sequence signal handed out by [`Alerting::done`].
#[derive(Clone)]
pub struct Completion {
    rx: watch::Receiver<Outcome>,
}

impl IntoFuture for Completion {
    type Output = Result<()>;
    type IntoFuture = BoxFuture<'static, Result<()>>;

    fn into_future(mut self) -> Self::IntoFuture {
        async move {
            let outcome = match self.rx.wait_for(Option::is_some).await {
                Ok(outcome) => outcome.clone(),
                Err(_) => None,
            };
            outcome.unwrap_or(Err(Error::Closed))
        }
        .boxed()
    }
}
