//! Fan-out: one upstream [`Sequence`], several independently paced consumers.
//!
//! Every [`Branch`] owns a queue of results it has not consumed yet. A branch
//! with a non-empty queue is served from it without touching the upstream.
//! A branch with an empty queue joins the shared [`Gate`] flight, which pulls
//! the upstream exactly once and lets the router distribute the result into
//! the queues. Whichever branch polls the flight drives it; the others just
//! observe its completion and re-check their queues.
//!
//! * [`tee`] copies every result into every queue.
//! * [`partition`] sends each value to exactly one of two queues; the end
//!   marker and errors go to both, so both branches terminate.
//!
//! # Memory
//!
//! A queue holds whatever its branch has not consumed yet, so buffering is
//! bounded by the gap between the fastest and the slowest branch. A branch
//! that is kept alive but never pulled grows its queue without bound. A
//! dropped branch detaches its queue and stops buffering.

use crate::error::Result;
use crate::gate::Gate;
use crate::sequence::Sequence;
use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use tracing::trace;

type Slot<T> = Result<Option<T>>;

/// A queue per branch; `None` once the branch is dropped.
type Queues<T> = [Option<VecDeque<Slot<T>>>];

/// Decides which branch queues receive an upstream result.
pub trait Route<T>: Send + Sync + 'static {
    fn route(&self, result: Slot<T>, queues: &mut Queues<T>);
}

/// Routing for [`tee`]: every branch gets a copy.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tee;

impl<T: Clone> Route<T> for Tee {
    fn route(&self, result: Slot<T>, queues: &mut Queues<T>) {
        let mut live = queues.iter_mut().flatten().peekable();
        while let Some(queue) = live.next() {
            if live.peek().is_some() {
                queue.push_back(result.clone());
            } else {
                queue.push_back(result);
                break;
            }
        }
    }
}

/// Routing for [`partition`]: `true` goes to the first branch, `false` to the second.
#[derive(Debug, Clone, Copy)]
pub struct Partition<P>(P);

impl<T, P> Route<T> for Partition<P>
where
    P: Fn(&T) -> bool + Send + Sync + 'static,
{
    fn route(&self, result: Slot<T>, queues: &mut Queues<T>) {
        match result {
            Ok(Some(item)) => {
                let index = if (self.0)(&item) { 0 } else { 1 };
                if let Some(queue) = queues[index].as_mut() {
                    queue.push_back(Ok(Some(item)));
                }
            }
            Ok(None) => {
                for queue in queues.iter_mut().flatten() {
                    queue.push_back(Ok(None));
                }
            }
            Err(e) => {
                for queue in queues.iter_mut().flatten() {
                    queue.push_back(Err(e.clone()));
                }
            }
        }
    }
}

struct Hub<S: Sequence, R> {
    upstream: tokio::sync::Mutex<S>,
    queues: Mutex<Vec<Option<VecDeque<Slot<S::Item>>>>>,
    gate: Gate,
    router: R,
}

impl<S, R> Hub<S, R>
where
    S: Sequence + 'static,
    S::Item: 'static,
    R: Route<S::Item>,
{
    fn new(upstream: S, router: R, branches: usize) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let weak = weak.clone();
            Self {
                upstream: tokio::sync::Mutex::new(upstream),
                queues: Mutex::new((0..branches).map(|_| Some(VecDeque::new())).collect()),
                gate: Gate::new(move || {
                    let weak = weak.clone();
                    async move {
                        match weak.upgrade() {
                            Some(hub) => hub.advance().await,
                            None => Ok(()),
                        }
                    }
                    .boxed()
                }),
                router,
            }
        })
    }

    /// One upstream pull, distributed to the branch queues. Only ever runs
    /// inside a gate flight.
    async fn advance(&self) -> Result<()> {
        let result = {
            let mut upstream = self.upstream.lock().await;
            upstream.pull().await
        };
        trace!(
            value = matches!(result, Ok(Some(_))),
            end = matches!(result, Ok(None)),
            "fan-out pulled upstream"
        );
        let mut queues = self.queues.lock();
        self.router.route(result, &mut queues[..]);
        Ok(())
    }
}

/// One consumer of a fanned-out sequence.
pub struct Branch<S: Sequence, R> {
    hub: Arc<Hub<S, R>>,
    index: usize,
    terminal: Option<Result<()>>,
}

impl<S, R> Branch<S, R>
where
    S: Sequence,
{
    /// Number of results queued for this branch and not yet pulled.
    pub fn backlog(&self) -> usize {
        self.hub.queues.lock()[self.index]
            .as_ref()
            .map_or(0, VecDeque::len)
    }
}

impl<S, R> Sequence for Branch<S, R>
where
    S: Sequence + 'static,
    S::Item: 'static,
    R: Route<S::Item>,
{
    type Item = S::Item;

    fn pull(&mut self) -> BoxFuture<'_, Result<Option<S::Item>>> {
        Box::pin(async move {
            loop {
                if let Some(terminal) = &self.terminal {
                    return terminal.clone().map(|()| None);
                }

                let flight = {
                    let mut queues = self.hub.queues.lock();
                    let queue = queues[self.index].get_or_insert_with(VecDeque::new);
                    match queue.pop_front() {
                        Some(Ok(Some(item))) => return Ok(Some(item)),
                        Some(Ok(None)) => {
                            self.terminal = Some(Ok(()));
                            continue;
                        }
                        Some(Err(e)) => {
                            self.terminal = Some(Err(e.clone()));
                            return Err(e);
                        }
                        None => self.hub.gate.join(),
                    }
                };

                flight.await?;
            }
        })
    }
}

impl<S: Sequence, R> Drop for Branch<S, R> {
    fn drop(&mut self) {
        self.hub.queues.lock()[self.index] = None;
    }
}

/// Splits `upstream` into `count` branches that each replay every result.
///
/// # Panics
///
/// Panics if `count` is zero.
pub fn tee<S>(upstream: S, count: usize) -> Vec<Branch<S, Tee>>
where
    S: Sequence + 'static,
    S::Item: Clone + 'static,
{
    assert!(count >= 1, "tee needs at least one branch");
    let hub = Hub::new(upstream, Tee, count);
    (0..count)
        .map(|index| Branch {
            hub: Arc::clone(&hub),
            index,
            terminal: None,
        })
        .collect()
}

/// Splits `upstream` into values matching `predicate` and values that don't.
///
/// The predicate runs once per value, on whichever branch drives the pull.
pub fn partition<S, P>(
    upstream: S,
    predicate: P,
) -> (Branch<S, Partition<P>>, Branch<S, Partition<P>>)
where
    S: Sequence + 'static,
    S::Item: 'static,
    P: Fn(&S::Item) -> bool + Send + Sync + 'static,
{
    let hub = Hub::new(upstream, Partition(predicate), 2);
    let matching = Branch {
        hub: Arc::clone(&hub),
        index: 0,
        terminal: None,
    };
    let rest = Branch {
        hub,
        index: 1,
        terminal: None,
    };
    (matching, rest)
}
