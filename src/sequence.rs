//! The pull contract every other module is built on.
//!
//! A [`Sequence`] hands out values one at a time. Each call to
//! [`pull`](Sequence::pull) advances it exactly once and resolves to one of:
//!
//! * `Ok(Some(value))`: the next value,
//! * `Ok(None)`: the sequence is exhausted,
//! * `Err(error)`: the source failed.
//!
//! Sequences are single-pass: one instance serves one iteration. A source that
//! can be iterated again is modelled as a closure that builds a fresh sequence.
//!
//! `pull` takes `&mut self`, so calls against one instance are serialized by
//! the borrow checker. The one component that accepts overlapping pulls, the
//! [`Bridge`](crate::Bridge), does so through its own `&self` method and
//! resolves them in issue order.

use crate::alert::Alerting;
use crate::combinators::{Chain, Enumerate, Filter, FilterMap, FlatMap, Map, Take, TakeWhile};
use crate::error::Result;
use crate::fanout::{self, Branch, Partition, Tee};
use crate::split::{self, Head, Tail};
use crate::timing::TakeUntil;
use futures::future::{self, BoxFuture};
use futures::{Stream, StreamExt};
use std::time::Duration;
use tokio::time::Instant;

/// An asynchronous, pull-driven source of values.
pub trait Sequence: Send {
    type Item: Send;

    /// Advances the sequence once.
    ///
    /// After `Ok(None)` a sequence keeps answering `Ok(None)`. Components that
    /// observed a terminal error keep answering with that same error.
    fn pull(&mut self) -> BoxFuture<'_, Result<Option<Self::Item>>>;
}

pub type BoxSequence<'a, T> = Box<dyn Sequence<Item = T> + 'a>;

impl<S: Sequence + ?Sized> Sequence for &mut S {
    type Item = S::Item;

    fn pull(&mut self) -> BoxFuture<'_, Result<Option<Self::Item>>> {
        (**self).pull()
    }
}

impl<S: Sequence + ?Sized> Sequence for Box<S> {
    type Item = S::Item;

    fn pull(&mut self) -> BoxFuture<'_, Result<Option<Self::Item>>> {
        (**self).pull()
    }
}

/// A sequence over a plain synchronous collection.
#[derive(Debug, Clone)]
pub struct Iter<I> {
    inner: I,
}

/// Wraps anything iterable; every pull resolves immediately.
pub fn iter<I>(items: I) -> Iter<I::IntoIter>
where
    I: IntoIterator,
{
    Iter {
        inner: items.into_iter(),
    }
}

impl<I> Sequence for Iter<I>
where
    I: Iterator + Send,
    I::Item: Send,
{
    type Item = I::Item;

    fn pull(&mut self) -> BoxFuture<'_, Result<Option<Self::Item>>> {
        Box::pin(future::ready(Ok(self.inner.next())))
    }
}

/// A sequence over an existing `futures::Stream` of results.
#[derive(Debug)]
pub struct FromStream<St> {
    inner: St,
}

pub fn from_stream<St, T>(stream: St) -> FromStream<St>
where
    St: Stream<Item = Result<T>> + Unpin + Send,
{
    FromStream { inner: stream }
}

impl<St, T> Sequence for FromStream<St>
where
    St: Stream<Item = Result<T>> + Unpin + Send,
    T: Send,
{
    type Item = T;

    fn pull(&mut self) -> BoxFuture<'_, Result<Option<T>>> {
        Box::pin(async move { self.inner.next().await.transpose() })
    }
}

/// Exposes a sequence as a `futures::Stream`.
///
/// The stream ends after the first error, since a `Stream` has no way to
/// report a terminal failure other than yielding it.
pub fn into_stream<S>(sequence: S) -> impl Stream<Item = Result<S::Item>> + Send
where
    S: Sequence,
{
    futures::stream::unfold(Some(sequence), |state| async move {
        let mut sequence = state?;
        let next = sequence.pull().await;
        match next {
            Ok(Some(item)) => Some((Ok(item), Some(sequence))),
            Ok(None) => None,
            Err(e) => Some((Err(e), None)),
        }
    })
}

/// Pipeline operators available on every [`Sequence`].
pub trait SequenceExt: Sequence {
    /// Drains the sequence into a `Vec`.
    ///
    /// Borrows rather than consumes, so a partially drained sequence can keep
    /// being used afterwards.
    fn collect(&mut self) -> BoxFuture<'_, Result<Vec<Self::Item>>>
    where
        Self: Sized,
    {
        Box::pin(async move {
            let mut items = Vec::new();
            while let Some(item) = self.pull().await? {
                items.push(item);
            }
            Ok(items)
        })
    }

    fn map<U, F>(self, f: F) -> Map<Self, F>
    where
        Self: Sized,
        F: FnMut(Self::Item) -> U + Send,
        U: Send,
    {
        Map::new(self, f)
    }

    fn filter<F>(self, f: F) -> Filter<Self, F>
    where
        Self: Sized,
        F: FnMut(&Self::Item) -> bool + Send,
    {
        Filter::new(self, f)
    }

    fn filter_map<U, F>(self, f: F) -> FilterMap<Self, F>
    where
        Self: Sized,
        F: FnMut(Self::Item) -> Option<U> + Send,
        U: Send,
    {
        FilterMap::new(self, f)
    }

    fn flat_map<U, F>(self, f: F) -> FlatMap<Self, F, U>
    where
        Self: Sized,
        F: FnMut(Self::Item) -> U + Send,
        U: Sequence,
    {
        FlatMap::new(self, f)
    }

    fn chain<B>(self, next: B) -> Chain<Self, B>
    where
        Self: Sized,
        B: Sequence<Item = Self::Item>,
    {
        Chain::new(self, next)
    }

    /// Yields at most `n` values and stops pulling upstream after the last one.
    fn take(self, n: usize) -> Take<Self>
    where
        Self: Sized,
    {
        Take::new(self, n)
    }

    fn take_while<F>(self, f: F) -> TakeWhile<Self, F>
    where
        Self: Sized,
        F: FnMut(&Self::Item) -> bool + Send,
    {
        TakeWhile::new(self, f)
    }

    fn enumerate(self) -> Enumerate<Self>
    where
        Self: Sized,
    {
        Enumerate::new(self)
    }

    /// Splits into `count` independently paced copies. Each [`Branch`] keeps its own backlog.
    fn tee(self, count: usize) -> Vec<Branch<Self, Tee>>
    where
        Self: Sized + 'static,
        Self::Item: Clone + 'static,
    {
        fanout::tee(self, count)
    }

    /// Routes each value to the first branch if `predicate` holds, else to the second.
    fn partition<P>(self, predicate: P) -> (Branch<Self, Partition<P>>, Branch<Self, Partition<P>>)
    where
        Self: Sized + 'static,
        Self::Item: 'static,
        P: Fn(&Self::Item) -> bool + Send + Sync + 'static,
    {
        fanout::partition(self, predicate)
    }

    /// Splits at the first value matching `predicate`. Drain the [`Head`] before pulling the [`Tail`].
    fn split_when<P>(self, predicate: P) -> (Head<Self, P>, Tail<Self>)
    where
        Self: Sized,
        P: FnMut(&Self::Item) -> bool + Send,
    {
        split::split_when(self, predicate)
    }

    /// Ends the sequence once `duration` (measured from now) has elapsed.
    fn take_for(self, duration: Duration) -> TakeUntil<Self>
    where
        Self: Sized,
    {
        TakeUntil::new(self, Instant::now() + duration)
    }

    /// Ends the sequence at `deadline`.
    fn take_until(self, deadline: Instant) -> TakeUntil<Self>
    where
        Self: Sized,
    {
        TakeUntil::new(self, deadline)
    }

    fn alerting(self) -> Alerting<Self>
    where
        Self: Sized,
    {
        Alerting::new(self)
    }

    fn boxed<'a>(self) -> BoxSequence<'a, Self::Item>
    where
        Self: Sized + 'a,
    {
        Box::new(self)
    }
}

impl<S: Sequence + ?Sized> SequenceExt for S {}
