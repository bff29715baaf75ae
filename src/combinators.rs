//! Stateless and small-state transformations over a [`Sequence`].
//!
//! Each adapter owns its upstream and pulls it only from inside its own
//! `pull`, so ordering and the one-advance-per-pull contract carry through.

use crate::error::Result;
use crate::sequence::Sequence;
use futures::future::BoxFuture;

pub struct Map<S, F> {
    upstream: S,
    f: F,
}

impl<S, F> Map<S, F> {
    pub(crate) fn new(upstream: S, f: F) -> Self {
        Self { upstream, f }
    }
}

impl<S, F, U> Sequence for Map<S, F>
where
    S: Sequence,
    F: FnMut(S::Item) -> U + Send,
    U: Send,
{
    type Item = U;

    fn pull(&mut self) -> BoxFuture<'_, Result<Option<U>>> {
        Box::pin(async move {
            let next = self.upstream.pull().await?;
            Ok(next.map(&mut self.f))
        })
    }
}

pub struct Filter<S, F> {
    upstream: S,
    f: F,
}

impl<S, F> Filter<S, F> {
    pub(crate) fn new(upstream: S, f: F) -> Self {
        Self { upstream, f }
    }
}

impl<S, F> Sequence for Filter<S, F>
where
    S: Sequence,
    F: FnMut(&S::Item) -> bool + Send,
{
    type Item = S::Item;

    fn pull(&mut self) -> BoxFuture<'_, Result<Option<S::Item>>> {
        Box::pin(async move {
            while let Some(item) = self.upstream.pull().await? {
                if (self.f)(&item) {
                    return Ok(Some(item));
                }
            }
            Ok(None)
        })
    }
}

pub struct FilterMap<S, F> {
    upstream: S,
    f: F,
}

impl<S, F> FilterMap<S, F> {
    pub(crate) fn new(upstream: S, f: F) -> Self {
        Self { upstream, f }
    }
}

impl<S, F, U> Sequence for FilterMap<S, F>
where
    S: Sequence,
    F: FnMut(S::Item) -> Option<U> + Send,
    U: Send,
{
    type Item = U;

    fn pull(&mut self) -> BoxFuture<'_, Result<Option<U>>> {
        Box::pin(async move {
            while let Some(item) = self.upstream.pull().await? {
                if let Some(mapped) = (self.f)(item) {
                    return Ok(Some(mapped));
                }
            }
            Ok(None)
        })
    }
}

/// Replaces every upstream value with the whole sequence `f` builds from it.
pub struct FlatMap<S, F, U> {
    upstream: S,
    f: F,
    current: Option<U>,
    ended: bool,
}

impl<S, F, U> FlatMap<S, F, U> {
    pub(crate) fn new(upstream: S, f: F) -> Self {
        Self {
            upstream,
            f,
            current: None,
            ended: false,
        }
    }
}

impl<S, F, U> Sequence for FlatMap<S, F, U>
where
    S: Sequence,
    F: FnMut(S::Item) -> U + Send,
    U: Sequence,
{
    type Item = U::Item;

    fn pull(&mut self) -> BoxFuture<'_, Result<Option<U::Item>>> {
        Box::pin(async move {
            loop {
                if let Some(inner) = self.current.as_mut() {
                    let next = inner.pull().await?;
                    match next {
                        Some(item) => return Ok(Some(item)),
                        None => self.current = None,
                    }
                }

                if self.ended {
                    return Ok(None);
                }

                match self.upstream.pull().await? {
                    Some(item) => self.current = Some((self.f)(item)),
                    None => self.ended = true,
                }
            }
        })
    }
}

/// Everything from `first`, then everything from `second`.
pub struct Chain<A, B> {
    first: A,
    second: B,
    first_done: bool,
}

impl<A, B> Chain<A, B> {
    pub(crate) fn new(first: A, second: B) -> Self {
        Self {
            first,
            second,
            first_done: false,
        }
    }
}

impl<A, B> Sequence for Chain<A, B>
where
    A: Sequence,
    B: Sequence<Item = A::Item>,
{
    type Item = A::Item;

    fn pull(&mut self) -> BoxFuture<'_, Result<Option<A::Item>>> {
        Box::pin(async move {
            if !self.first_done {
                match self.first.pull().await? {
                    Some(item) => return Ok(Some(item)),
                    None => self.first_done = true,
                }
            }
            self.second.pull().await
        })
    }
}

pub struct Take<S> {
    upstream: S,
    remaining: usize,
}

impl<S> Take<S> {
    pub(crate) fn new(upstream: S, n: usize) -> Self {
        Self {
            upstream,
            remaining: n,
        }
    }
}

impl<S: Sequence> Sequence for Take<S> {
    type Item = S::Item;

    fn pull(&mut self) -> BoxFuture<'_, Result<Option<S::Item>>> {
        Box::pin(async move {
            if self.remaining == 0 {
                return Ok(None);
            }
            let next = self.upstream.pull().await?;
            match next {
                Some(item) => {
                    self.remaining -= 1;
                    Ok(Some(item))
                }
                None => {
                    self.remaining = 0;
                    Ok(None)
                }
            }
        })
    }
}

pub struct TakeWhile<S, F> {
    upstream: S,
    f: F,
    done: bool,
}

impl<S, F> TakeWhile<S, F> {
    pub(crate) fn new(upstream: S, f: F) -> Self {
        Self {
            upstream,
            f,
            done: false,
        }
    }
}

impl<S, F> Sequence for TakeWhile<S, F>
where
    S: Sequence,
    F: FnMut(&S::Item) -> bool + Send,
{
    type Item = S::Item;

    fn pull(&mut self) -> BoxFuture<'_, Result<Option<S::Item>>> {
        Box::pin(async move {
            if self.done {
                return Ok(None);
            }
            match self.upstream.pull().await? {
                Some(item) if (self.f)(&item) => Ok(Some(item)),
                _ => {
                    self.done = true;
                    Ok(None)
                }
            }
        })
    }
}

pub struct Enumerate<S> {
    upstream: S,
    count: usize,
}

impl<S> Enumerate<S> {
    pub(crate) fn new(upstream: S) -> Self {
        Self { upstream, count: 0 }
    }
}

impl<S: Sequence> Sequence for Enumerate<S> {
    type Item = (usize, S::Item);

    fn pull(&mut self) -> BoxFuture<'_, Result<Option<Self::Item>>> {
        Box::pin(async move {
            let next = self.upstream.pull().await?;
            Ok(next.map(|item| {
                let index = self.count;
                self.count += 1;
                (index, item)
            }))
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::{Error, Sequence, SequenceExt, from_stream, iter};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Slow {
        next: u32,
        end: u32,
    }

    impl Sequence for Slow {
        type Item = u32;

        fn pull(&mut self) -> futures::future::BoxFuture<'_, crate::Result<Option<u32>>> {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(1)).await;
                if self.next == self.end {
                    return Ok(None);
                }
                self.next += 1;
                Ok(Some(self.next - 1))
            })
        }
    }

    fn doubles(n: u32) -> impl Sequence<Item = u32> {
        iter([n, n * 2])
    }

    #[tokio::test]
    async fn test_map() {
        let out = iter(0..10).map(|n| n * 2).collect().await.unwrap();
        assert_eq!(out, vec![0, 2, 4, 6, 8, 10, 12, 14, 16, 18]);

        let out = Slow { next: 0, end: 10 }.map(|n| n * 2).collect().await.unwrap();
        assert_eq!(out, vec![0, 2, 4, 6, 8, 10, 12, 14, 16, 18]);
    }

    #[tokio::test]
    async fn test_flat_map() {
        let expected = vec![0, 0, 1, 2, 2, 4, 3, 6, 4, 8, 5, 10, 6, 12, 7, 14, 8, 16, 9, 18];
        let out = iter(0..10).flat_map(doubles).collect().await.unwrap();
        assert_eq!(out, expected);

        let out = Slow { next: 0, end: 10 }.flat_map(doubles).collect().await.unwrap();
        assert_eq!(out, expected);
    }

    #[tokio::test]
    async fn test_filter_and_filter_map() {
        let out = iter(0..10).filter(|n| n % 2 == 0).collect().await.unwrap();
        assert_eq!(out, vec![0, 2, 4, 6, 8]);

        let out = Slow { next: 0, end: 10 }
            .filter_map(|n| (n % 3 == 0).then_some(n * 10))
            .collect()
            .await
            .unwrap();
        assert_eq!(out, vec![0, 30, 60, 90]);
    }

    #[tokio::test]
    async fn test_chain_take_while_enumerate() {
        let out = iter([1, 2]).chain(iter([3])).collect().await.unwrap();
        assert_eq!(out, vec![1, 2, 3]);

        let out = iter(0..10).take_while(|n| *n < 3).collect().await.unwrap();
        assert_eq!(out, vec![0, 1, 2]);

        let out = iter(["a", "b"]).enumerate().collect().await.unwrap();
        assert_eq!(out, vec![(0, "a"), (1, "b")]);
    }

    #[tokio::test]
    async fn test_take_stops_pulling() {
        let pulls = Arc::new(AtomicUsize::new(0));
        let counted = {
            let pulls = pulls.clone();
            iter(0..100).map(move |n| {
                pulls.fetch_add(1, Ordering::SeqCst);
                n
            })
        };

        let mut taken = counted.take(3);
        assert_eq!(taken.collect().await.unwrap(), vec![0, 1, 2]);
        assert_eq!(taken.pull().await.unwrap(), None);
        assert_eq!(pulls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_errors_pass_through() {
        let source = from_stream(futures::stream::iter(vec![Ok(1), Err(Error::msg("bad"))]));
        let mut mapped = source.map(|n: i32| n + 1);
        assert_eq!(mapped.pull().await.unwrap(), Some(2));
        assert!(mapped.pull().await.is_err());
    }
}
