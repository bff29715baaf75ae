//! Pull-based asynchronous sequences, with the plumbing needed to feed them
//! from push-style sources and to consume them from several places at once.
//!
//! The core abstraction is [`Sequence`]: an async source that hands out one
//! value per [`pull`](Sequence::pull) and then reports end or failure. Around
//! it sit:
//!
//! * [`bridge`] / [`bridge_with`]: turn event-driven producers into a
//!   sequence, resolving concurrent pulls strictly in issue order.
//! * [`tee`] / [`partition`]: fan one upstream out to independently paced
//!   branches, pulling the upstream exactly once per value.
//! * [`split_when`]: cut a sequence into a head and a tail at a boundary value.
//! * [`ByteReader`]: read exact sizes and delimited frames out of a sequence
//!   of byte chunks, such as [`ReadChunks`] over a tokio `AsyncRead`.
//! * [`SequenceExt`]: the usual combinators plus deadlines
//!   ([`take_for`](SequenceExt::take_for)) and completion signalling
//!   ([`alerting`](SequenceExt::alerting)).
//!
//! ```rust,ignore
//! let (tx, rx) = eddy::bridge::<u32>();
//! tx.push(1);
//! tx.push(2);
//! tx.end();
//!
//! let mut doubled = rx.map(|n| n * 2);
//! assert_eq!(doubled.collect().await?, vec![2, 4]);
//! ```

mod alert;
mod bridge;
mod byte_reader;
mod combinators;
mod error;
mod fanout;
mod gate;
mod ids;
mod io;
mod sequence;
mod split;
mod timing;

pub use crate::alert::{Alerting, Completion};
pub use crate::bridge::{Bridge, PendingPull, Producer, bridge, bridge_with};
pub use crate::byte_reader::ByteReader;
pub use crate::combinators::{Chain, Enumerate, Filter, FilterMap, FlatMap, Map, Take, TakeWhile};
pub use crate::error::{Error, Result};
pub use crate::fanout::{Branch, Partition, Route, Tee, partition, tee};
pub use crate::gate::{Flight, Gate};
pub use crate::io::{DEFAULT_CHUNK_SIZE, ReadChunks, byte_reader};
pub use crate::sequence::{
    BoxSequence, FromStream, Iter, Sequence, SequenceExt, from_stream, into_stream, iter,
};
pub use crate::split::{Head, Tail, split_when};
pub use crate::timing::TakeUntil;
