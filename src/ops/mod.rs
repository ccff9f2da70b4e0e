//! Helpers built only on [`PullSequence::pull`](crate::PullSequence::pull).
pub mod drain;
pub mod empty;
pub mod iter;
pub mod stream;

pub use drain::{for_each, for_each_with, to_boxed_slice, to_vec};
pub use empty::{empty, Empty};
pub use iter::{from_iter, FromIter};
pub use stream::{into_stream, SequenceStream};
