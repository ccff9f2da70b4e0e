//! Lazy, pull-based asynchronous sequences.
//!
//! A [`Sequence`] wraps a producer body that suspends at yield markers. Each
//! [`pull`](Sequence::pull) resumes the producer until it emits an item, finishes,
//! or splices a nested sequence, and resolves with what it reached.
//!
//! ```rust
//! use seq_engine::{ops, Sequence};
//!
//! let evens = Sequence::new(|co| async move {
//!     for i in 0..5u32 {
//!         if i % 2 == 0 {
//!             co.emit(i).await;
//!         }
//!     }
//! });
//!
//! let items = futures::executor::block_on(ops::to_vec(&evens)).unwrap();
//! assert_eq!(items, vec![0, 2, 4]);
//! ```
extern crate self as seq_engine;

pub mod cfg;
pub mod coroutine;
pub mod error;
pub mod local;
pub mod macros;
pub mod ops;
pub mod pull;
mod scheduler;
pub mod sequence;
pub mod sync;

pub use coroutine::{Co, Delegate, Emit, Finish, IntoOutcome, YieldMarker};
pub use error::{BoxError, SequenceError};
pub use local::AmbientContext;
pub use pull::Pull;
pub use sequence::{BoxSequence, PullSequence, Sequence, SequenceBuilder};
pub use sync::Outcome;
pub use seq_proc::sequence;
