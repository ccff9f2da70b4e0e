//! # [`coroutine`]
//!
//! This module contains a description of [`ProducerImpl`] and [`IntoOutcome`] for working with the engine.
//! This module is used for low-level work with the engine.
//!
//! # [`yielding`]
//! This module contains [`Co`], the handle a producer body uses to talk to the engine.
//!
//! # [`yield_status`]
//! This module contains a description of [`YieldMarker`] for low-level work with the engine.
//! Please use the methods of [`Co`] if it is possible.

pub mod coroutine;
pub mod yielding;
pub mod yield_status;

pub use coroutine::*;
pub use yielding::*;
pub use yield_status::*;
