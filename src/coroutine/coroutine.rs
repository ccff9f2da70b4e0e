//! This module contains a description of [`ProducerImpl`] and [`IntoOutcome`].
use std::future::Future;
use std::pin::Pin;
use crate::error::BoxError;

/// The alias for [`Pin`]<[`Box`]<dyn [`Future`]>> returning the producer's outcome.
/// The engine works only with this type of the producers.
pub type ProducerImpl = Pin<Box<dyn Future<Output = Result<(), BoxError>> + Send>>;

/// Values a producer body may finish with.
///
/// `()` means the body ran to completion. `Result<(), E>` lets the body fail with `?`;
/// the error is delivered to the pull that resumed the producer.
pub trait IntoOutcome {
    fn into_outcome(self) -> Result<(), BoxError>;

    /// The value of a body that ran to completion.
    fn finished() -> Self;
}

impl IntoOutcome for () {
    fn into_outcome(self) -> Result<(), BoxError> {
        Ok(())
    }

    fn finished() -> Self {}
}

impl<E: Into<BoxError>> IntoOutcome for Result<(), E> {
    fn into_outcome(self) -> Result<(), BoxError> {
        self.map_err(Into::into)
    }

    fn finished() -> Self {
        Ok(())
    }
}
