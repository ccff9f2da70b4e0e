//! Errors surfaced through [`Pull`](crate::Pull) futures.
//!
//! [`SequenceError::ConcurrentPull`] is the only usage error. Every other variant carries a
//! failure raised by producer code, delivered exactly once to the pull that resumed the
//! producer when it failed.

use std::error::Error as StdError;
use thiserror::Error;

/// Boxed error type accepted from producer bodies.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SequenceError {
    /// `pull()` was called while the previous pull was still unresolved.
    /// The earlier pull is not affected.
    #[error("an item was requested before the previous pull completed")]
    ConcurrentPull,

    /// The producer body (or a sequence it delegated to) returned an error.
    #[error("producer failed: {0}")]
    Producer(BoxError),

    /// The producer body panicked while it was being resumed.
    #[error("producer panicked: {message}")]
    Panicked {
        /// The panic payload if it was a string, otherwise a placeholder.
        message: String,
    },
}

impl SequenceError {
    /// Wraps any producer error.
    pub fn producer<E: Into<BoxError>>(error: E) -> Self {
        SequenceError::Producer(error.into())
    }

    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            SequenceError::ConcurrentPull => "sequence_concurrent_pull",
            SequenceError::Producer(_) => "sequence_producer_failed",
            SequenceError::Panicked { .. } => "sequence_producer_panicked",
        }
    }

    /// Indicates whether the error was caused by the consumer rather than by the producer.
    pub fn is_usage_error(&self) -> bool {
        matches!(self, SequenceError::ConcurrentPull)
    }

    /// Returns the error raised by the producer, if any.
    pub fn producer_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        match self {
            SequenceError::Producer(error) => Some(error.as_ref()),
            _ => None,
        }
    }

    /// Attempts to downcast the producer error to a concrete type.
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.producer_error().and_then(|error| error.downcast_ref::<E>())
    }

    /// Converts a caught panic payload into [`SequenceError::Panicked`].
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(message) = payload.downcast_ref::<&'static str>() {
            (*message).to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "<non-string panic payload>".to_string()
        };

        SequenceError::Panicked { message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct Spiked;

    impl fmt::Display for Spiked {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("the punch has been spiked")
        }
    }

    impl StdError for Spiked {}

    #[test]
    fn test_labels() {
        assert_eq!(SequenceError::ConcurrentPull.as_label(), "sequence_concurrent_pull");
        assert_eq!(SequenceError::producer(Spiked).as_label(), "sequence_producer_failed");
        let panicked = SequenceError::Panicked { message: "boom".into() };
        assert_eq!(panicked.as_label(), "sequence_producer_panicked");
    }

    #[test]
    fn test_usage_error() {
        assert!(SequenceError::ConcurrentPull.is_usage_error());
        assert!(!SequenceError::producer("nope").is_usage_error());
    }

    #[test]
    fn test_downcast_producer_error() {
        let err = SequenceError::producer(Spiked);
        assert!(err.downcast_ref::<Spiked>().is_some());
        assert_eq!(err.to_string(), "producer failed: the punch has been spiked");
        assert!(SequenceError::ConcurrentPull.producer_error().is_none());
    }

    #[test]
    fn test_from_panic_payloads() {
        let err = SequenceError::from_panic(Box::new("static message"));
        assert_eq!(err.to_string(), "producer panicked: static message");

        let err = SequenceError::from_panic(Box::new(String::from("owned message")));
        assert_eq!(err.to_string(), "producer panicked: owned message");

        let err = SequenceError::from_panic(Box::new(42_u32));
        assert_eq!(err.to_string(), "producer panicked: <non-string panic payload>");
    }
}
