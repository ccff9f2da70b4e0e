//! This module contains a description of [`YieldMarker`] for low-level work with the engine.
//! Please use the methods of [`Co`](crate::Co) if it is possible.
use std::fmt;
use crate::sequence::BoxSequence;

/// The marker a producer hands to the engine when it suspends. This is the one way to
/// communicate with the engine. Markers are never observed by the consumer.
pub enum YieldMarker<T> {
    /// [`Emit`](YieldMarker::Emit) takes the item.
    ///
    /// If yielded, the item completes the outstanding pull and the producer stays
    /// suspended until the next pull.
    Emit(T),

    /// [`End`](YieldMarker::End) takes no arguments.
    ///
    /// If yielded, the sequence is terminated. The producer is resumed once more
    /// so the code after the marker can clean up.
    End,

    /// [`Splice`](YieldMarker::Splice) takes the nested sequence.
    ///
    /// If yielded, every item of the nested sequence is forwarded as if the producer
    /// had emitted it. The producer is resumed after the nested sequence ends.
    Splice(BoxSequence<T>),
}

impl<T> YieldMarker<T> {
    /// Create a YieldMarker variant [`Emit`](YieldMarker::Emit).
    pub fn emit(item: T) -> Self {
        YieldMarker::Emit(item)
    }

    /// Create a YieldMarker variant [`End`](YieldMarker::End).
    pub fn end() -> Self {
        YieldMarker::End
    }

    /// Create a YieldMarker variant [`Splice`](YieldMarker::Splice).
    pub fn splice(nested: BoxSequence<T>) -> Self {
        YieldMarker::Splice(nested)
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            YieldMarker::Emit(_) => "emit",
            YieldMarker::End => "end",
            YieldMarker::Splice(_) => "splice",
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for YieldMarker<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            YieldMarker::Emit(item) => f.debug_tuple("Emit").field(item).finish(),
            YieldMarker::End => f.write_str("End"),
            YieldMarker::Splice(_) => f.write_str("Splice(..)"),
        }
    }
}
