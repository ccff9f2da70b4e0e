use std::fmt;
use std::marker::PhantomData;
use crate::pull::Pull;
use crate::sequence::PullSequence;

/// A sequence that has already ended. Every pull resolves to `None`.
pub struct Empty<T> {
    _item: PhantomData<fn() -> T>,
}

pub fn empty<T>() -> Empty<T> {
    Empty { _item: PhantomData }
}

impl<T> PullSequence for Empty<T> {
    type Item = T;

    fn pull(&self) -> Pull<T> {
        Pull::ready(Ok(None))
    }
}

impl<T> Clone for Empty<T> {
    fn clone(&self) -> Self {
        empty()
    }
}

impl<T> Default for Empty<T> {
    fn default() -> Self {
        empty()
    }
}

impl<T> fmt::Debug for Empty<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Empty")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_never_yields() {
        let seq = empty::<String>();
        for _ in 0..3 {
            let pull = seq.pull();
            assert!(pull.is_resolved());
            assert_eq!(pull.wait().unwrap(), None);
        }
    }
}
