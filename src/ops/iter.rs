use std::fmt;
use parking_lot::Mutex;
use crate::pull::Pull;
use crate::sequence::PullSequence;

/// A sequence over an iterator. Every pull resolves immediately.
pub struct FromIter<I> {
    iter: Mutex<I>,
}

pub fn from_iter<I: IntoIterator>(iter: I) -> FromIter<I::IntoIter> {
    FromIter { iter: Mutex::new(iter.into_iter()) }
}

impl<I> PullSequence for FromIter<I>
where
    I: Iterator + Send,
{
    type Item = I::Item;

    fn pull(&self) -> Pull<I::Item> {
        Pull::ready(Ok(self.iter.lock().next()))
    }
}

impl<I> fmt::Debug for FromIter<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FromIter").finish_non_exhaustive()
    }
}
