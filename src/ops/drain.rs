//! Consumers that pull a sequence until it ends.
//!
//! Each helper awaits one pull before making the next, so none of them can trigger
//! [`SequenceError::ConcurrentPull`] on its own. The first failure stops the drain and is returned.
use crate::error::SequenceError;
use crate::sequence::PullSequence;

pub async fn to_vec<S>(seq: &S) -> Result<Vec<S::Item>, SequenceError>
where
    S: PullSequence + ?Sized,
{
    let mut items = Vec::new();
    while let Some(item) = seq.pull().await? {
        items.push(item);
    }

    Ok(items)
}

pub async fn to_boxed_slice<S>(seq: &S) -> Result<Box<[S::Item]>, SequenceError>
where
    S: PullSequence + ?Sized,
{
    to_vec(seq).await.map(Vec::into_boxed_slice)
}

/// Calls `f` with every item of `seq`.
pub async fn for_each<S, F>(seq: &S, mut f: F) -> Result<(), SequenceError>
where
    S: PullSequence + ?Sized,
    F: FnMut(S::Item),
{
    while let Some(item) = seq.pull().await? {
        f(item);
    }

    Ok(())
}

/// Calls `f` with `state` and every item of `seq`, then hands the state back.
pub async fn for_each_with<S, St, F>(seq: &S, mut state: St, mut f: F) -> Result<St, SequenceError>
where
    S: PullSequence + ?Sized,
    F: FnMut(&mut St, S::Item),
{
    while let Some(item) = seq.pull().await? {
        f(&mut state, item);
    }

    Ok(state)
}

#[cfg(test)]
mod tests {
    use futures::executor::block_on;
    use crate::ops::{empty, from_iter};
    use crate::Sequence;
    use super::*;

    #[test]
    fn test_to_vec() {
        assert_eq!(block_on(to_vec(&from_iter(1..=4))).unwrap(), vec![1, 2, 3, 4]);
        assert!(block_on(to_vec(&empty::<u8>())).unwrap().is_empty());
    }

    #[test]
    fn test_to_boxed_slice() {
        let items = block_on(to_boxed_slice(&from_iter(["x", "y"]))).unwrap();
        assert_eq!(&*items, &["x", "y"]);
    }

    #[test]
    fn test_for_each_with_state() {
        let sum = block_on(for_each_with(&from_iter(1..=10), 0, |sum, i| *sum += i)).unwrap();
        assert_eq!(sum, 55);

        let mut seen = Vec::new();
        block_on(for_each(&from_iter("abc".chars()), |c| seen.push(c))).unwrap();
        assert_eq!(seen, ['a', 'b', 'c']);
    }

    #[test]
    fn test_failure_stops_the_drain() {
        let seq = Sequence::new(|co| async move {
            co.emit(1).await;
            Err::<(), _>("broken")
        });

        let err = block_on(to_vec(&seq)).unwrap_err();
        assert!(matches!(err, SequenceError::Producer(_)));
        assert_eq!(err.to_string(), "producer failed: broken");
    }
}
