use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use futures::Stream;
use futures::stream::FusedStream;
use crate::error::SequenceError;
use crate::pull::Pull;
use crate::sequence::PullSequence;

/// A [`Stream`] over a [`PullSequence`]. Yields `Err` at most once, then ends.
pub struct SequenceStream<S: PullSequence> {
    seq: S,
    pending: Option<Pull<S::Item>>,
    done: bool,
}

impl<S: PullSequence> Unpin for SequenceStream<S> {}

impl<S: PullSequence> SequenceStream<S> {
    pub fn new(seq: S) -> Self {
        Self { seq, pending: None, done: false }
    }

    pub fn get_ref(&self) -> &S {
        &self.seq
    }

    pub fn into_inner(self) -> S {
        self.seq
    }
}

pub fn into_stream<S: PullSequence>(seq: S) -> SequenceStream<S> {
    SequenceStream::new(seq)
}

impl<S: PullSequence> Stream for SequenceStream<S> {
    type Item = Result<S::Item, SequenceError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        let pending = this.pending.get_or_insert_with(|| this.seq.pull());
        let outcome = match Pin::new(pending).poll(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(outcome) => outcome,
        };

        this.pending = None;
        match outcome {
            Ok(Some(item)) => Poll::Ready(Some(Ok(item))),
            Ok(None) => {
                this.done = true;
                Poll::Ready(None)
            }
            Err(err) => {
                this.done = true;
                Poll::Ready(Some(Err(err)))
            }
        }
    }
}

impl<S: PullSequence> FusedStream for SequenceStream<S> {
    fn is_terminated(&self) -> bool {
        self.done
    }
}

impl<S: PullSequence + fmt::Debug> fmt::Debug for SequenceStream<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequenceStream")
            .field("seq", &self.seq)
            .field("pending", &self.pending)
            .field("done", &self.done)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use futures::executor::block_on;
    use futures::StreamExt;
    use crate::ops::from_iter;
    use crate::Sequence;
    use super::*;

    #[test]
    fn test_stream_collects() {
        let items: Vec<_> = block_on(into_stream(from_iter(0..3)).collect());
        assert_eq!(items.into_iter().map(Result::unwrap).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_stream_ends_after_error() {
        let seq = Sequence::new(|co| async move {
            co.emit(1u8).await;
            if std::hint::black_box(true) {
                panic!("lost");
            }
        });

        let mut stream = seq.into_stream();
        block_on(async {
            assert_eq!(stream.next().await.unwrap().unwrap(), 1);
            let err = stream.next().await.unwrap().unwrap_err();
            assert!(matches!(err, SequenceError::Panicked { ref message } if message == "lost"));
            assert!(stream.next().await.is_none());
            assert!(stream.is_terminated());
        });
    }
}
