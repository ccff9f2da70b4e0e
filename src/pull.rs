//! The handle returned by a pull.
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use crate::sync::{Outcome, Slot};

enum PullInner<T> {
    /// Settled before `pull()` returned. `None` once the outcome was taken.
    Ready(Option<Outcome<T>>),
    Waiting(Arc<Slot<T>>),
}

/// The pending result of one pull.
///
/// Resolves to `Ok(Some(item))`, to `Ok(None)` when the sequence has ended,
/// or to an error. A pull that was answered while the producer ran synchronously
/// is already resolved and never allocates a completion slot.
///
/// A `Pull` is consumed by exactly one of: awaiting it, [`Pull::wait`], or [`Pull::on_complete`].
/// Dropping it without consuming it is allowed; the sequence stays usable.
#[must_use = "a pull does nothing unless its result is consumed"]
pub struct Pull<T> {
    inner: PullInner<T>,
}

impl<T> Unpin for Pull<T> {}

impl<T> Pull<T> {
    pub(crate) fn ready(outcome: Outcome<T>) -> Self {
        Self { inner: PullInner::Ready(Some(outcome)) }
    }

    pub(crate) fn waiting(slot: Arc<Slot<T>>) -> Self {
        Self { inner: PullInner::Waiting(slot) }
    }

    /// Returns `true` if the result is available without waiting.
    pub fn is_resolved(&self) -> bool {
        match &self.inner {
            PullInner::Ready(outcome) => outcome.is_some(),
            PullInner::Waiting(slot) => slot.is_settled(),
        }
    }

    /// Blocks the current thread until the result is available.
    ///
    /// Must not be called from the producer of the same sequence.
    pub fn wait(self) -> Outcome<T> {
        match self.inner {
            PullInner::Ready(Some(outcome)) => outcome,
            PullInner::Ready(None) => panic!("the pull result has already been taken"),
            PullInner::Waiting(slot) => slot.wait(),
        }
    }

    /// Registers a continuation that receives the result.
    ///
    /// The continuation runs inline on the thread that settles the pull, or on the current
    /// thread if the result is already available. No task or executor is involved.
    pub fn on_complete<F>(self, f: F)
    where
        F: FnOnce(Outcome<T>) + Send + 'static,
    {
        match self.inner {
            PullInner::Ready(Some(outcome)) => f(outcome),
            PullInner::Ready(None) => panic!("the pull result has already been taken"),
            PullInner::Waiting(slot) => slot.on_settled(Box::new(f)),
        }
    }
}

impl<T> Future for Pull<T> {
    type Output = Outcome<T>;

    /// # Panics
    ///
    /// If polled again after it returned `Poll::Ready`.
    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().inner {
            PullInner::Ready(outcome) => match outcome.take() {
                Some(outcome) => Poll::Ready(outcome),
                None => panic!("`Pull` polled after completion"),
            },
            PullInner::Waiting(slot) => slot.poll_take(cx),
        }
    }
}

impl<T> fmt::Debug for Pull<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.inner {
            PullInner::Ready(Some(_)) => "ready",
            PullInner::Ready(None) => "taken",
            PullInner::Waiting(slot) if slot.is_settled() => "settled",
            PullInner::Waiting(_) => "waiting",
        };

        f.debug_struct("Pull").field("state", &state).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::thread;
    use futures::task::noop_waker_ref;
    use crate::error::SequenceError;
    use super::*;

    #[test]
    fn test_ready_pull() {
        let mut pull = Pull::ready(Ok(Some(3)));
        assert!(pull.is_resolved());

        let mut cx = Context::from_waker(noop_waker_ref());
        assert!(matches!(Pin::new(&mut pull).poll(&mut cx), Poll::Ready(Ok(Some(3)))));
        assert!(!pull.is_resolved());
    }

    #[test]
    #[should_panic(expected = "polled after completion")]
    fn test_poll_after_completion_panics() {
        let mut pull = Pull::<u8>::ready(Ok(None));
        let mut cx = Context::from_waker(noop_waker_ref());
        let _ = Pin::new(&mut pull).poll(&mut cx);
        let _ = Pin::new(&mut pull).poll(&mut cx);
    }

    #[test]
    fn test_waiting_pull_wait() {
        let slot = Arc::new(Slot::new());
        let pull = Pull::waiting(slot.clone());
        assert!(!pull.is_resolved());

        let handle = thread::spawn(move || pull.wait());
        slot.settle(Ok(Some("x"))).unwrap();
        assert_eq!(handle.join().unwrap().unwrap(), Some("x"));
    }

    #[test]
    fn test_on_complete_runs_on_settling_thread() {
        let slot = Arc::new(Slot::new());
        let (tx, rx) = mpsc::channel();
        Pull::<u8>::waiting(slot.clone()).on_complete(move |outcome| {
            tx.send((thread::current().id(), outcome.is_err())).unwrap();
        });
        assert!(rx.try_recv().is_err());

        let settler = thread::spawn(move || {
            slot.settle(Err(SequenceError::ConcurrentPull)).unwrap();
            thread::current().id()
        });
        let settler_id = settler.join().unwrap();

        let (ran_on, failed) = rx.recv().unwrap();
        assert_eq!(ran_on, settler_id);
        assert!(failed);
    }

    #[test]
    fn test_on_complete_ready_runs_inline() {
        let (tx, rx) = mpsc::channel();
        Pull::ready(Ok(Some(1))).on_complete(move |outcome| tx.send(outcome.unwrap()).unwrap());
        assert_eq!(rx.try_recv().unwrap(), Some(1));
    }
}
