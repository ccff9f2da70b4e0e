//! This module contains [`Co`], the producer's side of a [`Sequence`](crate::Sequence),
//! and the three marker futures it hands out.
//!
//! Marker futures carry no real asynchronous wait. The first poll leaves the marker in the
//! channel shared with the engine and returns [`Poll::Pending`]; the engine picks the marker
//! up as soon as the producer's poll returns. The next poll, which only the engine performs,
//! completes the marker future.
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::thread::{self, ThreadId};
use parking_lot::Mutex;
use crate::coroutine::{IntoOutcome, YieldMarker};
use crate::sequence::PullSequence;

const SUSPENSION_MISUSE: &str = "suspension misuse: a yield marker was awaited outside of the engine driving its sequence";

struct ChannelState<T> {
    marker: Option<YieldMarker<T>>,
    driver: Option<ThreadId>,
}

/// The single-marker mailbox shared by a producer and its engine.
pub(crate) struct MarkerChannel<T> {
    state: Mutex<ChannelState<T>>,
}

impl<T> MarkerChannel<T> {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(ChannelState { marker: None, driver: None }),
        }
    }

    /// Marks the current thread as the one resuming the producer until the guard is dropped.
    pub(crate) fn enter(&self) -> DriverGuard<'_, T> {
        self.state.lock().driver = Some(thread::current().id());
        DriverGuard { channel: self }
    }

    pub(crate) fn take(&self) -> Option<YieldMarker<T>> {
        self.state.lock().marker.take()
    }

    /// # Panics
    ///
    /// If the producer is not being resumed by its engine on this thread,
    /// or if another marker is already waiting to be picked up.
    fn deposit(&self, marker: YieldMarker<T>) {
        let mut state = self.state.lock();
        if state.driver != Some(thread::current().id()) {
            drop(state);
            panic!("{SUSPENSION_MISUSE}");
        }

        if let Some(waiting) = &state.marker {
            let waiting = waiting.kind();
            drop(state);
            panic!("{SUSPENSION_MISUSE} (a `{waiting}` marker is already pending in this resumption)");
        }

        state.marker = Some(marker);
    }
}

pub(crate) struct DriverGuard<'a, T> {
    channel: &'a MarkerChannel<T>,
}

impl<T> Drop for DriverGuard<'_, T> {
    fn drop(&mut self) {
        self.channel.state.lock().driver = None;
    }
}

/// The producer's handle to its sequence.
///
/// # Example
///
/// ```
/// use seq_engine::{Co, Sequence};
///
/// let numbers = Sequence::new(|co: Co<u32>| async move {
///     for i in 0..3 {
///         co.emit(i).await;
///     }
///     co.finish().await;
/// });
/// # drop(numbers);
/// ```
pub struct Co<T> {
    channel: Arc<MarkerChannel<T>>,
}

impl<T> Co<T> {
    pub(crate) fn new(channel: Arc<MarkerChannel<T>>) -> Self {
        Self { channel }
    }

    /// Suspends the producer and delivers `item` to the outstanding pull.
    /// Completes when the consumer pulls again.
    pub fn emit(&self, item: T) -> Emit<T> {
        Emit {
            channel: self.channel.clone(),
            item: Some(item),
        }
    }

    /// Suspends the producer and ends the sequence.
    ///
    /// The producer is resumed exactly once more, so code after `finish().await` runs,
    /// but nothing it emits afterwards reaches the consumer.
    pub fn finish(&self) -> Finish<T> {
        self.finish_with()
    }

    /// Like [`finish`](Co::finish), but completes with the value a finished body returns,
    /// so it can end a fallible body: `return co.finish_with().await;`.
    pub fn finish_with<R: IntoOutcome>(&self) -> Finish<T, R> {
        Finish {
            channel: self.channel.clone(),
            suspended: false,
            _output: PhantomData,
        }
    }

    /// Suspends the producer and forwards every item of `nested`, one per pull.
    /// Completes once `nested` ends. A failure of `nested` terminates this sequence.
    pub fn delegate_to<S>(&self, nested: S) -> Delegate<T>
    where
        S: PullSequence<Item = T> + 'static,
    {
        Delegate {
            channel: self.channel.clone(),
            marker: Some(YieldMarker::Splice(Box::new(nested))),
        }
    }
}

impl<T> Clone for Co<T> {
    fn clone(&self) -> Self {
        Self {
            channel: self.channel.clone(),
        }
    }
}

/// Future returned by [`Co::emit`].
#[must_use = "markers do nothing unless awaited"]
pub struct Emit<T> {
    channel: Arc<MarkerChannel<T>>,
    item: Option<T>,
}

impl<T> Unpin for Emit<T> {}

impl<T> Future for Emit<T> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        match this.item.take() {
            Some(item) => {
                this.channel.deposit(YieldMarker::Emit(item));
                Poll::Pending
            }
            None => Poll::Ready(()),
        }
    }
}

/// Future returned by [`Co::finish`].
#[must_use = "markers do nothing unless awaited"]
pub struct Finish<T, R = ()> {
    channel: Arc<MarkerChannel<T>>,
    suspended: bool,
    _output: PhantomData<fn() -> R>,
}

impl<T, R: IntoOutcome> Future for Finish<T, R> {
    type Output = R;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<R> {
        let this = self.get_mut();
        if this.suspended {
            return Poll::Ready(R::finished());
        }

        this.channel.deposit(YieldMarker::End);
        this.suspended = true;
        Poll::Pending
    }
}

/// Future returned by [`Co::delegate_to`].
#[must_use = "markers do nothing unless awaited"]
pub struct Delegate<T> {
    channel: Arc<MarkerChannel<T>>,
    marker: Option<YieldMarker<T>>,
}

impl<T> Unpin for Delegate<T> {}

impl<T> Future for Delegate<T> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        match this.marker.take() {
            Some(marker) => {
                this.channel.deposit(marker);
                Poll::Pending
            }
            None => Poll::Ready(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::task::noop_waker_ref;

    fn poll_once<F: Future + Unpin>(future: &mut F) -> Poll<F::Output> {
        let mut cx = Context::from_waker(noop_waker_ref());
        Pin::new(future).poll(&mut cx)
    }

    #[test]
    fn test_emit_deposits_then_completes() {
        let channel = Arc::new(MarkerChannel::new());
        let co = Co::new(channel.clone());
        let mut emit = co.emit(42);

        let guard = channel.enter();
        assert!(poll_once(&mut emit).is_pending());
        assert!(matches!(channel.take(), Some(YieldMarker::Emit(42))));
        assert!(poll_once(&mut emit).is_ready());
        drop(guard);
    }

    #[test]
    fn test_finish_deposits_end() {
        let channel: Arc<MarkerChannel<u8>> = Arc::new(MarkerChannel::new());
        let co = Co::new(channel.clone());
        let mut finish = co.finish();

        let _guard = channel.enter();
        assert!(poll_once(&mut finish).is_pending());
        assert!(matches!(channel.take(), Some(YieldMarker::End)));
        assert!(poll_once(&mut finish).is_ready());
    }

    #[test]
    fn test_finish_with_completes_with_finished_value() {
        let channel: Arc<MarkerChannel<u8>> = Arc::new(MarkerChannel::new());
        let co = Co::new(channel.clone());
        let mut finish = co.finish_with::<Result<(), std::io::Error>>();

        let _guard = channel.enter();
        assert!(poll_once(&mut finish).is_pending());
        assert!(matches!(channel.take(), Some(YieldMarker::End)));
        assert!(matches!(poll_once(&mut finish), Poll::Ready(Ok(()))));
    }

    #[test]
    #[should_panic(expected = "suspension misuse")]
    fn test_marker_outside_engine_panics() {
        let channel = Arc::new(MarkerChannel::new());
        let co = Co::new(channel);
        let mut emit = co.emit(1);
        let _ = poll_once(&mut emit);
    }

    #[test]
    #[should_panic(expected = "already pending")]
    fn test_two_markers_in_one_resumption_panic() {
        let channel = Arc::new(MarkerChannel::new());
        let co = Co::new(channel.clone());
        let mut first = co.emit(1);
        let mut second = co.emit(2);

        let _guard = channel.enter();
        let _ = poll_once(&mut first);
        let _ = poll_once(&mut second);
    }

    #[test]
    #[should_panic(expected = "suspension misuse")]
    fn test_marker_after_guard_dropped_panics() {
        let channel: Arc<MarkerChannel<u8>> = Arc::new(MarkerChannel::new());
        let co = Co::new(channel.clone());
        drop(channel.enter());
        let mut finish = co.finish();
        let _ = poll_once(&mut finish);
    }
}
