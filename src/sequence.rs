//! This module contains a description of [`PullSequence`], [`Sequence`] and [`SequenceBuilder`].
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use crate::cfg::{self, EngineCfg};
use crate::coroutine::{Co, IntoOutcome, MarkerChannel, ProducerImpl};
use crate::error::SequenceError;
use crate::local::AmbientContext;
use crate::ops::SequenceStream;
use crate::pull::Pull;
use crate::scheduler::Engine;

/// Anything that hands out items one pull at a time.
///
/// Implementors must answer at most one outstanding pull and resolve every pull made while
/// another one is outstanding with [`SequenceError::ConcurrentPull`].
pub trait PullSequence: Send + Sync {
    type Item;

    fn pull(&self) -> Pull<Self::Item>;
}

/// A type-erased [`PullSequence`], as spliced by [`Co::delegate_to`].
pub type BoxSequence<T> = Box<dyn PullSequence<Item = T>>;

impl<S: PullSequence + ?Sized> PullSequence for Box<S> {
    type Item = S::Item;

    fn pull(&self) -> Pull<Self::Item> {
        (**self).pull()
    }
}

impl<S: PullSequence + ?Sized> PullSequence for Arc<S> {
    type Item = S::Item;

    fn pull(&self) -> Pull<Self::Item> {
        (**self).pull()
    }
}

impl<S: PullSequence + ?Sized> PullSequence for &S {
    type Item = S::Item;

    fn pull(&self) -> Pull<Self::Item> {
        (**self).pull()
    }
}

/// A lazy sequence backed by a producer body.
///
/// Nothing of the producer runs until the first [`pull`](Sequence::pull). Every pull resumes
/// the producer up to its next yield marker:
///
/// - [`Co::emit`] resolves the pull with the item;
///
/// - [`Co::finish`] (or returning from the body) resolves it with `None`, and so does every later pull;
///
/// - [`Co::delegate_to`] resolves it and the following pulls with the items of a nested sequence.
///
/// A failing or panicking body resolves the pull with an error and terminates the sequence.
///
/// # Example
///
/// ```rust
/// use seq_engine::Sequence;
///
/// let squares = Sequence::new(|co| async move {
///     for i in 1..=3u32 {
///         co.emit(i * i).await;
///     }
/// });
///
/// assert_eq!(squares.pull().wait().unwrap(), Some(1));
/// assert_eq!(squares.pull().wait().unwrap(), Some(4));
/// assert_eq!(squares.pull().wait().unwrap(), Some(9));
/// assert_eq!(squares.pull().wait().unwrap(), None);
/// ```
pub struct Sequence<T> {
    engine: Arc<Engine<T>>,
}

impl<T: Send + 'static> Sequence<T> {
    /// Creates a sequence from a producer body with the process-wide defaults of [`cfg`]
    /// and the ambient context of the calling thread.
    pub fn new<F, Fut, O>(producer: F) -> Self
    where
        F: FnOnce(Co<T>) -> Fut + Send + 'static,
        Fut: Future<Output = O> + Send + 'static,
        O: IntoOutcome,
    {
        SequenceBuilder::new().build(producer)
    }

    /// Requests the next item. See [`Pull`] for the ways to consume the result.
    ///
    /// Pulling again before the previous pull resolved yields
    /// [`SequenceError::ConcurrentPull`] and leaves the outstanding pull untouched.
    pub fn pull(&self) -> Pull<T> {
        self.engine.pull()
    }

    /// Terminates the sequence early and drops the suspended producer on this thread,
    /// running the destructors of everything it holds.
    ///
    /// Fails with [`SequenceError::ConcurrentPull`] while a pull is outstanding.
    /// Every pull after a successful close resolves to `None`.
    pub fn close(&self) -> Result<(), SequenceError> {
        self.engine.close()
    }

    /// Returns `true` once the sequence has ended, failed or been closed.
    pub fn is_terminated(&self) -> bool {
        self.engine.is_terminated()
    }

    pub fn name(&self) -> Option<&str> {
        self.engine.name()
    }

    /// Adapts the sequence into a [`futures::Stream`].
    pub fn into_stream(self) -> SequenceStream<Self> {
        SequenceStream::new(self)
    }
}

impl<T: Send + 'static> PullSequence for Sequence<T> {
    type Item = T;

    fn pull(&self) -> Pull<T> {
        self.engine.pull()
    }
}

impl<T> fmt::Debug for Sequence<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sequence")
            .field("name", &self.engine.name())
            .field("terminated", &self.engine.is_terminated())
            .finish()
    }
}

/// Configures a single [`Sequence`].
///
/// Starts from the process-wide defaults of [`cfg`] and the ambient context of the thread
/// that created the builder.
#[derive(Clone, Debug)]
pub struct SequenceBuilder {
    name: Option<String>,
    cfg: EngineCfg,
    ambient: AmbientContext,
}

impl SequenceBuilder {
    pub fn new() -> Self {
        Self {
            name: None,
            cfg: cfg::config(),
            ambient: AmbientContext::current(),
        }
    }

    /// Names the sequence in log events.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn fast_path(mut self, fast_path: bool) -> Self {
        self.cfg.fast_path = fast_path;
        self
    }

    pub fn catch_panics(mut self, catch_panics: bool) -> Self {
        self.cfg.catch_panics = catch_panics;
        self
    }

    /// Returns the configuration the built sequence will use.
    pub fn config(&self) -> EngineCfg {
        self.cfg
    }

    /// Replaces the ambient context the producer runs in.
    pub fn context(mut self, ambient: AmbientContext) -> Self {
        self.ambient = ambient;
        self
    }

    pub fn build<T, F, Fut, O>(self, producer: F) -> Sequence<T>
    where
        T: Send + 'static,
        F: FnOnce(Co<T>) -> Fut + Send + 'static,
        Fut: Future<Output = O> + Send + 'static,
        O: IntoOutcome,
    {
        let channel = Arc::new(MarkerChannel::new());
        let co = Co::new(channel.clone());

        // Nothing runs before the first poll.
        let producer: ProducerImpl = Box::pin(async move { producer(co).await.into_outcome() });

        Sequence {
            engine: Arc::new(Engine::new(self.name, self.cfg, self.ambient, channel, producer)),
        }
    }
}

impl Default for SequenceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use futures::executor::block_on;
    use super::*;

    #[test]
    fn test_producer_is_lazy() {
        let started = Arc::new(AtomicUsize::new(0));
        let counter = started.clone();
        let seq = Sequence::new(move |co| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            co.emit(1).await;
        });
        assert_eq!(started.load(Ordering::SeqCst), 0);

        assert_eq!(block_on(seq.pull()).unwrap(), Some(1));
        assert_eq!(started.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_synchronous_pulls_are_resolved_immediately() {
        let seq = Sequence::new(|co| async move {
            co.emit("a").await;
            co.finish().await;
        });

        let first = seq.pull();
        assert!(first.is_resolved());
        assert_eq!(first.wait().unwrap(), Some("a"));

        let end = seq.pull();
        assert!(end.is_resolved());
        assert_eq!(end.wait().unwrap(), None);
        assert!(seq.is_terminated());
    }

    #[test]
    fn test_without_fast_path() {
        let seq = SequenceBuilder::new().fast_path(false).build(|co| async move {
            co.emit(7).await;
        });

        assert_eq!(seq.pull().wait().unwrap(), Some(7));
        assert_eq!(seq.pull().wait().unwrap(), None);
    }

    #[test]
    fn test_builder_name() {
        let seq: Sequence<u8> = SequenceBuilder::new().name("numbers").build(|_co| async {});
        assert_eq!(seq.name(), Some("numbers"));
        assert!(format!("{seq:?}").contains("numbers"));
    }

    #[test]
    fn test_boxed_sequence_pulls() {
        let boxed: BoxSequence<u8> = Box::new(Sequence::new(|co| async move {
            co.emit(5).await;
        }));
        assert_eq!(boxed.pull().wait().unwrap(), Some(5));
    }

    #[test]
    fn test_close_drops_producer() {
        struct Flag(Arc<AtomicUsize>);
        impl Drop for Flag {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let dropped = Arc::new(AtomicUsize::new(0));
        let flag = Flag(dropped.clone());
        let seq = Sequence::new(move |co| async move {
            let _flag = flag;
            for _ in 0.. {
                co.emit(()).await;
            }
        });

        assert_eq!(seq.pull().wait().unwrap(), Some(()));
        seq.close().unwrap();
        assert_eq!(dropped.load(Ordering::SeqCst), 1);
        assert!(seq.is_terminated());
        assert_eq!(seq.pull().wait().unwrap(), None);
    }
}
