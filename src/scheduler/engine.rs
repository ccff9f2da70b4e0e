//! The engine behind every [`Sequence`](crate::Sequence).
//!
//! The engine:
//!
//! - owns the suspended producer and resumes it when a pull is outstanding;
//!
//! - interprets the [`YieldMarker`] the producer suspends with and settles the outstanding pull;
//!
//! - forwards the items of a spliced sequence while the producer waits at the splice point.
//!
//! No thread is owned by the engine. The producer is resumed by the thread calling
//! [`Engine::pull`] or by whichever thread wakes the engine after a true suspension.
use std::cell::UnsafeCell;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::{Acquire, Release};
use std::task::{Context, Poll};
use crossbeam_utils::Backoff;
use futures::task::{waker_ref, ArcWake};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};
use crate::cfg::EngineCfg;
use crate::coroutine::{MarkerChannel, ProducerImpl, YieldMarker};
use crate::error::{BoxError, SequenceError};
use crate::local::AmbientContext;
use crate::pull::Pull;
use crate::sequence::BoxSequence;
use crate::sync::{DriveState, Outcome, RequestState, Slot};

/// Where the result of the outstanding pull has to go.
struct Handoff<T> {
    /// `true` while [`Engine::pull`] is resuming the producer on its own thread.
    /// Results settled in this window are returned from `pull()` directly.
    sync_window: bool,
    ready: Option<Outcome<T>>,
    slot: Option<Arc<Slot<T>>>,
}

/// A spliced sequence and its in-flight pull.
struct Nested<T> {
    source: BoxSequence<T>,
    pending: Option<Pull<T>>,
}

/// A settled slot whose consumer is notified once the drive state is released.
type Deferred<T> = (Arc<Slot<T>>, Outcome<T>);

/// State touched only by the thread that owns the [`DriveState`].
struct Core<T> {
    producer: Option<ProducerImpl>,
    nested: Option<Nested<T>>,
    ambient: AmbientContext,
    /// The producer truly suspended during its final resumption and still has cleanup to run.
    cleanup: bool,
    /// Slot continuations may call back into the engine, so they never run while it is driven.
    deferred: Vec<Deferred<T>>,
}

/// What a single resumption of the producer ended with.
enum Resumption<T> {
    Suspended(Option<YieldMarker<T>>),
    Returned(Result<(), BoxError>),
    Panicked(SequenceError),
}

pub(crate) struct Engine<T> {
    name: Option<String>,
    cfg: EngineCfg,
    request: RequestState,
    drive: DriveState,
    terminated: AtomicBool,
    handoff: Mutex<Handoff<T>>,
    channel: Arc<MarkerChannel<T>>,
    core: UnsafeCell<Core<T>>,
}

// SAFETY: `core` is only accessed by the thread that entered `drive`; everything else is
// either atomic or behind a mutex.
unsafe impl<T: Send> Send for Engine<T> {}
unsafe impl<T: Send> Sync for Engine<T> {}

impl<T> Engine<T> {
    pub(crate) fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("anonymous")
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.terminated.load(Acquire)
    }

    fn complete(&self, deferred: Vec<Deferred<T>>) {
        for (slot, outcome) in deferred {
            if slot.settle(outcome).is_err() {
                warn!(sequence = self.label(), "completion slot was already settled");
            }
        }
    }
}

impl<T: Send + 'static> Engine<T> {
    pub(crate) fn new(
        name: Option<String>,
        cfg: EngineCfg,
        ambient: AmbientContext,
        channel: Arc<MarkerChannel<T>>,
        producer: ProducerImpl,
    ) -> Self {
        Self {
            name,
            cfg,
            request: RequestState::new(),
            drive: DriveState::new(),
            terminated: AtomicBool::new(false),
            handoff: Mutex::new(Handoff { sync_window: false, ready: None, slot: None }),
            channel,
            core: UnsafeCell::new(Core {
                producer: Some(producer),
                nested: None,
                ambient,
                cleanup: false,
                deferred: Vec::new(),
            }),
        }
    }

    /// Requests the next item.
    pub(crate) fn pull(self: &Arc<Self>) -> Pull<T> {
        if self.is_terminated() {
            trace!(sequence = self.label(), "pull on a terminated sequence");
            return Pull::ready(Ok(None));
        }

        if !self.request.try_request() {
            debug!(sequence = self.label(), "pull requested before the previous one completed");
            return Pull::ready(Err(SequenceError::ConcurrentPull));
        }

        // `close()` may have won the race between the two checks above.
        if self.is_terminated() {
            self.request.release();
            return Pull::ready(Ok(None));
        }

        trace!(sequence = self.label(), fast_path = self.cfg.fast_path, "pull");

        if !self.cfg.fast_path {
            let slot = Arc::new(Slot::new());
            self.handoff.lock().slot = Some(slot.clone());
            self.drive();
            return Pull::waiting(slot);
        }

        {
            let mut handoff = self.handoff.lock();
            handoff.sync_window = true;
            handoff.ready = None;
        }

        self.drive();

        let mut handoff = self.handoff.lock();
        handoff.sync_window = false;
        if let Some(outcome) = handoff.ready.take() {
            return Pull::ready(outcome);
        }

        let slot = Arc::new(Slot::new());
        handoff.slot = Some(slot.clone());
        Pull::waiting(slot)
    }

    /// Terminates the sequence and drops the suspended producer,
    /// which runs its `Drop`-based cleanup on this thread.
    pub(crate) fn close(self: &Arc<Self>) -> Result<(), SequenceError> {
        if !self.request.try_request() {
            return Err(SequenceError::ConcurrentPull);
        }

        let was_terminated = self.terminated.swap(true, Release);

        // Only knock once the driver is gone, so it is not kept stepping by our notifications.
        let backoff = Backoff::new();
        while !(self.drive.is_idle() && self.drive.try_enter()) {
            backoff.snooze();
        }

        // SAFETY: this thread owns the drive state.
        let core = unsafe { &mut *self.core.get() };
        let had_producer = core.producer.is_some();
        core.cleanup = false;
        Self::drop_producer(core);
        drop(std::mem::take(&mut core.ambient));

        while !self.drive.try_leave() {}
        self.request.release();

        if !was_terminated || had_producer {
            debug!(sequence = self.label(), "sequence closed");
        }

        Ok(())
    }

    /// Resumes the producer until it settles the outstanding pull or truly suspends.
    fn drive(self: &Arc<Self>) {
        if !self.drive.try_enter() {
            return;
        }

        let mut guard = AbandonOnUnwind { engine: self, deferred: Vec::new() };
        let waker = waker_ref(self);
        let mut cx = Context::from_waker(&waker);

        loop {
            // SAFETY: this thread owns the drive state.
            let core = unsafe { &mut *self.core.get() };
            self.step(core, &mut cx);
            guard.deferred.append(&mut core.deferred);

            if self.drive.try_leave() {
                break;
            }
        }

        let deferred = guard.disarm();
        self.complete(deferred);
    }

    fn step(&self, core: &mut Core<T>, cx: &mut Context<'_>) {
        if core.cleanup {
            self.run_cleanup(core, cx);
            return;
        }

        if self.is_terminated() || !self.request.is_requested() {
            // Nothing to resume for; a stale wake must not advance the producer.
            return;
        }

        loop {
            if let Some(nested) = core.nested.as_mut() {
                let polled = if self.cfg.catch_panics {
                    panic::catch_unwind(AssertUnwindSafe(|| Self::poll_nested(&mut *nested, &mut *cx)))
                } else {
                    Ok(Self::poll_nested(nested, cx))
                };

                let poll = match polled {
                    Ok(poll) => poll,
                    Err(payload) => {
                        core.nested = None;
                        self.on_fault(core, SequenceError::from_panic(payload));
                        return;
                    }
                };

                match poll {
                    Poll::Pending => return,
                    Poll::Ready(Ok(Some(item))) => {
                        nested.pending = None;
                        self.on_emit(core, item);
                        return;
                    }
                    Poll::Ready(Ok(None)) => {
                        trace!(sequence = self.label(), "spliced sequence ended");
                        core.nested = None;
                    }
                    Poll::Ready(Err(err)) => {
                        core.nested = None;
                        let err = match err {
                            SequenceError::ConcurrentPull => SequenceError::producer(
                                "the spliced sequence was pulled by someone else",
                            ),
                            err => err,
                        };
                        self.on_fault(core, err);
                        return;
                    }
                }
            }

            let Some(producer) = core.producer.as_mut() else {
                warn!(sequence = self.label(), "pull outstanding without a producer");
                self.terminated.store(true, Release);
                self.settle(core, Ok(None));
                return;
            };

            trace!(sequence = self.label(), "resume");
            match self.resume(producer, &mut core.ambient, cx) {
                Resumption::Suspended(None) => return,
                Resumption::Suspended(Some(YieldMarker::Emit(item))) => {
                    self.on_emit(core, item);
                    return;
                }
                Resumption::Suspended(Some(YieldMarker::End)) => {
                    self.on_end(core, cx);
                    return;
                }
                Resumption::Suspended(Some(YieldMarker::Splice(source))) => {
                    trace!(sequence = self.label(), "splicing a nested sequence");
                    core.nested = Some(Nested { source, pending: None });
                }
                Resumption::Returned(Ok(())) => {
                    core.producer = None;
                    self.terminated.store(true, Release);
                    debug!(sequence = self.label(), "producer returned; sequence ended");
                    self.settle(core, Ok(None));
                    return;
                }
                Resumption::Returned(Err(err)) => {
                    self.on_fault(core, SequenceError::Producer(err));
                    return;
                }
                Resumption::Panicked(err) => {
                    self.on_fault(core, err);
                    return;
                }
            }
        }
    }

    fn poll_nested(nested: &mut Nested<T>, cx: &mut Context<'_>) -> Poll<Outcome<T>> {
        let pending = nested.pending.get_or_insert_with(|| nested.source.pull());
        Pin::new(pending).poll(cx)
    }

    /// Polls the producer once with its ambient context installed.
    fn resume(
        &self,
        producer: &mut ProducerImpl,
        ambient: &mut AmbientContext,
        cx: &mut Context<'_>,
    ) -> Resumption<T> {
        let _scope = ambient.enter();
        let _driver = self.channel.enter();

        let poll = if self.cfg.catch_panics {
            panic::catch_unwind(AssertUnwindSafe(|| producer.as_mut().poll(cx)))
        } else {
            Ok(producer.as_mut().poll(cx))
        };

        let marker = self.channel.take();
        match poll {
            Ok(Poll::Pending) => Resumption::Suspended(marker),
            Ok(Poll::Ready(result)) => {
                if let Some(marker) = marker {
                    warn!(sequence = self.label(), marker = marker.kind(), "discarding a marker left behind by a finished producer");
                }
                Resumption::Returned(result)
            }
            Err(payload) => Resumption::Panicked(SequenceError::from_panic(payload)),
        }
    }

    fn on_emit(&self, core: &mut Core<T>, item: T) {
        trace!(sequence = self.label(), "item emitted");
        self.settle(core, Ok(Some(item)));
    }

    fn on_end(&self, core: &mut Core<T>, cx: &mut Context<'_>) {
        self.terminated.store(true, Release);
        debug!(sequence = self.label(), "sequence finished");

        // Resume once more so the code after the end marker runs before the pull resolves.
        self.run_cleanup(core, cx);
        self.settle(core, Ok(None));
    }

    fn on_fault(&self, core: &mut Core<T>, err: SequenceError) {
        self.terminated.store(true, Release);
        core.cleanup = false;
        Self::drop_producer(core);
        debug!(sequence = self.label(), error = %err, label = err.as_label(), "sequence failed");
        self.settle(core, Err(err));
    }

    /// Resumes a terminated producer so it can clean up. Whatever it does besides
    /// returning is discarded.
    fn run_cleanup(&self, core: &mut Core<T>, cx: &mut Context<'_>) {
        core.nested = None;
        let Some(producer) = core.producer.as_mut() else {
            core.cleanup = false;
            return;
        };

        match self.resume(producer, &mut core.ambient, cx) {
            Resumption::Suspended(None) => {
                core.cleanup = true;
                return;
            }
            Resumption::Suspended(Some(marker)) => {
                warn!(sequence = self.label(), marker = marker.kind(), "discarding a marker reached after the end of the sequence");
            }
            Resumption::Returned(Ok(())) => {}
            Resumption::Returned(Err(err)) => {
                warn!(sequence = self.label(), error = %err, "producer failed after the end of the sequence");
            }
            Resumption::Panicked(err) => {
                warn!(sequence = self.label(), error = %err, "producer panicked after the end of the sequence");
            }
        }

        core.cleanup = false;
        Self::drop_producer(core);
    }

    fn drop_producer(core: &mut Core<T>) {
        let producer = core.producer.take();
        let nested = core.nested.take();
        let _scope = core.ambient.enter();
        drop(nested);
        drop(producer);
    }

    /// Hands `outcome` to the outstanding pull and makes the engine idle again.
    ///
    /// The request is released while the hand-off is locked, so a pull racing with this call
    /// can never pick up a result meant for an earlier one. A detached slot is settled only
    /// after the drive state is released.
    fn settle(&self, core: &mut Core<T>, outcome: Outcome<T>) {
        let mut handoff = self.handoff.lock();
        if handoff.sync_window {
            handoff.ready = Some(outcome);
            self.request.release();
            return;
        }

        let slot = handoff.slot.take();
        self.request.release();
        drop(handoff);

        match slot {
            Some(slot) => core.deferred.push((slot, outcome)),
            None => warn!(sequence = self.label(), "dropping a result settled without an outstanding pull"),
        }
    }
}

impl<T> Drop for Engine<T> {
    fn drop(&mut self) {
        let label = self.name.as_deref().unwrap_or("anonymous");
        let core = self.core.get_mut();
        let producer = core.producer.take();
        let nested = core.nested.take();
        if producer.is_some() || nested.is_some() {
            trace!(sequence = label, "dropping a suspended producer");
        }

        let _scope = core.ambient.enter();
        drop(nested);
        drop(producer);
    }
}

impl<T: Send + 'static> ArcWake for Engine<T> {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.drive();
    }
}

/// Leaves a panicking engine terminated instead of stuck in the running state,
/// and fails the pull that was waiting on the panicking resumption.
struct AbandonOnUnwind<'a, T> {
    engine: &'a Engine<T>,
    deferred: Vec<Deferred<T>>,
}

impl<T> AbandonOnUnwind<'_, T> {
    fn disarm(mut self) -> Vec<Deferred<T>> {
        let deferred = std::mem::take(&mut self.deferred);
        std::mem::forget(self);
        deferred
    }
}

impl<T> Drop for AbandonOnUnwind<'_, T> {
    fn drop(&mut self) {
        let engine = self.engine;
        engine.terminated.store(true, Release);

        // SAFETY: the unwinding thread still owns the drive state.
        let core = unsafe { &mut *engine.core.get() };
        let mut deferred = std::mem::take(&mut self.deferred);
        deferred.append(&mut core.deferred);
        core.cleanup = false;

        let panicked = SequenceError::Panicked {
            message: "the producer panicked while panics were not caught".to_string(),
        };
        {
            let mut handoff = engine.handoff.lock();
            if handoff.sync_window {
                handoff.ready.get_or_insert(Err(panicked));
            } else if let Some(slot) = handoff.slot.take() {
                deferred.push((slot, Err(panicked)));
            }
            engine.request.release();
        }

        engine.drive.abandon();
        warn!(sequence = engine.label(), "sequence abandoned by a panicking resumption");
        engine.complete(deferred);
    }
}
