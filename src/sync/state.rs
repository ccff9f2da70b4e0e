//! Lock-free state words used by the sequence engine.
use std::sync::atomic::AtomicU8;
use std::sync::atomic::Ordering::{AcqRel, Acquire, Release};
use crossbeam_utils::CachePadded;

const IDLE: u8 = 0;
const REQUESTED: u8 = 1;

/// Guards the "at most one outstanding pull" invariant.
pub struct RequestState {
    state: CachePadded<AtomicU8>,
}

impl RequestState {
    pub const fn new() -> Self {
        Self {
            state: CachePadded::new(AtomicU8::new(IDLE)),
        }
    }

    /// Transitions `Idle -> Requested`. Returns `false` if a pull is already outstanding.
    #[inline(always)]
    pub fn try_request(&self) -> bool {
        self.state.compare_exchange(IDLE, REQUESTED, AcqRel, Acquire).is_ok()
    }

    /// Transitions back to `Idle`.
    #[inline(always)]
    pub fn release(&self) {
        self.state.store(IDLE, Release);
    }

    #[inline(always)]
    pub fn is_requested(&self) -> bool {
        self.state.load(Acquire) == REQUESTED
    }
}

impl Default for RequestState {
    fn default() -> Self {
        Self::new()
    }
}

const NOT_RUNNING: u8 = 0;
const RUNNING: u8 = 1;
const NOTIFIED: u8 = 2;

/// Makes sure that only one thread resumes a producer at a time.
///
/// A thread that finds the state busy only leaves a notification behind,
/// and the running thread steps the engine once more before it lets go.
pub struct DriveState {
    state: CachePadded<AtomicU8>,
}

impl DriveState {
    pub const fn new() -> Self {
        Self {
            state: CachePadded::new(AtomicU8::new(NOT_RUNNING)),
        }
    }

    /// Tries to become the driving thread. Returns `false` if another thread is driving;
    /// in that case the other thread is notified instead.
    #[inline(always)]
    pub fn try_enter(&self) -> bool {
        if self.state.fetch_or(NOTIFIED, AcqRel) != NOT_RUNNING {
            return false;
        }

        // Notifications that land before the first step are covered by that step.
        self.state.store(RUNNING, Release);
        true
    }

    /// Tries to stop driving. Returns `false` if a notification arrived while
    /// driving, in which case the caller must step again.
    #[inline(always)]
    pub fn try_leave(&self) -> bool {
        if self.state.compare_exchange(RUNNING, NOT_RUNNING, AcqRel, Acquire).is_ok() {
            return true;
        }

        self.state.store(RUNNING, Release);
        false
    }

    #[inline(always)]
    pub fn is_idle(&self) -> bool {
        self.state.load(Acquire) == NOT_RUNNING
    }

    /// Forgets the driving thread without stepping again. Used when the driver unwinds.
    pub fn abandon(&self) {
        self.state.store(NOT_RUNNING, Release);
    }
}

impl Default for DriveState {
    fn default() -> Self {
        Self::new()
    }
}
