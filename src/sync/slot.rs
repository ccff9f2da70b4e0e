//! The completion slot: a single-assignment cell that hands one pull result from the
//! thread that settles it to the consumer waiting on it.
//!
//! All of the engine's own state is published before [`Slot::settle`] takes the slot lock,
//! so a consumer woken by the slot always observes it.
use std::fmt;
use std::task::{Context, Poll, Waker};
use parking_lot::{Condvar, Mutex};
use crate::error::SequenceError;

/// The result of one pull: an item, the end of the sequence, or a failure.
pub type Outcome<T> = Result<Option<T>, SequenceError>;

/// Continuation registered with [`Slot::on_settled`]. Runs on the settling thread.
pub type Callback<T> = Box<dyn FnOnce(Outcome<T>) + Send>;

enum SlotState<T> {
    Empty {
        waker: Option<Waker>,
        callback: Option<Callback<T>>,
    },
    Settled(Outcome<T>),
    Taken,
}

pub struct Slot<T> {
    state: Mutex<SlotState<T>>,
    settled: Condvar,
}

impl<T> Slot<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::Empty { waker: None, callback: None }),
            settled: Condvar::new(),
        }
    }

    /// Settles the slot. A slot can be settled at most once; the outcome is handed back
    /// if it was settled already.
    pub fn settle(&self, outcome: Outcome<T>) -> Result<(), Outcome<T>> {
        let mut state = self.state.lock();
        let (waker, callback) = match &mut *state {
            SlotState::Empty { waker, callback } => (waker.take(), callback.take()),
            _ => return Err(outcome),
        };

        if let Some(callback) = callback {
            *state = SlotState::Taken;
            drop(state);
            callback(outcome);
            return Ok(());
        }

        *state = SlotState::Settled(outcome);
        self.settled.notify_all();
        drop(state);

        if let Some(waker) = waker {
            waker.wake();
        }

        Ok(())
    }

    pub fn is_settled(&self) -> bool {
        !matches!(*self.state.lock(), SlotState::Empty { .. })
    }

    /// Takes the outcome if the slot is settled, otherwise remembers the waker.
    ///
    /// # Panics
    ///
    /// If the outcome was already taken.
    pub fn poll_take(&self, cx: &mut Context<'_>) -> Poll<Outcome<T>> {
        let mut state = self.state.lock();
        if let SlotState::Empty { waker, .. } = &mut *state {
            match waker {
                Some(waker) if waker.will_wake(cx.waker()) => {}
                _ => *waker = Some(cx.waker().clone()),
            }
            return Poll::Pending;
        }

        match std::mem::replace(&mut *state, SlotState::Taken) {
            SlotState::Settled(outcome) => Poll::Ready(outcome),
            _ => panic!("the pull result has already been taken"),
        }
    }

    /// Blocks the calling thread until the slot is settled and takes the outcome.
    ///
    /// # Panics
    ///
    /// If the outcome was already taken.
    pub fn wait(&self) -> Outcome<T> {
        let mut state = self.state.lock();
        while matches!(*state, SlotState::Empty { .. }) {
            self.settled.wait(&mut state);
        }

        match std::mem::replace(&mut *state, SlotState::Taken) {
            SlotState::Settled(outcome) => outcome,
            _ => panic!("the pull result has already been taken"),
        }
    }

    /// Runs `callback` with the outcome on whichever thread settles the slot,
    /// or right away if it is settled already.
    pub fn on_settled(&self, callback: Callback<T>) {
        let mut state = self.state.lock();
        if let SlotState::Empty { callback: slot_callback, .. } = &mut *state {
            *slot_callback = Some(callback);
            return;
        }

        match std::mem::replace(&mut *state, SlotState::Taken) {
            SlotState::Settled(outcome) => {
                drop(state);
                callback(outcome);
            }
            _ => panic!("the pull result has already been taken"),
        }
    }
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot").field("settled", &self.is_settled()).finish()
    }
}
