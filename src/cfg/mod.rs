//! Process-wide defaults for new sequences.
//!
//! Every [`Sequence`](crate::Sequence) copies these values when it is built.
//! Use [`SequenceBuilder`](crate::SequenceBuilder) to override them for a single sequence.
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::{Acquire, Release};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EngineCfg {
    /// Return already-known results from `pull()` without allocating a completion slot
    /// when the producer reaches a yield marker synchronously.
    pub fast_path: bool,
    /// Turn panics raised inside a producer body into
    /// [`SequenceError::Panicked`](crate::SequenceError::Panicked) instead of unwinding
    /// through the thread that resumed it.
    pub catch_panics: bool,
}

impl EngineCfg {
    pub const fn default() -> Self {
        Self {
            fast_path: true,
            catch_panics: true,
        }
    }
}

impl Default for EngineCfg {
    fn default() -> Self {
        EngineCfg::default()
    }
}

static FAST_PATH: AtomicBool = AtomicBool::new(EngineCfg::default().fast_path);
static CATCH_PANICS: AtomicBool = AtomicBool::new(EngineCfg::default().catch_panics);

pub fn config_fast_path() -> bool {
    FAST_PATH.load(Acquire)
}

pub fn config_catch_panics() -> bool {
    CATCH_PANICS.load(Acquire)
}

/// Returns a snapshot of the current defaults.
pub fn config() -> EngineCfg {
    EngineCfg {
        fast_path: config_fast_path(),
        catch_panics: config_catch_panics(),
    }
}

pub fn set_fast_path(fast_path: bool) {
    FAST_PATH.store(fast_path, Release)
}

pub fn set_catch_panics(catch_panics: bool) {
    CATCH_PANICS.store(catch_panics, Release)
}

pub fn set_config(config: EngineCfg) {
    set_fast_path(config.fast_path);
    set_catch_panics(config.catch_panics);
}
