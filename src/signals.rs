//! Interrupt/signal handling for graceful shutdown
//!
//! The Ctrl+C handler only flips a flag. Retry loops and pre-step delays
//! sleep in short slices so they notice the flag promptly.

use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Shared cancellation flag. Clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    /// Sleep for `duration` unless the flag is raised first.
    ///
    /// Returns `false` when the sleep was cut short.
    pub fn sleep(&self, duration: Duration) -> bool {
        // None: the deadline is past what Instant can hold, so only the flag ends it
        let deadline = Instant::now().checked_add(duration);
        loop {
            if self.is_set() {
                return false;
            }
            let slice = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return true;
                    }
                    SLEEP_SLICE.min(deadline - now)
                }
                None => SLEEP_SLICE,
            };
            std::thread::sleep(slice);
        }
    }
}

/// Global flag for Ctrl+C interrupt handling
static INTERRUPTED: Lazy<InterruptFlag> = Lazy::new(InterruptFlag::new);

/// Handle to the process-wide flag
pub fn global() -> InterruptFlag {
    INTERRUPTED.clone()
}

/// Check if the application was interrupted (Ctrl+C pressed)
#[inline]
pub fn was_interrupted() -> bool {
    INTERRUPTED.is_set()
}

/// Set the interrupted flag (called from signal handler)
#[inline]
pub fn set_interrupted() {
    INTERRUPTED.set();
}

/// Reset the interrupted flag
#[inline]
pub fn reset_interrupted() {
    INTERRUPTED.reset();
}
