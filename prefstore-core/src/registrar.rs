//! Exactly-once default registration
//!
//! Every mandatory attribute owns one [`DefaultRegistrar`]. The first caller
//! to flip its flag performs the registration; everyone else returns at once
//! without waiting for that work to finish.

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct DefaultRegistrar {
    registered: AtomicBool,
}

impl DefaultRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether some caller has already claimed the registration.
    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    /// Run `register` if this call is the one that flips the flag.
    ///
    /// Returns `true` for the single winning call.
    pub fn register_if_needed<F: FnOnce()>(&self, register: F) -> bool {
        if self.is_registered() {
            return false;
        }
        if self
            .registered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        register();
        true
    }
}
