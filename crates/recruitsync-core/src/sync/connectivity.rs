//! Connectivity capability
//!
//! The core consumes an "is this device online" signal sourced from the
//! execution environment; it never probes the network itself. Injected as
//! a capability so tests can flip it deterministically.

use std::sync::atomic::{AtomicBool, Ordering};

/// Boolean online/offline signal gating reconciliation and outbox drain.
pub trait ConnectivitySignal: Send + Sync {
    /// Whether the device currently has connectivity.
    fn is_online(&self) -> bool;
}

/// A settable connectivity signal.
///
/// The default source for environments without a platform signal, and the
/// in-memory fake for tests.
#[derive(Debug)]
pub struct StaticConnectivity {
    online: AtomicBool,
}

impl StaticConnectivity {
    #[must_use]
    pub const fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Relaxed);
    }
}

impl ConnectivitySignal for StaticConnectivity {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_connectivity_flips() {
        let signal = StaticConnectivity::new(true);
        assert!(signal.is_online());
        signal.set_online(false);
        assert!(!signal.is_online());
    }
}
