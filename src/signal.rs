//! # Wake signal
//!
//! The only state which is shared with the interrupt context of the serial driver. All protocol state
//! (ledger, packet queue, session) is owned by the foreground [Adapter](crate::wifi::Adapter).
//!
//! ````
//! use spwf_at_nal::signal::WakeSignal;
//!
//! static WAKE: WakeSignal = WakeSignal::new();
//!
//! fn on_serial_rx_interrupt() {
//!     WAKE.notify();
//! }
//! # on_serial_rx_interrupt();
//! ````
use core::cell::Cell;
use core::sync::atomic::{AtomicBool, Ordering};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

/// Signal released by the "data arrived" notification of the transport
pub struct WakeSignal {
    /// Set by the foreground while it waits for the signal
    release_requested: AtomicBool,

    /// Set by the notification context, consumed by the foreground
    released: AtomicBool,

    /// User callback invoked on every notification. Function pointers have no atomic type, so the
    /// callback is guarded by a critical section, held only for copying the pointer in or out.
    callback: Mutex<CriticalSectionRawMutex, Cell<Option<fn()>>>,
}

impl WakeSignal {
    pub const fn new() -> Self {
        Self {
            release_requested: AtomicBool::new(false),
            released: AtomicBool::new(false),
            callback: Mutex::new(Cell::new(None)),
        }
    }

    /// Needs to be called by the transport whenever new bytes arrived. Safe to call from interrupt context.
    pub fn notify(&self) {
        if self.release_requested.load(Ordering::Acquire) {
            self.released.store(true, Ordering::Release);
        }

        if let Some(callback) = self.callback.lock(|cell| cell.get()) {
            callback();
        }
    }

    /// Registers (or removes) the user notification callback. Briefly enters a critical section.
    pub fn attach(&self, callback: Option<fn()>) {
        self.callback.lock(|cell| cell.set(callback));
    }

    /// Enables/Disables releasing the signal on notification. Disabling drops a pending release.
    pub(crate) fn request_release(&self, enabled: bool) {
        self.release_requested.store(enabled, Ordering::Release);

        if !enabled {
            self.released.store(false, Ordering::Release);
        }
    }

    /// Returns true if released since the last call. Consumes the release.
    pub(crate) fn take(&self) -> bool {
        if !self.released.load(Ordering::Acquire) {
            return false;
        }

        self.released.store(false, Ordering::Release);
        true
    }

    /// True while the foreground waits for a release
    pub fn is_release_requested(&self) -> bool {
        self.release_requested.load(Ordering::Acquire)
    }
}

impl Default for WakeSignal {
    fn default() -> Self {
        Self::new()
    }
}
