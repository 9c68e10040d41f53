//! Diagnostic-only error taxonomy.
//!
//! Driver internals (§4.1-§4.6) report failure by return value — a null
//! pointer from the allocator, `false`/`None` from a device call — the way
//! the polling model expects. [`DriverError`] exists purely so boot-path and
//! TUI log lines have a consistent, named thing to log instead of ad hoc
//! strings; nothing downstream matches on its variants to make a decision.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverError {
    /// No virtio-mmio slot in the scan range carried the requested device id.
    DeviceNotFound { device_id: u32 },
    /// The device rejected feature negotiation (required bits unsupported).
    FeaturesNotAccepted,
    /// A virtqueue command timed out waiting for a used-ring entry.
    CommandTimedOut,
    /// The GPU reported a display with no enabled scanout.
    NoActiveDisplay,
    /// The bump allocator is exhausted.
    OutOfMemory,
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::DeviceNotFound { device_id } => {
                write!(f, "no virtio-mmio device with id {device_id}")
            }
            DriverError::FeaturesNotAccepted => write!(f, "device rejected feature negotiation"),
            DriverError::CommandTimedOut => write!(f, "virtqueue command timed out"),
            DriverError::NoActiveDisplay => write!(f, "gpu reports no enabled scanout"),
            DriverError::OutOfMemory => write!(f, "bump allocator exhausted"),
        }
    }
}
