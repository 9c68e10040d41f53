//! Single-direction bump allocator.
//!
//! Carves memory out of the region between the end of the loaded image and a
//! 64 KiB guard below the boot stack. Never frees; every caller holds its
//! allocation for the kernel's lifetime. Not thread-safe by design — this
//! kernel never runs more than one hart.

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

const STACK_GUARD: usize = 64 * 1024;

fn align_up(value: usize, align: usize) -> usize {
    let align = if align == 0 { 1 } else { align };
    (value + align - 1) & !(align - 1)
}

/// A bump region: a cursor that only moves forward and a hard limit it must
/// never cross.
pub struct BumpAllocator {
    cursor: AtomicUsize,
    limit: AtomicUsize,
}

impl BumpAllocator {
    pub const fn new() -> Self {
        Self {
            cursor: AtomicUsize::new(0),
            limit: AtomicUsize::new(0),
        }
    }

    /// (Re-)arm the allocator over `[start, limit)`. Idempotent by convention
    /// of the caller; this type itself does not track whether it has already
    /// been armed.
    pub fn reset(&self, start: usize, limit: usize) {
        self.cursor.store(align_up(start, 16), Ordering::Relaxed);
        self.limit.store(limit, Ordering::Relaxed);
    }

    /// Bump-allocate `size` bytes aligned to `align`, or return null if doing
    /// so would cross the limit.
    pub fn allocate_aligned(&self, size: usize, align: usize) -> *mut u8 {
        if size == 0 {
            return core::ptr::null_mut();
        }

        let cursor = self.cursor.load(Ordering::Relaxed);
        let aligned = align_up(cursor, align);
        let limit = self.limit.load(Ordering::Relaxed);

        match aligned.checked_add(size) {
            Some(end) if end <= limit => {
                self.cursor.store(end, Ordering::Relaxed);
                aligned as *mut u8
            }
            _ => core::ptr::null_mut(),
        }
    }
}

impl Default for BumpAllocator {
    fn default() -> Self {
        Self::new()
    }
}

static ALLOCATOR: BumpAllocator = BumpAllocator::new();
static INITIALIZED: AtomicBool = AtomicBool::new(false);

#[cfg(target_os = "none")]
extern "C" {
    static __bss_end: u8;
    static __stack_top: u8;
}

/// Arm the global allocator from the linker-provided image bounds. Idempotent.
#[cfg(target_os = "none")]
pub fn init() {
    if INITIALIZED.swap(true, Ordering::AcqRel) {
        return;
    }

    // SAFETY: `__bss_end` and `__stack_top` are symbols defined by the linker
    // script marking the end of the loaded image and the top of the boot
    // stack; taking their address (not their value) is always valid.
    let image_end = unsafe { &__bss_end as *const u8 as usize };
    // SAFETY: see above.
    let stack_top = unsafe { &__stack_top as *const u8 as usize };

    log::debug!("mm: image_end=0x{image_end:x} stack_top=0x{stack_top:x}");
    ALLOCATOR.reset(image_end, stack_top - STACK_GUARD);
}

#[cfg(not(target_os = "none"))]
pub fn init() {
    // Hosted builds have no linker-provided bounds; unit tests exercise
    // `BumpAllocator` directly against a local buffer instead.
}

/// Allocate from the global bump region.
pub fn allocate_aligned(size: usize, align: usize) -> *mut u8 {
    ALLOCATOR.allocate_aligned(size, align)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bumps_forward_and_aligns() {
        let a = BumpAllocator::new();
        a.reset(1, 4096);

        let p1 = a.allocate_aligned(10, 16);
        assert_eq!(p1 as usize % 16, 0);

        let p2 = a.allocate_aligned(10, 16);
        assert!(p2 as usize > p1 as usize);
        assert_eq!(p2 as usize % 16, 0);
    }

    #[test]
    fn refuses_to_cross_the_limit() {
        let a = BumpAllocator::new();
        a.reset(0, 16);

        assert!(!a.allocate_aligned(16, 1).is_null());
        assert!(a.allocate_aligned(1, 1).is_null());
    }

    #[test]
    fn zero_size_is_always_null() {
        let a = BumpAllocator::new();
        a.reset(0, 4096);
        assert!(a.allocate_aligned(0, 16).is_null());
    }
}
