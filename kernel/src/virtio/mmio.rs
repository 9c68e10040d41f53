//! virtio-over-MMIO transport: device discovery, the status handshake,
//! feature negotiation, and virtqueue setup for both the legacy (v1) and
//! modern (v2) register layouts.

use super::queue::{Descriptor, QueueLayout, VirtQueue};
use crate::error::DriverError;
use crate::mm::bump;
use core::mem::size_of;

mod reg {
    pub const MAGIC: usize = 0x000;
    pub const VERSION: usize = 0x004;
    pub const DEVICE_ID: usize = 0x008;
    pub const DEVICE_FEATURES: usize = 0x010;
    pub const DEVICE_FEATURES_SEL: usize = 0x014;
    pub const DRIVER_FEATURES: usize = 0x020;
    pub const DRIVER_FEATURES_SEL: usize = 0x024;
    pub const GUEST_PAGE_SIZE: usize = 0x028;
    pub const QUEUE_SEL: usize = 0x030;
    pub const QUEUE_NUM_MAX: usize = 0x034;
    pub const QUEUE_NUM: usize = 0x038;
    pub const QUEUE_ALIGN: usize = 0x03c;
    pub const QUEUE_PFN: usize = 0x040;
    pub const QUEUE_READY: usize = 0x044;
    pub const QUEUE_NOTIFY: usize = 0x050;
    pub const STATUS: usize = 0x070;
    pub const QUEUE_DESC_LOW: usize = 0x080;
    pub const QUEUE_DESC_HIGH: usize = 0x084;
    pub const QUEUE_AVAIL_LOW: usize = 0x090;
    pub const QUEUE_AVAIL_HIGH: usize = 0x094;
    pub const QUEUE_USED_LOW: usize = 0x0a0;
    pub const QUEUE_USED_HIGH: usize = 0x0a4;
    pub const CONFIG: usize = 0x100;
}

const MAGIC_VALUE: u32 = 0x7472_6976;
const MMIO_REGION_BASE: usize = 0x1000_1000;
const MMIO_REGION_STRIDE: usize = 0x1000;
const MMIO_SCAN_COUNT: usize = 32;
const GUEST_PAGE_SIZE: usize = 4096;

pub const STATUS_ACKNOWLEDGE: u32 = 1;
pub const STATUS_DRIVER: u32 = 2;
pub const STATUS_DRIVER_OK: u32 = 4;
pub const STATUS_FEATURES_OK: u32 = 8;
pub const STATUS_FAILED: u32 = 128;

fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

unsafe fn zero(ptr: *mut u8, len: usize) {
    // SAFETY: callers pass a freshly bump-allocated region of exactly `len`
    // bytes, not yet observed by the device.
    unsafe { core::ptr::write_bytes(ptr, 0, len) };
}

/// A discovered virtio-mmio device register window.
pub struct MmioTransport {
    base: usize,
    pub version: u32,
}

impl MmioTransport {
    fn read32(&self, offset: usize) -> u32 {
        // SAFETY: `base` was validated by `find_device` to carry the virtio
        // magic number; `offset` is one of the fixed register offsets below.
        unsafe { core::ptr::read_volatile((self.base + offset) as *const u32) }
    }

    fn write32(&self, offset: usize, value: u32) {
        // SAFETY: see `read32`.
        unsafe { core::ptr::write_volatile((self.base + offset) as *mut u32, value) };
    }

    /// Scan the fixed MMIO window for a device carrying `device_id`.
    pub fn find_device(device_id: u32) -> Option<Self> {
        for i in 0..MMIO_SCAN_COUNT {
            let base = MMIO_REGION_BASE + i * MMIO_REGION_STRIDE;
            let candidate = Self { base, version: 0 };
            if candidate.read32(reg::MAGIC) != MAGIC_VALUE {
                continue;
            }
            if candidate.read32(reg::DEVICE_ID) != device_id {
                continue;
            }
            let version = candidate.read32(reg::VERSION);
            return Some(Self { base, version });
        }
        None
    }

    /// Reset the device, then raise ACKNOWLEDGE and DRIVER.
    pub fn reset_and_acknowledge(&self) {
        self.write32(reg::STATUS, 0);
        super::fence();
        self.write32(reg::STATUS, STATUS_ACKNOWLEDGE);
        self.write32(reg::STATUS, STATUS_ACKNOWLEDGE | STATUS_DRIVER);
    }

    /// Negotiate the intersection of `wanted` with what the device offers,
    /// across both 32-bit feature halves, and confirm FEATURES_OK.
    pub fn negotiate(&self, wanted: u64) -> Result<(), DriverError> {
        self.write32(reg::DEVICE_FEATURES_SEL, 0);
        let low = self.read32(reg::DEVICE_FEATURES) as u64;
        self.write32(reg::DEVICE_FEATURES_SEL, 1);
        let high = self.read32(reg::DEVICE_FEATURES) as u64;
        let device_features = low | (high << 32);
        let accepted = device_features & wanted;

        self.write32(reg::DRIVER_FEATURES_SEL, 0);
        self.write32(reg::DRIVER_FEATURES, accepted as u32);
        self.write32(reg::DRIVER_FEATURES_SEL, 1);
        self.write32(reg::DRIVER_FEATURES, (accepted >> 32) as u32);

        let status = self.read32(reg::STATUS);
        self.write32(reg::STATUS, status | STATUS_FEATURES_OK);
        super::fence();

        let status = self.read32(reg::STATUS);
        if status & STATUS_FEATURES_OK == 0 {
            self.write32(reg::STATUS, status | STATUS_FAILED);
            return Err(DriverError::FeaturesNotAccepted);
        }
        Ok(())
    }

    /// Raise DRIVER_OK, completing the handshake.
    pub fn set_driver_ok(&self) {
        let status = self.read32(reg::STATUS);
        self.write32(reg::STATUS, status | STATUS_DRIVER_OK);
    }

    /// Carve out and register the regions for virtqueue `queue_index`,
    /// clamping `desired_size` to the device's `QueueNumMax` and, separately,
    /// to this kernel's hard ceiling of 64 descriptors — whichever is lower.
    pub fn setup_queue(&self, queue_index: u32, desired_size: u16) -> Option<VirtQueue> {
        const HARD_CEILING: u32 = 64;
        self.write32(reg::QUEUE_SEL, queue_index);
        let max = self.read32(reg::QUEUE_NUM_MAX);
        if max == 0 {
            return None;
        }
        let queue_size = core::cmp::min(core::cmp::min(desired_size as u32, max), HARD_CEILING) as u16;
        let layout = QueueLayout::for_size(queue_size);
        self.write32(reg::QUEUE_NUM, queue_size as u32);

        let (descriptor, avail, used) = if self.version >= 2 {
            self.setup_queue_modern(&layout)?
        } else {
            self.setup_queue_legacy(&layout)?
        };

        let free_next =
            bump::allocate_aligned(size_of::<u16>() * queue_size as usize, 2) as *mut u16;
        if free_next.is_null() {
            return None;
        }

        // SAFETY: `descriptor`/`avail`/`used` were just allocated and zeroed
        // at sizes matching `layout`, and `free_next` has `queue_size` slots.
        Some(unsafe { VirtQueue::new(queue_index, queue_size, descriptor, avail, used, free_next) })
    }

    fn setup_queue_modern(&self, layout: &QueueLayout) -> Option<(*mut Descriptor, *mut u8, *const u8)> {
        let descriptor = bump::allocate_aligned(layout.descriptor_bytes, 16);
        let avail = bump::allocate_aligned(layout.available_bytes, 2);
        let used = bump::allocate_aligned(layout.used_bytes, 4);
        if descriptor.is_null() || avail.is_null() || used.is_null() {
            return None;
        }
        // SAFETY: each region was just allocated at the matching size.
        unsafe {
            zero(descriptor, layout.descriptor_bytes);
            zero(avail, layout.available_bytes);
            zero(used, layout.used_bytes);
        }

        let descriptor_addr = descriptor as usize as u64;
        let avail_addr = avail as usize as u64;
        let used_addr = used as usize as u64;

        self.write32(reg::QUEUE_DESC_LOW, descriptor_addr as u32);
        self.write32(reg::QUEUE_DESC_HIGH, (descriptor_addr >> 32) as u32);
        self.write32(reg::QUEUE_AVAIL_LOW, avail_addr as u32);
        self.write32(reg::QUEUE_AVAIL_HIGH, (avail_addr >> 32) as u32);
        self.write32(reg::QUEUE_USED_LOW, used_addr as u32);
        self.write32(reg::QUEUE_USED_HIGH, (used_addr >> 32) as u32);
        self.write32(reg::QUEUE_READY, 1);

        Some((descriptor as *mut Descriptor, avail, used))
    }

    fn setup_queue_legacy(&self, layout: &QueueLayout) -> Option<(*mut Descriptor, *mut u8, *const u8)> {
        let avail_off = layout.descriptor_bytes;
        let used_off = align_up(avail_off + layout.available_bytes, GUEST_PAGE_SIZE);
        let total = align_up(used_off + layout.used_bytes, GUEST_PAGE_SIZE);

        let region = bump::allocate_aligned(total, GUEST_PAGE_SIZE);
        if region.is_null() {
            return None;
        }
        // SAFETY: `region` was just allocated at size `total`.
        unsafe { zero(region, total) };

        self.write32(reg::GUEST_PAGE_SIZE, GUEST_PAGE_SIZE as u32);
        self.write32(reg::QUEUE_ALIGN, GUEST_PAGE_SIZE as u32);
        self.write32(reg::QUEUE_PFN, (region as usize / GUEST_PAGE_SIZE) as u32);

        // SAFETY: `avail_off`/`used_off` are within `total`, computed above.
        let avail = unsafe { region.add(avail_off) };
        let used = unsafe { region.add(used_off) };
        Some((region as *mut Descriptor, avail, used))
    }

    pub fn notify_queue(&self, queue_index: u32) {
        self.write32(reg::QUEUE_NOTIFY, queue_index);
    }

    /// Pointer to the device-specific configuration space past the common
    /// register block.
    pub fn config_ptr(&self) -> *const u8 {
        (self.base + reg::CONFIG) as *const u8
    }
}
