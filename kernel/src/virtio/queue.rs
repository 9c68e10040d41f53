//! Split virtqueue engine.
//!
//! The descriptor table, available ring, and used ring are carved out of
//! bump-allocated memory at sizes computed from the negotiated queue depth —
//! never fixed-size arrays, since depth is only known once the device answers
//! `QueueNumMax`. Free descriptors are tracked by an auxiliary `free_next`
//! array terminated by the sentinel `0xFFFF`, independent of the descriptor
//! table's own `next` field (which only ever describes in-flight chains).

use core::mem::size_of;

pub const VIRTQ_DESC_F_NEXT: u16 = 1;
pub const VIRTQ_DESC_F_WRITE: u16 = 2;

const FREE_LIST_END: u16 = 0xFFFF;

#[repr(C)]
#[derive(Clone, Copy)]
pub struct Descriptor {
    pub address: u64,
    pub length: u32,
    pub flags: u16,
    pub next: u16,
}

/// Byte sizes of the three regions for a given queue depth, and the relative
/// offsets a legacy (v1) single-allocation layout needs between them.
pub struct QueueLayout {
    pub descriptor_bytes: usize,
    pub available_bytes: usize,
    pub used_bytes: usize,
}

impl QueueLayout {
    pub fn for_size(queue_size: u16) -> Self {
        let n = queue_size as usize;
        Self {
            descriptor_bytes: size_of::<Descriptor>() * n,
            // flags:u16 + index:u16 + ring:[u16; n] + used_event:u16
            available_bytes: size_of::<u16>() * (3 + n),
            // flags:u16 + index:u16 + ring:[{id:u32,len:u32}; n] + avail_event:u16
            used_bytes: size_of::<u16>() * 2 + size_of::<u64>() * n + size_of::<u16>(),
        }
    }
}

/// One descriptor chain to submit: address, length, and whether the device
/// writes into it (vs. reads from it).
pub struct ChainEntry {
    pub address: u64,
    pub length: u32,
    pub device_writable: bool,
}

/// A split virtqueue plus the free-list bookkeeping needed to (de)allocate
/// descriptor chains against it. Regions are raw pointers into bump-allocated
/// memory set up by [`super::mmio::MmioTransport::setup_queue`].
pub struct VirtQueue {
    pub queue_index: u32,
    pub queue_size: u16,
    descriptor: *mut Descriptor,
    avail_flags: *mut u16,
    avail_index: *mut u16,
    avail_ring: *mut u16,
    used_flags: *const u16,
    used_index: *const u16,
    used_ring: *const [u32; 2],
    free_next: *mut u16,
    free_head: u16,
    number_free: u16,
    last_used_index: u16,
}

// SAFETY: every `VirtQueue` is only ever touched from the single-hart
// polling loop; there is no concurrent access to guard against.
unsafe impl Send for VirtQueue {}

impl VirtQueue {
    /// Build a `VirtQueue` over already-allocated, zeroed regions. Callers
    /// (the mmio transport) are responsible for placing the regions per the
    /// legacy/modern layout rules and writing the matching device registers.
    ///
    /// # Safety
    /// `descriptor`, `avail`, and `used` must point to regions at least as
    /// large as [`QueueLayout::for_size`] for `queue_size`, zero-initialized,
    /// and not aliased by anything else.
    pub unsafe fn new(
        queue_index: u32,
        queue_size: u16,
        descriptor: *mut Descriptor,
        avail: *mut u8,
        used: *const u8,
        free_next: *mut u16,
    ) -> Self {
        let avail_flags = avail as *mut u16;
        // SAFETY: `avail` points to a region at least `QueueLayout::for_size`
        // bytes, per this function's caller contract; offsetting by one and
        // two `u16`s stays within the available-ring header.
        let avail_index = unsafe { avail_flags.add(1) };
        // SAFETY: see above.
        let avail_ring = unsafe { avail_index.add(1) };

        let used_flags = used as *const u16;
        // SAFETY: `used` points to a region at least `QueueLayout::for_size`
        // bytes, per this function's caller contract; offsetting by one
        // `u16` stays within the used-ring header.
        let used_index = unsafe { used_flags.add(1) };
        // SAFETY: see above.
        let used_ring = unsafe { used_index.add(1) as *const [u32; 2] };

        for i in 0..queue_size {
            let next = if i + 1 == queue_size { FREE_LIST_END } else { i + 1 };
            // SAFETY: `free_next` holds `queue_size` contiguous `u16` slots.
            unsafe { free_next.add(i as usize).write(next) };
        }

        Self {
            queue_index,
            queue_size,
            descriptor,
            avail_flags,
            avail_index,
            avail_ring,
            used_flags,
            used_index,
            used_ring,
            free_next,
            free_head: 0,
            number_free: queue_size,
            last_used_index: 0,
        }
    }

    /// Allocate and populate a chain of descriptors, linking them with
    /// `VIRTQ_DESC_F_NEXT`. Returns the head index, or `None` if the free
    /// list can't satisfy the whole chain.
    pub fn alloc_chain(&mut self, entries: &[ChainEntry]) -> Option<u16> {
        if entries.len() > self.number_free as usize || entries.is_empty() {
            return None;
        }

        let mut indices = [0u16; 8];
        debug_assert!(entries.len() <= indices.len());

        for slot in indices.iter_mut().take(entries.len()) {
            let index = self.free_head;
            // SAFETY: `index` is within `queue_size` as long as the free list
            // was built correctly; `free_next` always has `queue_size` slots.
            self.free_head = unsafe { self.free_next.add(index as usize).read() };
            *slot = index;
        }
        self.number_free -= entries.len() as u16;

        for (i, entry) in entries.iter().enumerate() {
            let index = indices[i];
            let has_next = i + 1 < entries.len();
            let mut flags = 0u16;
            if entry.device_writable {
                flags |= VIRTQ_DESC_F_WRITE;
            }
            if has_next {
                flags |= VIRTQ_DESC_F_NEXT;
            }
            let next = if has_next { indices[i + 1] } else { 0 };
            let desc = Descriptor {
                address: entry.address,
                length: entry.length,
                flags,
                next,
            };
            // SAFETY: `index` is a descriptor slot we just popped off the
            // free list, exclusively owned until `free_chain` gives it back.
            unsafe { self.descriptor.add(index as usize).write(desc) };
        }

        Some(indices[0])
    }

    /// Return every descriptor in the chain starting at `head` to the free
    /// list, following `VIRTQ_DESC_F_NEXT`.
    pub fn free_chain(&mut self, head: u16) {
        let mut index = head;
        loop {
            // SAFETY: `index` was produced by `alloc_chain` and has not been
            // freed yet.
            let desc = unsafe { self.descriptor.add(index as usize).read() };
            let next = desc.next;
            let has_next = desc.flags & VIRTQ_DESC_F_NEXT != 0;

            // SAFETY: `free_next` has `queue_size` slots; `index` is in range.
            unsafe { self.free_next.add(index as usize).write(self.free_head) };
            self.free_head = index;
            self.number_free += 1;

            if !has_next {
                break;
            }
            index = next;
        }
    }

    /// Publish `head` on the available ring for the device to consume.
    pub fn submit(&mut self, head: u16) {
        // SAFETY: `avail_index` points at a live available-ring header.
        let index = unsafe { self.avail_index.read_volatile() };
        let slot = index % self.queue_size;
        // SAFETY: `avail_ring` has `queue_size` entries.
        unsafe { self.avail_ring.add(slot as usize).write_volatile(head) };

        super::fence();
        // SAFETY: see above.
        unsafe { self.avail_index.write_volatile(index.wrapping_add(1)) };
        super::fence();
    }

    /// Pop the next completed descriptor chain's head index off the used
    /// ring, if one is available.
    pub fn poll_used(&mut self) -> Option<u16> {
        // SAFETY: `used_index` points at a live used-ring header.
        let device_index = unsafe { self.used_index.read_volatile() };
        if device_index == self.last_used_index {
            return None;
        }

        let slot = self.last_used_index % self.queue_size;
        // SAFETY: `used_ring` has `queue_size` entries of `[id, len]`.
        let element = unsafe { self.used_ring.add(slot as usize).read_volatile() };
        self.last_used_index = self.last_used_index.wrapping_add(1);
        Some(element[0] as u16)
    }

    pub fn avail_flags_ptr(&self) -> *mut u16 {
        self.avail_flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::align_of;

    fn make_queue(queue_size: u16) -> (VirtQueue, Vec<Descriptor>, Vec<u8>, Vec<u8>, Vec<u16>) {
        let layout = QueueLayout::for_size(queue_size);
        let mut descriptor = vec![
            Descriptor { address: 0, length: 0, flags: 0, next: 0 };
            queue_size as usize
        ];
        let mut avail = vec![0u8; layout.available_bytes];
        let used = vec![0u8; layout.used_bytes];
        let mut free_next = vec![0u16; queue_size as usize];

        assert_eq!(align_of::<Descriptor>(), 8);

        // SAFETY: all three buffers are sized per `QueueLayout` and owned by
        // this test for its whole lifetime.
        let queue = unsafe {
            VirtQueue::new(
                0,
                queue_size,
                descriptor.as_mut_ptr(),
                avail.as_mut_ptr(),
                used.as_ptr(),
                free_next.as_mut_ptr(),
            )
        };
        (queue, descriptor, avail, used, free_next)
    }

    #[test]
    fn alloc_then_free_restores_capacity() {
        let (mut q, ..) = make_queue(4);
        let head = q
            .alloc_chain(&[
                ChainEntry { address: 0x1000, length: 16, device_writable: false },
                ChainEntry { address: 0x2000, length: 32, device_writable: true },
            ])
            .unwrap();
        assert_eq!(q.number_free, 2);
        q.free_chain(head);
        assert_eq!(q.number_free, 4);
    }

    #[test]
    fn alloc_fails_when_exhausted() {
        let (mut q, ..) = make_queue(2);
        let entries = [
            ChainEntry { address: 0, length: 1, device_writable: false },
            ChainEntry { address: 0, length: 1, device_writable: false },
            ChainEntry { address: 0, length: 1, device_writable: false },
        ];
        assert!(q.alloc_chain(&entries).is_none());
    }

    #[test]
    fn submit_and_poll_used_round_trip() {
        let (mut q, _descriptor, mut avail, mut used, _free_next) = make_queue(4);
        let head = q
            .alloc_chain(&[ChainEntry { address: 0x10, length: 4, device_writable: false }])
            .unwrap();
        q.submit(head);

        // Simulate the device consuming the chain and writing a used entry.
        // SAFETY: `used` is a local `Vec<u8>` sized by `QueueLayout`; offsets
        // 2 (index) and 4 (ring start) are in bounds for `queue_size == 4`.
        let used_index_ptr = unsafe { used.as_mut_ptr().add(2) as *mut u16 };
        // SAFETY: see above.
        let used_ring_ptr = unsafe { used.as_mut_ptr().add(4) as *mut u32 };
        // SAFETY: both pointers address live bytes within `used`'s allocation.
        unsafe {
            used_ring_ptr.write(head as u32);
            used_ring_ptr.add(1).write(4);
            used_index_ptr.write(1);
        }
        let _ = &mut avail;

        assert_eq!(q.poll_used(), Some(head));
        assert_eq!(q.poll_used(), None);
    }
}
