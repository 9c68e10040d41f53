//! Memory management: just the bump allocator described in §4.1.
//!
//! There is no paging, no frame allocator, and no freeing. Every subsystem
//! that needs backing memory (virtqueues, framebuffer, console cell grid,
//! event buffers) goes through [`bump::allocate_aligned`].

pub mod bump;
