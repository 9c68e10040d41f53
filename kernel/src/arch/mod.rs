//! Architecture entry points.
//!
//! This kernel only targets the RISC-V `virt` machine; other host targets
//! (used for `cargo test`) get inert stand-ins so the rest of the crate
//! stays portable enough to unit test.

#[cfg(target_arch = "riscv64")]
pub mod riscv;

#[cfg(target_arch = "riscv64")]
pub use riscv::sbi;

/// Bring up the diagnostic logger. Trap vectors and boot glue live outside
/// this crate.
pub fn init() {
    crate::serial::init_logger();
}

/// Park the core forever. Used by the panic handler and `shut_down`/`restart`
/// fallbacks when SBI declines to act.
pub fn halt() -> ! {
    loop {
        #[cfg(target_arch = "riscv64")]
        // SAFETY: `wfi` only parks the hart; it has no memory side effects.
        unsafe {
            core::arch::asm!("wfi");
        }
        #[cfg(not(target_arch = "riscv64"))]
        core::hint::spin_loop();
    }
}

/// Power the machine off via the SBI legacy shutdown extension.
pub fn shut_down() -> ! {
    #[cfg(target_arch = "riscv64")]
    {
        sbi::shutdown();
    }
    #[cfg(not(target_arch = "riscv64"))]
    halt()
}

/// There is no separate SBI reset call wired up; this kernel's "restart" is
/// the same legacy shutdown request.
pub fn restart() -> ! {
    shut_down()
}
