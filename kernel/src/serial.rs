//! UART backend for the `log` crate.
//!
//! The QEMU `virt` machine exposes a 16550-compatible UART at a fixed MMIO
//! address; everything this kernel logs (driver handshakes, allocator
//! exhaustion, panics) goes out over it. There are no interrupts here — the
//! writer busy-waits on the line-status register the same way the rest of
//! the kernel polls its devices.

use core::fmt;
use log::{Level, LevelFilter, Log, Metadata, Record};
use spin::Mutex;

#[cfg(target_arch = "riscv64")]
const UART_BASE: usize = 0x1000_0000;

#[cfg(target_arch = "riscv64")]
pub struct Uart16550Compat {
    base_addr: usize,
}

#[cfg(target_arch = "riscv64")]
impl Uart16550Compat {
    pub const fn new(base_addr: usize) -> Self {
        Self { base_addr }
    }
}

#[cfg(target_arch = "riscv64")]
impl Uart16550Compat {
    /// Non-blocking receive: `None` if the line-status register reports no
    /// data waiting, `Some(byte)` read from the receiver buffer otherwise.
    pub fn try_read_byte(&self) -> Option<u8> {
        const RBR: usize = 0x00;
        const LSR: usize = 0x05;
        const LSR_DR: u8 = 1 << 0;

        // SAFETY: `base_addr` is the fixed QEMU `virt` UART MMIO window;
        // LSR/RBR are the standard 16550 register layout, and RBR is only
        // read after LSR reports a byte waiting.
        unsafe {
            let lsr = core::ptr::read_volatile((self.base_addr + LSR) as *const u8);
            if lsr & LSR_DR == 0 {
                return None;
            }
            Some(core::ptr::read_volatile((self.base_addr + RBR) as *const u8))
        }
    }
}

#[cfg(not(target_arch = "riscv64"))]
impl Uart16550Compat {
    pub fn try_read_byte(&self) -> Option<u8> {
        None
    }
}

#[cfg(target_arch = "riscv64")]
impl fmt::Write for Uart16550Compat {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        const THR: usize = 0x00;
        const LSR: usize = 0x05;
        const LSR_THRE: u8 = 1 << 5;

        for byte in s.bytes() {
            // SAFETY: `base_addr` is the fixed QEMU `virt` UART MMIO window;
            // these offsets are the standard 16550 register layout.
            unsafe {
                while core::ptr::read_volatile((self.base_addr + LSR) as *const u8) & LSR_THRE == 0
                {
                    core::hint::spin_loop();
                }
                core::ptr::write_volatile((self.base_addr + THR) as *mut u8, byte);
            }
        }
        Ok(())
    }
}

#[cfg(not(target_arch = "riscv64"))]
#[derive(Default)]
pub struct Uart16550Compat;

#[cfg(not(target_arch = "riscv64"))]
impl Uart16550Compat {
    pub const fn new(_base_addr: usize) -> Self {
        Self
    }
}

#[cfg(not(target_arch = "riscv64"))]
impl fmt::Write for Uart16550Compat {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        #[cfg(not(target_os = "none"))]
        {
            use std::io::Write as _;
            let _ = std::io::stderr().write_all(s.as_bytes());
        }
        #[cfg(target_os = "none")]
        let _ = s;
        Ok(())
    }
}

static PORT: Mutex<Option<Uart16550Compat>> = Mutex::new(None);

struct UartLogger;

impl Log for UartLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        use fmt::Write as _;

        let mut guard = PORT.lock();
        let port = guard.get_or_insert_with(|| Uart16550Compat::new(uart_base()));
        let level = match record.level() {
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        };
        let _ = writeln!(port, "[{level:>5}] {}", record.args());
    }

    fn flush(&self) {}
}

#[cfg(target_arch = "riscv64")]
fn uart_base() -> usize {
    UART_BASE
}

#[cfg(not(target_arch = "riscv64"))]
fn uart_base() -> usize {
    0
}

static LOGGER: UartLogger = UartLogger;

/// Non-blocking byte read from the same UART the logger writes to, for the
/// legacy keyboard fallback. Safe to interleave with log output — RBR/LSR
/// and THR are distinct registers.
pub fn try_read_byte() -> Option<u8> {
    Uart16550Compat::new(uart_base()).try_read_byte()
}

/// Install the UART-backed logger as the `log` crate's global logger.
/// Idempotent: a second call after the first succeeds is a no-op.
pub fn init_logger() {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Trace);
    }
}
