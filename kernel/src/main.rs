#![no_std]
#![no_main]

use core::panic::PanicInfo;

use stratus_kernel::{arch, console, keyboard, mm, tui};

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    log::error!("kernel panic: {info}");
    arch::halt()
}

#[no_mangle]
pub extern "C" fn _start() -> ! {
    arch::init();
    mm::bump::init();

    log::info!(
        "stratus-kernel starting (git {}, built {})",
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP")
    );

    console::initialize();
    keyboard::init();

    tui::run();
}
