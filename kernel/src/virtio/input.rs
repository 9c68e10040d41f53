//! virtio-input driver for the emulated keyboard.
//!
//! Receive buffers are posted once, before `DRIVER_OK`, and each completed
//! buffer is resubmitted on the *same* descriptor index the moment it is
//! read — there is no alloc/free round trip on the hot path, only at setup.

use super::mmio::MmioTransport;
use super::queue::{ChainEntry, VirtQueue};
use crate::error::DriverError;
use crate::mm::bump;
use bitflags::bitflags;
use core::mem::size_of;

const VIRTIO_DEVICE_ID_INPUT: u32 = 18;
const QUEUE_SIZE: u16 = 64;
const NONE_SLOT: u16 = 0xFFFF;

const EV_SYN: u16 = 0x00;
const EV_KEY: u16 = 0x01;

pub const KEY_ESC: u16 = 1;
pub const KEY_BACKSPACE: u16 = 14;
pub const KEY_TAB: u16 = 15;
pub const KEY_ENTER: u16 = 28;
pub const KEY_LEFTCTRL: u16 = 29;
pub const KEY_LEFTSHIFT: u16 = 42;
pub const KEY_RIGHTSHIFT: u16 = 54;
pub const KEY_LEFTALT: u16 = 56;
pub const KEY_SPACE: u16 = 57;
pub const KEY_CAPSLOCK: u16 = 58;
pub const KEY_RIGHTCTRL: u16 = 97;
pub const KEY_RIGHTALT: u16 = 100;
pub const KEY_UP: u16 = 103;
pub const KEY_LEFT: u16 = 105;
pub const KEY_RIGHT: u16 = 106;
pub const KEY_DOWN: u16 = 108;
pub const KEY_LEFTMETA: u16 = 125;
pub const KEY_RIGHTMETA: u16 = 126;

const KEY_1: u16 = 2;
const KEY_MINUS: u16 = 12;
const KEY_EQUAL: u16 = 13;
const KEY_LEFTBRACE: u16 = 26;
const KEY_RIGHTBRACE: u16 = 27;
const KEY_SEMICOLON: u16 = 39;
const KEY_APOSTROPHE: u16 = 40;
const KEY_GRAVE: u16 = 41;
const KEY_BACKSLASH: u16 = 43;
const KEY_COMMA: u16 = 51;
const KEY_DOT: u16 = 52;
const KEY_SLASH: u16 = 53;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct KeyModifiers: u8 {
        const SHIFT = 1 << 0;
        const CTRL  = 1 << 1;
        const ALT   = 1 << 2;
        const META  = 1 << 3;
    }
}

#[derive(Clone, Copy, Debug)]
pub struct KeyEvent {
    pub code: u16,
    /// 1 = press, 2 = repeat, 0 = release.
    pub value: u32,
    pub modifiers: KeyModifiers,
    /// Printable ASCII for this key at this modifier state, or `0`.
    pub ascii: u8,
}

impl KeyEvent {
    pub fn is_press_or_repeat(&self) -> bool {
        self.value == 1 || self.value == 2
    }
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
struct WireEvent {
    event_type: u16,
    code: u16,
    value: u32,
}

pub struct InputDevice {
    transport: MmioTransport,
    queue: VirtQueue,
    events: *mut WireEvent,
    event_by_desc: *mut u16,
    modifiers: KeyModifiers,
    caps_lock: bool,
}

// SAFETY: touched only from the single-hart polling loop.
unsafe impl Send for InputDevice {}

impl InputDevice {
    pub fn init() -> Result<Self, DriverError> {
        let transport = MmioTransport::find_device(VIRTIO_DEVICE_ID_INPUT)
            .ok_or(DriverError::DeviceNotFound { device_id: VIRTIO_DEVICE_ID_INPUT })?;
        transport.reset_and_acknowledge();
        transport.negotiate(0)?;
        let queue = transport
            .setup_queue(0, QUEUE_SIZE)
            .ok_or(DriverError::OutOfMemory)?;
        let queue_size = queue.queue_size;

        let events =
            bump::allocate_aligned(size_of::<WireEvent>() * queue_size as usize, 8) as *mut WireEvent;
        let event_by_desc =
            bump::allocate_aligned(size_of::<u16>() * queue_size as usize, 2) as *mut u16;
        if events.is_null() || event_by_desc.is_null() {
            return Err(DriverError::OutOfMemory);
        }
        for i in 0..queue_size {
            // SAFETY: both arrays have `queue_size` elements, just allocated.
            unsafe {
                events.add(i as usize).write(WireEvent::default());
                event_by_desc.add(i as usize).write(NONE_SLOT);
            }
        }

        let mut device = Self {
            transport,
            queue,
            events,
            event_by_desc,
            modifiers: KeyModifiers::empty(),
            caps_lock: false,
        };

        for slot in 0..queue_size {
            device.post_buffer(slot);
        }
        device.transport.notify_queue(device.queue.queue_index);
        device.transport.set_driver_ok();

        Ok(device)
    }

    fn post_buffer(&mut self, slot: u16) {
        // SAFETY: `slot` is in `[0, queue_size)`, `events` has that many slots.
        let address = unsafe { self.events.add(slot as usize) } as usize as u64;
        let entries = [ChainEntry { address, length: size_of::<WireEvent>() as u32, device_writable: true }];
        if let Some(desc) = self.queue.alloc_chain(&entries) {
            self.queue.submit(desc);
            // SAFETY: `desc` is within `queue_size`.
            unsafe { self.event_by_desc.add(desc as usize).write(slot) };
        }
    }

    /// Poll for the next key event, resubmitting its buffer immediately.
    /// Returns `None` if nothing is pending; `EV_SYN` markers are consumed
    /// and skipped transparently.
    pub fn poll_event(&mut self) -> Option<KeyEvent> {
        for _ in 0..8 {
            let desc = self.queue.poll_used()?;
            // SAFETY: `desc` is within `queue_size`.
            let slot = unsafe { self.event_by_desc.add(desc as usize).read() };
            if slot == NONE_SLOT {
                continue;
            }
            // SAFETY: `slot` is within `queue_size`.
            let event = unsafe { self.events.add(slot as usize).read() };

            self.queue.submit(desc);
            self.transport.notify_queue(self.queue.queue_index);

            if event.event_type == EV_SYN {
                continue;
            }
            if event.event_type != EV_KEY {
                continue;
            }

            self.update_modifiers(event.code, event.value);
            let ascii = if event.value == 1 || event.value == 2 {
                self.map_key_to_ascii(event.code)
            } else {
                0
            };
            return Some(KeyEvent {
                code: event.code,
                value: event.value,
                modifiers: self.modifiers,
                ascii,
            });
        }
        None
    }

    fn update_modifiers(&mut self, code: u16, value: u32) {
        let pressed = value != 0;
        let bit = match code {
            KEY_LEFTSHIFT | KEY_RIGHTSHIFT => Some(KeyModifiers::SHIFT),
            KEY_LEFTCTRL | KEY_RIGHTCTRL => Some(KeyModifiers::CTRL),
            KEY_LEFTALT | KEY_RIGHTALT => Some(KeyModifiers::ALT),
            KEY_LEFTMETA | KEY_RIGHTMETA => Some(KeyModifiers::META),
            _ => None,
        };
        if let Some(bit) = bit {
            self.modifiers.set(bit, pressed);
        }
        if code == KEY_CAPSLOCK && value == 1 {
            self.caps_lock = !self.caps_lock;
        }
    }

    fn map_key_to_ascii(&self, code: u16) -> u8 {
        let shift = self.modifiers.contains(KeyModifiers::SHIFT);

        match code {
            KEY_ENTER => return b'\n',
            KEY_TAB => return b'\t',
            KEY_SPACE => return b' ',
            KEY_BACKSPACE => return 0x08,
            KEY_ESC => return 0x1b,
            _ => {}
        }

        if let Some(letter) = letter_for_keycode(code) {
            let upper = shift ^ self.caps_lock;
            return if upper { letter } else { letter + (b'a' - b'A') };
        }

        number_row_ascii(code, shift).unwrap_or(0)
    }
}

fn letter_for_keycode(code: u16) -> Option<u8> {
    let letter = match code {
        30 => b'A',
        48 => b'B',
        46 => b'C',
        32 => b'D',
        18 => b'E',
        33 => b'F',
        34 => b'G',
        35 => b'H',
        23 => b'I',
        36 => b'J',
        37 => b'K',
        38 => b'L',
        50 => b'M',
        49 => b'N',
        24 => b'O',
        25 => b'P',
        16 => b'Q',
        19 => b'R',
        31 => b'S',
        20 => b'T',
        22 => b'U',
        47 => b'V',
        17 => b'W',
        45 => b'X',
        21 => b'Y',
        44 => b'Z',
        _ => return None,
    };
    Some(letter)
}

fn number_row_ascii(code: u16, shift: bool) -> Option<u8> {
    Some(match code {
        KEY_1 => if shift { b'!' } else { b'1' },
        3 => if shift { b'@' } else { b'2' },
        4 => if shift { b'#' } else { b'3' },
        5 => if shift { b'$' } else { b'4' },
        6 => if shift { b'%' } else { b'5' },
        7 => if shift { b'^' } else { b'6' },
        8 => if shift { b'&' } else { b'7' },
        9 => if shift { b'*' } else { b'8' },
        10 => if shift { b'(' } else { b'9' },
        11 => if shift { b')' } else { b'0' },
        KEY_MINUS => if shift { b'_' } else { b'-' },
        KEY_EQUAL => if shift { b'+' } else { b'=' },
        KEY_LEFTBRACE => if shift { b'{' } else { b'[' },
        KEY_RIGHTBRACE => if shift { b'}' } else { b']' },
        KEY_SEMICOLON => if shift { b':' } else { b';' },
        KEY_APOSTROPHE => if shift { b'"' } else { b'\'' },
        KEY_GRAVE => if shift { b'~' } else { b'`' },
        KEY_BACKSLASH => if shift { b'|' } else { b'\\' },
        KEY_COMMA => if shift { b'<' } else { b',' },
        KEY_DOT => if shift { b'>' } else { b'.' },
        KEY_SLASH => if shift { b'?' } else { b'/' },
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letters_cover_the_alphabet() {
        for c in b'A'..=b'Z' {
            assert!(letter_for_keycode_reverse(c).is_some(), "missing mapping for {c}");
        }
    }

    fn letter_for_keycode_reverse(letter: u8) -> Option<u16> {
        (0..200u16).find(|&code| letter_for_keycode(code) == Some(letter))
    }

    #[test]
    fn number_row_shifts_to_symbols() {
        assert_eq!(number_row_ascii(2, false), Some(b'1'));
        assert_eq!(number_row_ascii(2, true), Some(b'!'));
        assert_eq!(number_row_ascii(11, false), Some(b'0'));
        assert_eq!(number_row_ascii(11, true), Some(b')'));
    }
}
