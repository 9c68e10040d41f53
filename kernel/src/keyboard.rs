//! Top-level keyboard integration: the virtio-input driver, tried exactly
//! once, lazily, on the first poll — falling back permanently to a raw UART
//! byte stream if no device answers (§4.5).

use crate::serial;
use crate::sync::GlobalState;
use crate::virtio::input::InputDevice;

pub use crate::virtio::input::{
    KeyModifiers, KEY_BACKSPACE, KEY_CAPSLOCK, KEY_DOWN, KEY_ENTER, KEY_ESC, KEY_LEFT,
    KEY_LEFTCTRL, KEY_LEFTSHIFT, KEY_RIGHT, KEY_RIGHTCTRL, KEY_RIGHTSHIFT, KEY_SPACE, KEY_TAB,
    KEY_UP,
};

const EV_KEY: u16 = 0x01;

/// Mirrors the virtio-input wire shape plus the ASCII translation, per §6's
/// `{type, code, value, modifiers, ascii}`.
#[derive(Clone, Copy, Debug)]
pub struct KeyboardEvent {
    pub event_type: u16,
    pub code: u16,
    pub value: u32,
    pub modifiers: KeyModifiers,
    pub ascii: u8,
}

enum Backend {
    Virtio(InputDevice),
    Uart(UartFallback),
}

static BACKEND: GlobalState<Backend> = GlobalState::new();

/// Nothing to probe eagerly: the virtio-input attempt happens lazily inside
/// the first [`poll_event`] call (§4.5), so this only exists to give the
/// boot path a symmetrical call alongside `console::initialize()`.
pub fn init() {
    log::debug!("keyboard: virtio-input probe deferred to first poll");
}

/// Poll for the next keyboard event. Returns `None` when nothing is
/// pending. The first call decides, once and for all, whether this kernel
/// run uses virtio-input or the UART fallback.
pub fn poll_event() -> Option<KeyboardEvent> {
    if !BACKEND.is_init() {
        let backend = match InputDevice::init() {
            Ok(device) => {
                log::info!("keyboard: virtio-input device online");
                Backend::Virtio(device)
            }
            Err(err) => {
                log::warn!("keyboard: no virtio-input device ({err}); falling back to uart");
                Backend::Uart(UartFallback::new())
            }
        };
        let _ = BACKEND.init(backend);
    }

    BACKEND
        .with_mut(|backend| match backend {
            Backend::Virtio(device) => device.poll_event().map(|event| KeyboardEvent {
                event_type: EV_KEY,
                code: event.code,
                value: event.value,
                modifiers: event.modifiers,
                ascii: event.ascii,
            }),
            Backend::Uart(uart) => uart.poll().map(|ascii| KeyboardEvent {
                event_type: EV_KEY,
                code: 0,
                value: 1,
                modifiers: KeyModifiers::empty(),
                ascii,
            }),
        })
        .flatten()
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum EscapeState {
    Normal,
    SawEsc,
    InSequence,
}

/// Swallows `ESC '[' final` / `ESC 'O' final` arrow-key sequences so that
/// pasted ANSI escape codes do not leak into the character stream, and
/// translates CR to LF and uppercase ASCII to lowercase.
struct EscapeFilter {
    state: EscapeState,
}

impl EscapeFilter {
    const fn new() -> Self {
        Self { state: EscapeState::Normal }
    }

    fn feed(&mut self, byte: u8) -> Option<u8> {
        match self.state {
            EscapeState::Normal => {
                if byte == 0x1B {
                    self.state = EscapeState::SawEsc;
                    None
                } else {
                    Some(translate(byte))
                }
            }
            EscapeState::SawEsc => {
                self.state =
                    if byte == b'[' || byte == b'O' { EscapeState::InSequence } else { EscapeState::Normal };
                None
            }
            EscapeState::InSequence => {
                self.state = EscapeState::Normal;
                None
            }
        }
    }
}

fn translate(byte: u8) -> u8 {
    match byte {
        b'\r' => b'\n',
        b'A'..=b'Z' => byte + (b'a' - b'A'),
        other => other,
    }
}

struct UartFallback {
    filter: EscapeFilter,
}

impl UartFallback {
    fn new() -> Self {
        Self { filter: EscapeFilter::new() }
    }

    fn poll(&mut self) -> Option<u8> {
        loop {
            let byte = serial::try_read_byte()?;
            if let Some(ascii) = self.filter.feed(byte) {
                return Some(ascii);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec;

    #[test]
    fn escape_sequences_are_swallowed() {
        let mut filter = EscapeFilter::new();
        let input = [0x1Bu8, b'[', b'A', b'h', b'i'];
        let out: Vec<u8> = input.iter().filter_map(|&b| filter.feed(b)).collect();
        assert_eq!(out, [b'h', b'i']);
    }

    #[test]
    fn escape_o_sequences_are_also_swallowed() {
        let mut filter = EscapeFilter::new();
        let input = [0x1Bu8, b'O', b'P', b'x'];
        let out: Vec<u8> = input.iter().filter_map(|&b| filter.feed(b)).collect();
        assert_eq!(out, [b'x']);
    }

    #[test]
    fn lone_escape_without_bracket_resets_cleanly() {
        let mut filter = EscapeFilter::new();
        assert_eq!(filter.feed(0x1B), None);
        assert_eq!(filter.feed(b'q'), Some(b'q'));
    }

    #[test]
    fn cr_translates_to_lf_and_upper_to_lower() {
        let mut filter = EscapeFilter::new();
        assert_eq!(filter.feed(b'\r'), Some(b'\n'));
        assert_eq!(filter.feed(b'Q'), Some(b'q'));
        assert_eq!(filter.feed(b'7'), Some(b'7'));
    }
}
