//! Minimal TUI shell: a thin polling client that exercises the console and
//! keyboard drivers together (§4.7). There is no file browser and no menu
//! state machine here — navigation logic is explicitly out of scope — this
//! shell exists only to give the boot path somewhere to hand control to.

use crate::console::{self, glyphs, palette, Rect};
use crate::keyboard::{self, KeyModifiers};

fn border_color() -> u8 {
    palette::pack(palette::VgaColor::White, palette::VgaColor::Blue)
}

fn draw_pane(rect: Rect, title: &str) {
    if rect.w < 2 || rect.h < 2 {
        return;
    }
    let color = border_color();
    let right = rect.x + rect.w - 1;
    let bottom = rect.y + rect.h - 1;

    console::putentryat(glyphs::BOX_TOP_LEFT, color, rect.x, rect.y);
    console::putentryat(glyphs::BOX_TOP_RIGHT, color, right, rect.y);
    console::putentryat(glyphs::BOX_BOTTOM_LEFT, color, rect.x, bottom);
    console::putentryat(glyphs::BOX_BOTTOM_RIGHT, color, right, bottom);

    for x in (rect.x + 1)..right {
        console::putentryat(glyphs::BOX_HORIZONTAL, color, x, rect.y);
        console::putentryat(glyphs::BOX_HORIZONTAL, color, x, bottom);
    }
    for y in (rect.y + 1)..bottom {
        console::putentryat(glyphs::BOX_VERTICAL, color, rect.x, y);
        console::putentryat(glyphs::BOX_VERTICAL, color, right, y);
    }

    let mut tx = rect.x + 2;
    let mut ty = rect.y;
    if tx < right {
        console::set_color(color);
        console::write(title.as_bytes(), &mut tx, &mut ty);
        console::set_color(palette::DEFAULT_COLOR);
    }
}

/// Echo one printable byte into `rect`'s interior at `(cx, cy)`, wrapping
/// within the pane (not the whole grid) and handling backspace/newline.
fn echo_into_pane(rect: Rect, cx: &mut u32, cy: &mut u32, ch: u8) {
    if rect.w < 3 || rect.h < 3 {
        return;
    }
    let left = rect.x + 1;
    let top = rect.y + 1;
    let right = rect.x + rect.w - 1;
    let bottom = rect.y + rect.h - 1;

    match ch {
        b'\n' => {
            *cx = left;
            *cy += 1;
        }
        b'\r' => {
            *cx = left;
        }
        0x08 => {
            if *cx > left {
                *cx -= 1;
                console::putentryat(b' ', palette::DEFAULT_COLOR, *cx, *cy);
            }
        }
        0 => {}
        _ => {
            console::putentryat(ch, palette::DEFAULT_COLOR, *cx, *cy);
            *cx += 1;
        }
    }

    if *cx >= right {
        *cx = left;
        *cy += 1;
    }
    if *cy >= bottom {
        *cy = top;
    }
}

/// Bring up the console (which brings up the GPU driver), draw the static
/// three-pane layout, then loop forever polling the keyboard and echoing
/// printable ASCII into the console pane.
pub fn run() -> ! {
    let layout = console::layout();
    draw_pane(layout.explorer, " Explorer ");
    draw_pane(layout.navigator, " Navigator ");
    draw_pane(layout.console, " Console ");
    console::flush();

    let mut cx = layout.console.x + 1;
    let mut cy = layout.console.y + 1;

    loop {
        if let Some(event) = keyboard::poll_event() {
            if event.value != 0 && event.modifiers.contains(KeyModifiers::CTRL) && event.ascii == b'c' {
                crate::arch::shut_down();
            }
            if event.value != 0 && event.ascii != 0 {
                echo_into_pane(layout.console, &mut cx, &mut cy, event.ascii);
                console::flush();
            }
        }
        core::hint::spin_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_wraps_within_pane_not_whole_grid() {
        let rect = Rect { x: 20, y: 15, w: 10, h: 5 };
        let mut cx = rect.x + 1;
        let mut cy = rect.y + 1;
        for _ in 0..8 {
            echo_into_pane(rect, &mut cx, &mut cy, b'x');
        }
        assert!(cx >= rect.x + 1 && cx < rect.x + rect.w - 1);
        assert!(cy >= rect.y + 1 && cy < rect.y + rect.h - 1);
    }

    #[test]
    fn backspace_steps_back_within_the_pane() {
        let rect = Rect { x: 20, y: 15, w: 10, h: 5 };
        let mut cx = rect.x + 1;
        let mut cy = rect.y + 1;
        echo_into_pane(rect, &mut cx, &mut cy, b'a');
        echo_into_pane(rect, &mut cx, &mut cy, b'b');
        let after_two = cx;
        echo_into_pane(rect, &mut cx, &mut cy, 0x08);
        assert_eq!(cx, after_two - 1);
    }
}
