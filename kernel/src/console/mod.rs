//! Framebuffer text console: a cell grid backed by the virtio-gpu
//! framebuffer, dirty-rectangle-coalesced flushing, and the `terminal_*`
//! upward interface the TUI shell drives.
//!
//! The cell grid is bump-allocated, like every other buffer in this kernel
//! (see [`crate::mm::bump`]) — there is no heap to back a `Vec<Cell>` on the
//! bare-metal target.

pub mod glyphs;
pub mod palette;

use crate::mm::bump;
use crate::sync::GlobalState;
use crate::virtio::gpu::GpuDevice;
use core::mem::{align_of, size_of};

const MIN_COLS: u32 = 40;
const MIN_ROWS: u32 = 15;
const FALLBACK_COLS: u32 = 80;
const FALLBACK_ROWS: u32 = 25;

#[derive(Clone, Copy)]
pub struct Cell {
    pub character: u8,
    pub color: u8,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Layout {
    pub explorer: Rect,
    pub navigator: Rect,
    pub console: Rect,
}

#[derive(Clone, Copy, Default)]
struct DirtyRect {
    valid: bool,
    x0: u32,
    y0: u32,
    x1: u32,
    y1: u32,
}

impl DirtyRect {
    fn extend(&mut self, x0: u32, y0: u32, x1: u32, y1: u32) {
        if !self.valid {
            *self = DirtyRect { valid: true, x0, y0, x1, y1 };
        } else {
            self.x0 = self.x0.min(x0);
            self.y0 = self.y0.min(y0);
            self.x1 = self.x1.max(x1);
            self.y1 = self.y1.max(y1);
        }
    }
}

/// The left-quarter/bottom-third split described in §4.6: explorer on the
/// left, console in the bottom-right third, navigator filling the rest.
/// A no-op guard against degenerate grids lives in [`Console::layout_init`];
/// this function always computes a layout and trusts its caller on size.
pub fn compute_layout(cols: u32, rows: u32) -> Layout {
    let content_h = rows.saturating_sub(2).max(1);
    let explorer_w = clamp_range(cols / 4, 20, cols.saturating_sub(22));
    let right_w = cols.saturating_sub(explorer_w);
    let console_h = clamp_range(content_h / 3, 9, content_h.saturating_sub(6));
    let navigator_h = content_h.saturating_sub(console_h);

    Layout {
        explorer: Rect { x: 0, y: 1, w: explorer_w, h: content_h },
        navigator: Rect { x: explorer_w, y: 1, w: right_w, h: navigator_h },
        console: Rect { x: explorer_w, y: 1 + navigator_h, w: right_w, h: console_h },
    }
}

fn clamp_range(value: u32, lo: u32, hi: u32) -> u32 {
    value.clamp(lo, hi.max(lo))
}

/// Fill an 8x16 cell with `bg`, then draw `ch`'s glyph or box-drawing run in
/// `fg` on top. `fb` must address a buffer at least `stride * (py0+16)`
/// bytes long with `(px0+8)*4 <= stride`.
fn render_cell(fb: *mut u8, stride: u32, px0: u32, py0: u32, ch: u8, fg: u32, bg: u32) {
    for row in 0..glyphs::CELL_HEIGHT {
        let y_px = py0 + row;
        for col in 0..glyphs::CELL_WIDTH {
            put_pixel(fb, stride, px0 + col, y_px, bg);
        }
    }

    if glyphs::is_box_drawing(ch) {
        render_box(fb, stride, px0, py0, ch, fg);
        return;
    }

    let rows = glyphs::rows_for(ch);
    for (row_idx, bits) in rows.iter().enumerate() {
        let y_px = py0 + glyphs::GLYPH_Y_OFFSET + row_idx as u32;
        for col in 0..6u32 {
            if (bits >> (5 - col)) & 1 != 0 {
                put_pixel(fb, stride, px0 + glyphs::GLYPH_X_OFFSET + col, y_px, fg);
            }
        }
    }
}

fn render_box(fb: *mut u8, stride: u32, px0: u32, py0: u32, ch: u8, fg: u32) {
    let mid_x = px0 + glyphs::CELL_WIDTH / 2;
    let mid_y = py0 + glyphs::CELL_HEIGHT / 2;
    let cell_right = px0 + glyphs::CELL_WIDTH;
    let cell_bottom = py0 + glyphs::CELL_HEIGHT;

    use glyphs::BoxLine::*;
    match glyphs::box_line_for(ch) {
        Some(Horizontal) => {
            for x in px0..cell_right {
                put_pixel(fb, stride, x, mid_y, fg);
            }
        }
        Some(Vertical) => {
            for y in py0..cell_bottom {
                put_pixel(fb, stride, mid_x, y, fg);
            }
        }
        Some(TopLeft) => {
            for y in mid_y..cell_bottom {
                put_pixel(fb, stride, mid_x, y, fg);
            }
            for x in mid_x..cell_right {
                put_pixel(fb, stride, x, mid_y, fg);
            }
        }
        Some(TopRight) => {
            for y in mid_y..cell_bottom {
                put_pixel(fb, stride, mid_x, y, fg);
            }
            for x in px0..=mid_x {
                put_pixel(fb, stride, x, mid_y, fg);
            }
        }
        Some(BottomLeft) => {
            for y in py0..=mid_y {
                put_pixel(fb, stride, mid_x, y, fg);
            }
            for x in mid_x..cell_right {
                put_pixel(fb, stride, x, mid_y, fg);
            }
        }
        Some(BottomRight) => {
            for y in py0..=mid_y {
                put_pixel(fb, stride, mid_x, y, fg);
            }
            for x in px0..=mid_x {
                put_pixel(fb, stride, x, mid_y, fg);
            }
        }
        None => {}
    }
}

fn put_pixel(fb: *mut u8, stride: u32, x: u32, y: u32, rgb: u32) {
    let offset = (y as usize) * (stride as usize) + (x as usize) * 4;
    // SAFETY: callers (`render_cell`/`render_box`, reached only through
    // `Console::paint_cell`) only ever address pixels within the cell grid's
    // extent, which `Console::initialize` sized to fit the framebuffer.
    unsafe { (fb.add(offset) as *mut u32).write(rgb) };
}

pub struct Console {
    gpu: Option<GpuDevice>,
    cells: *mut Cell,
    cols: u32,
    rows: u32,
    color: u8,
    dirty: DirtyRect,
    layout: Layout,
    framebuffer_ok: bool,
}

// SAFETY: touched only from the single-hart polling loop.
unsafe impl Send for Console {}

impl Console {
    /// # Safety
    /// `cells` must be either null, or point to `cols * rows` valid,
    /// exclusively-owned [`Cell`] slots for the lifetime of this `Console`.
    unsafe fn from_parts(
        gpu: Option<GpuDevice>,
        cells: *mut Cell,
        cols: u32,
        rows: u32,
        framebuffer_ok: bool,
    ) -> Self {
        let (cells, cols, rows) = if cells.is_null() { (cells, 0, 0) } else { (cells, cols, rows) };
        if !cells.is_null() {
            let blank = Cell { character: b' ', color: palette::DEFAULT_COLOR };
            for i in 0..(cols as usize * rows as usize) {
                // SAFETY: `cells` has `cols*rows` slots per the caller contract.
                unsafe { cells.add(i).write(blank) };
            }
        }
        let layout = if cols >= MIN_COLS && rows >= MIN_ROWS {
            compute_layout(cols, rows)
        } else {
            Layout::default()
        };
        Self {
            gpu,
            cells,
            cols,
            rows,
            color: palette::DEFAULT_COLOR,
            dirty: DirtyRect::default(),
            layout,
            framebuffer_ok,
        }
    }

    fn cell_index(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.cols || y >= self.rows {
            return None;
        }
        Some(y as usize * self.cols as usize + x as usize)
    }

    /// Update the cell, then paint its 8x16 pixel area and mark it dirty —
    /// unless the framebuffer is unavailable, in which case the cell still
    /// updates but nothing is painted (§7: "all writes become a no-op").
    pub fn put_at(&mut self, x: u32, y: u32, ch: u8, color: u8) {
        let Some(idx) = self.cell_index(x, y) else { return };
        // SAFETY: `idx` is within the `cols*rows` cell grid by `cell_index`.
        unsafe { self.cells.add(idx).write(Cell { character: ch, color }) };
        self.paint_cell(x, y, ch, color);
    }

    pub fn get_at(&self, x: u32, y: u32) -> Option<(u8, u8)> {
        let idx = self.cell_index(x, y)?;
        // SAFETY: `idx` is within the `cols*rows` cell grid by `cell_index`.
        let cell = unsafe { self.cells.add(idx).read() };
        Some((cell.character, cell.color))
    }

    fn paint_cell(&mut self, x: u32, y: u32, ch: u8, color: u8) {
        let Some(gpu) = self.gpu.as_mut() else { return };
        let stride = gpu.stride;
        let fb = gpu.framebuffer_ptr();
        let px0 = x * glyphs::CELL_WIDTH;
        let py0 = y * glyphs::CELL_HEIGHT;
        render_cell(fb, stride, px0, py0, ch, palette::foreground_rgb(color), palette::background_rgb(color));
        self.dirty.extend(px0, py0, px0 + glyphs::CELL_WIDTH, py0 + glyphs::CELL_HEIGHT);
    }

    /// Handle `\n`/`\r`/`\0` specially; otherwise paint at `(x,y)` in the
    /// console's current color and advance, wrapping at the grid edges
    /// (ring, not scroll).
    pub fn put_cursor(&mut self, ch: u8, x: &mut u32, y: &mut u32) {
        if self.cols == 0 || self.rows == 0 {
            return;
        }
        match ch {
            b'\n' => {
                *x = 0;
                *y = (*y + 1) % self.rows;
            }
            b'\r' => {
                *x = 0;
            }
            0 => {}
            _ => {
                self.put_at(*x, *y, ch, self.color);
                *x += 1;
                if *x >= self.cols {
                    *x = 0;
                    *y = (*y + 1) % self.rows;
                }
            }
        }
    }

    pub fn write(&mut self, data: &[u8], x: &mut u32, y: &mut u32) {
        for &b in data {
            self.put_cursor(b, x, y);
        }
    }

    /// If dirty, push the coalesced rectangle to the GPU driver and clear
    /// the dirty flag. A clean console never touches the GPU at all.
    pub fn flush(&mut self) -> bool {
        if !self.dirty.valid {
            return true;
        }
        let (x0, y0, x1, y1) = (self.dirty.x0, self.dirty.y0, self.dirty.x1, self.dirty.y1);
        self.dirty = DirtyRect::default();
        let Some(gpu) = self.gpu.as_mut() else { return false };
        gpu.flush_rect(x0, y0, x1 - x0, y1 - y0).is_ok()
    }

    pub fn size(&self) -> (u32, u32) {
        (self.cols, self.rows)
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn framebuffer_ok(&self) -> bool {
        self.framebuffer_ok
    }

    pub fn set_color(&mut self, color: u8) {
        self.color = color;
    }

    /// Recompute the layout for a `(cols, rows)` grid; a no-op when either
    /// dimension is below the documented minimum, leaving prior rectangles
    /// untouched.
    pub fn layout_init(&mut self, cols: u32, rows: u32) {
        if cols < MIN_COLS || rows < MIN_ROWS {
            return;
        }
        self.layout = compute_layout(cols, rows);
    }
}

static CONSOLE: GlobalState<Console> = GlobalState::new();

/// Bring up the GPU driver and size the cell grid to its display mode. On
/// GPU failure, falls back to an unpainted `FALLBACK_COLS x FALLBACK_ROWS`
/// console: `framebuffer_ok()` is false and every paint becomes a no-op.
pub fn initialize() {
    if CONSOLE.is_init() {
        return;
    }
    let console = match GpuDevice::init() {
        Ok(gpu) => {
            let cols = (gpu.width / glyphs::CELL_WIDTH).max(MIN_COLS);
            let rows = (gpu.height / glyphs::CELL_HEIGHT).max(MIN_ROWS);
            let bytes = cols as usize * rows as usize * size_of::<Cell>();
            let cells = bump::allocate_aligned(bytes, align_of::<Cell>()) as *mut Cell;
            if cells.is_null() {
                log::warn!("console: bump allocator exhausted sizing the cell grid");
            }
            // SAFETY: `cells` was just bump-allocated for `cols*rows` slots,
            // or null (handled by `from_parts`) if the allocator is exhausted.
            unsafe { Console::from_parts(Some(gpu), cells, cols, rows, true) }
        }
        Err(err) => {
            log::warn!("console: gpu unavailable ({err}); framebuffer disabled");
            let bytes = FALLBACK_COLS as usize * FALLBACK_ROWS as usize * size_of::<Cell>();
            let cells = bump::allocate_aligned(bytes, align_of::<Cell>()) as *mut Cell;
            // SAFETY: see above.
            unsafe { Console::from_parts(None, cells, FALLBACK_COLS, FALLBACK_ROWS, false) }
        }
    };
    let _ = CONSOLE.init(console);
}

pub fn flush() -> bool {
    CONSOLE.with_mut(Console::flush).unwrap_or(true)
}

pub fn get_size(cols: &mut u32, rows: &mut u32) {
    if let Some((c, r)) = CONSOLE.with(Console::size) {
        *cols = c;
        *rows = r;
    } else {
        *cols = FALLBACK_COLS;
        *rows = FALLBACK_ROWS;
    }
}

pub fn putentryat(ch: u8, color: u8, x: u32, y: u32) {
    CONSOLE.with_mut(|c| c.put_at(x, y, ch, color));
}

pub fn putchar(ch: u8, x: &mut u32, y: &mut u32) {
    CONSOLE.with_mut(|c| c.put_cursor(ch, x, y));
}

pub fn write(data: &[u8], x: &mut u32, y: &mut u32) {
    CONSOLE.with_mut(|c| c.write(data, x, y));
}

pub fn getentryat(x: u32, y: u32, ch: &mut u8, color: &mut u8) -> bool {
    if let Some(Some((c, col))) = CONSOLE.with(|console| console.get_at(x, y)) {
        *ch = c;
        *color = col;
        true
    } else {
        false
    }
}

pub fn layout() -> Layout {
    CONSOLE.with(Console::layout).unwrap_or_default()
}

pub fn framebuffer_ok() -> bool {
    CONSOLE.with(Console::framebuffer_ok).unwrap_or(false)
}

pub fn set_color(color: u8) {
    CONSOLE.with_mut(|c| c.set_color(color));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec;
    use std::vec::Vec;

    fn test_console(cols: u32, rows: u32) -> (Console, Vec<Cell>) {
        let mut buf = vec![Cell { character: b' ', color: 0 }; (cols * rows) as usize];
        // SAFETY: `buf` is kept alive alongside the returned `Console` by
        // the caller, and has exactly `cols*rows` slots.
        let console = unsafe { Console::from_parts(None, buf.as_mut_ptr(), cols, rows, true) };
        (console, buf)
    }

    #[test]
    fn put_then_get_round_trips() {
        let (mut c, _buf) = test_console(80, 25);
        for y in [0, 24] {
            for x in [0, 79] {
                c.put_at(x, y, b'X', 0x1F);
                assert_eq!(c.get_at(x, y), Some((b'X', 0x1F)));
            }
        }
    }

    #[test]
    fn out_of_bounds_access_yields_none_and_no_panic() {
        let (mut c, _buf) = test_console(80, 25);
        c.put_at(80, 0, b'X', 0);
        assert_eq!(c.get_at(80, 0), None);
        assert_eq!(c.get_at(0, 25), None);
    }

    #[test]
    fn layout_matches_reference_scenario() {
        let layout = compute_layout(80, 25);
        assert_eq!(layout.explorer, Rect { x: 0, y: 1, w: 20, h: 23 });
        assert_eq!(layout.navigator, Rect { x: 20, y: 1, w: 60, h: 14 });
        assert_eq!(layout.console, Rect { x: 20, y: 15, w: 60, h: 9 });
    }

    #[test]
    fn layout_init_guards_small_grids() {
        let (mut c, _buf) = test_console(80, 25);
        let before = c.layout();
        c.layout_init(30, 10);
        assert_eq!(c.layout(), before);
        c.layout_init(10, 40);
        assert_eq!(c.layout(), before);
    }

    #[test]
    fn flush_with_no_dirty_writes_is_noop() {
        let (mut c, _buf) = test_console(80, 25);
        assert!(c.flush());
        c.put_at(0, 0, b'H', 0x1F);
        // no real GPU backing this console, so paint_cell never marks the
        // rectangle dirty — flush still observes nothing pending.
        assert!(c.flush());
    }

    #[test]
    fn glyph_rendering_is_deterministic() {
        let stride = glyphs::CELL_WIDTH * 4;
        let mut buf1 = vec![0u8; (stride * glyphs::CELL_HEIGHT) as usize];
        let mut buf2 = buf1.clone();
        render_cell(buf1.as_mut_ptr(), stride, 0, 0, b'A', 0x00FF_FFFF, 0);
        render_cell(buf2.as_mut_ptr(), stride, 0, 0, b'A', 0x00FF_FFFF, 0);
        assert_eq!(buf1, buf2);
        assert!(buf1.iter().any(|&b| b != 0), "glyph A should paint some foreground pixels");
    }

    #[test]
    fn box_drawing_bytes_paint_without_bitmap_lookup() {
        let stride = glyphs::CELL_WIDTH * 4;
        let mut buf = vec![0u8; (stride * glyphs::CELL_HEIGHT) as usize];
        render_cell(buf.as_mut_ptr(), stride, 0, 0, glyphs::BOX_HORIZONTAL, 0x00FF_FFFF, 0);
        assert!(buf.iter().any(|&b| b != 0));
    }

    #[test]
    fn scenario_two_layout() {
        // 640x400 framebuffer -> 80x25 cell grid.
        let cols = 640 / glyphs::CELL_WIDTH;
        let rows = 400 / glyphs::CELL_HEIGHT;
        assert_eq!((cols, rows), (80, 25));
        let layout = compute_layout(cols, rows);
        assert_eq!(layout.explorer, Rect { x: 0, y: 1, w: 20, h: 23 });
    }
}
