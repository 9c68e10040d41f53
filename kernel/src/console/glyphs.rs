//! 6x7 bitmap glyphs and the 6 box-drawing line characters, both rendered
//! into an 8x16 cell.
//!
//! Bits are packed MSB-first in the low 6 bits of each row byte: bit 5 is
//! the leftmost column, bit 0 is unused.

pub const CELL_WIDTH: u32 = 8;
pub const CELL_HEIGHT: u32 = 16;

/// Left/top offset of the 6x7 glyph inside its 8x16 cell.
pub const GLYPH_X_OFFSET: u32 = 1;
pub const GLYPH_Y_OFFSET: u32 = 4;

pub const BOX_HORIZONTAL: u8 = 0xC4;
pub const BOX_VERTICAL: u8 = 0xB3;
pub const BOX_TOP_LEFT: u8 = 0xDA;
pub const BOX_TOP_RIGHT: u8 = 0xBF;
pub const BOX_BOTTOM_LEFT: u8 = 0xC0;
pub const BOX_BOTTOM_RIGHT: u8 = 0xD9;

pub fn is_box_drawing(c: u8) -> bool {
    c >= 0x80
}

struct Glyph {
    ch: u8,
    rows: [u8; 7],
}

macro_rules! g {
    ($c:literal, [$($r:literal),+]) => {
        Glyph { ch: $c, rows: [$($r),+] }
    };
}

static GLYPHS: &[Glyph] = &[
    // digits
    g!(b'0', [0x1E, 0x21, 0x23, 0x25, 0x29, 0x31, 0x1E]),
    g!(b'1', [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E]),
    g!(b'2', [0x1E, 0x21, 0x01, 0x06, 0x18, 0x20, 0x3F]),
    g!(b'3', [0x1E, 0x21, 0x01, 0x0E, 0x01, 0x21, 0x1E]),
    g!(b'4', [0x02, 0x06, 0x0A, 0x12, 0x3F, 0x02, 0x02]),
    g!(b'5', [0x3F, 0x20, 0x3E, 0x01, 0x01, 0x21, 0x1E]),
    g!(b'6', [0x0E, 0x10, 0x20, 0x3E, 0x21, 0x21, 0x1E]),
    g!(b'7', [0x3F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x10]),
    g!(b'8', [0x1E, 0x21, 0x21, 0x1E, 0x21, 0x21, 0x1E]),
    g!(b'9', [0x1E, 0x21, 0x21, 0x1F, 0x01, 0x02, 0x1C]),
    // uppercase
    g!(b'A', [0x0E, 0x11, 0x21, 0x21, 0x3F, 0x21, 0x21]),
    g!(b'B', [0x3E, 0x21, 0x21, 0x3E, 0x21, 0x21, 0x3E]),
    g!(b'C', [0x1E, 0x21, 0x20, 0x20, 0x20, 0x21, 0x1E]),
    g!(b'D', [0x3C, 0x22, 0x21, 0x21, 0x21, 0x22, 0x3C]),
    g!(b'E', [0x3F, 0x20, 0x20, 0x3E, 0x20, 0x20, 0x3F]),
    g!(b'F', [0x3F, 0x20, 0x20, 0x3E, 0x20, 0x20, 0x20]),
    g!(b'G', [0x1E, 0x21, 0x20, 0x27, 0x21, 0x21, 0x1E]),
    g!(b'H', [0x21, 0x21, 0x21, 0x3F, 0x21, 0x21, 0x21]),
    g!(b'I', [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E]),
    g!(b'J', [0x07, 0x02, 0x02, 0x02, 0x22, 0x22, 0x1C]),
    g!(b'K', [0x21, 0x22, 0x24, 0x38, 0x24, 0x22, 0x21]),
    g!(b'L', [0x20, 0x20, 0x20, 0x20, 0x20, 0x20, 0x3F]),
    g!(b'M', [0x21, 0x33, 0x2D, 0x21, 0x21, 0x21, 0x21]),
    g!(b'N', [0x21, 0x31, 0x29, 0x25, 0x23, 0x21, 0x21]),
    g!(b'O', [0x1E, 0x21, 0x21, 0x21, 0x21, 0x21, 0x1E]),
    g!(b'P', [0x3E, 0x21, 0x21, 0x3E, 0x20, 0x20, 0x20]),
    g!(b'Q', [0x1E, 0x21, 0x21, 0x21, 0x25, 0x22, 0x1D]),
    g!(b'R', [0x3E, 0x21, 0x21, 0x3E, 0x24, 0x22, 0x21]),
    g!(b'S', [0x1F, 0x20, 0x20, 0x1E, 0x01, 0x01, 0x3E]),
    g!(b'T', [0x3F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04]),
    g!(b'U', [0x21, 0x21, 0x21, 0x21, 0x21, 0x21, 0x1E]),
    g!(b'V', [0x21, 0x21, 0x21, 0x21, 0x21, 0x12, 0x0C]),
    g!(b'W', [0x21, 0x21, 0x21, 0x21, 0x2D, 0x33, 0x21]),
    g!(b'X', [0x21, 0x12, 0x0C, 0x0C, 0x0C, 0x12, 0x21]),
    g!(b'Y', [0x21, 0x12, 0x0C, 0x04, 0x04, 0x04, 0x04]),
    g!(b'Z', [0x3F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x3F]),
    // lowercase, distinct 6x7 shapes (not a shifted copy of uppercase)
    g!(b'a', [0x00, 0x00, 0x1C, 0x02, 0x1E, 0x22, 0x1E]),
    g!(b'b', [0x20, 0x20, 0x3C, 0x22, 0x22, 0x22, 0x3C]),
    g!(b'c', [0x00, 0x00, 0x1C, 0x20, 0x20, 0x20, 0x1C]),
    g!(b'd', [0x02, 0x02, 0x1E, 0x22, 0x22, 0x22, 0x1E]),
    g!(b'e', [0x00, 0x00, 0x1C, 0x22, 0x3E, 0x20, 0x1C]),
    g!(b'f', [0x0C, 0x10, 0x3C, 0x10, 0x10, 0x10, 0x10]),
    g!(b'g', [0x00, 0x00, 0x1E, 0x22, 0x1E, 0x02, 0x1C]),
    g!(b'h', [0x20, 0x20, 0x3C, 0x22, 0x22, 0x22, 0x22]),
    g!(b'i', [0x08, 0x00, 0x18, 0x08, 0x08, 0x08, 0x1C]),
    g!(b'j', [0x04, 0x00, 0x0C, 0x04, 0x04, 0x24, 0x18]),
    g!(b'k', [0x20, 0x24, 0x28, 0x30, 0x28, 0x24, 0x22]),
    g!(b'l', [0x18, 0x08, 0x08, 0x08, 0x08, 0x08, 0x1C]),
    g!(b'm', [0x00, 0x00, 0x34, 0x2A, 0x2A, 0x2A, 0x2A]),
    g!(b'n', [0x00, 0x00, 0x3C, 0x22, 0x22, 0x22, 0x22]),
    g!(b'o', [0x00, 0x00, 0x1C, 0x22, 0x22, 0x22, 0x1C]),
    g!(b'p', [0x00, 0x00, 0x3C, 0x22, 0x3C, 0x20, 0x20]),
    g!(b'q', [0x00, 0x00, 0x1E, 0x22, 0x1E, 0x02, 0x02]),
    g!(b'r', [0x00, 0x00, 0x2C, 0x30, 0x20, 0x20, 0x20]),
    g!(b's', [0x00, 0x00, 0x1E, 0x20, 0x1C, 0x02, 0x3C]),
    g!(b't', [0x10, 0x3C, 0x10, 0x10, 0x10, 0x10, 0x0C]),
    g!(b'u', [0x00, 0x00, 0x22, 0x22, 0x22, 0x26, 0x1A]),
    g!(b'v', [0x00, 0x00, 0x22, 0x22, 0x14, 0x14, 0x08]),
    g!(b'w', [0x00, 0x00, 0x22, 0x2A, 0x2A, 0x2A, 0x14]),
    g!(b'x', [0x00, 0x00, 0x22, 0x14, 0x08, 0x14, 0x22]),
    g!(b'y', [0x00, 0x00, 0x22, 0x22, 0x1E, 0x02, 0x1C]),
    g!(b'z', [0x00, 0x00, 0x3E, 0x04, 0x08, 0x10, 0x3E]),
    // punctuation
    g!(b'-', [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00]),
    g!(b'.', [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C]),
    g!(b'!', [0x04, 0x04, 0x04, 0x04, 0x04, 0x00, 0x04]),
    g!(b':', [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00]),
    g!(b';', [0x00, 0x18, 0x18, 0x00, 0x18, 0x18, 0x10]),
    g!(b'(', [0x02, 0x04, 0x08, 0x08, 0x08, 0x04, 0x02]),
    g!(b')', [0x08, 0x04, 0x02, 0x02, 0x02, 0x04, 0x08]),
    g!(b'/', [0x01, 0x02, 0x04, 0x08, 0x10, 0x20, 0x00]),
    g!(b'\\', [0x20, 0x10, 0x08, 0x04, 0x02, 0x00, 0x00]),
    g!(b',', [0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C, 0x08]),
    g!(b'\'', [0x04, 0x04, 0x02, 0x00, 0x00, 0x00, 0x00]),
    g!(b'"', [0x0A, 0x0A, 0x04, 0x00, 0x00, 0x00, 0x00]),
    g!(b'?', [0x1E, 0x21, 0x01, 0x06, 0x04, 0x00, 0x04]),
    g!(b'<', [0x04, 0x08, 0x10, 0x20, 0x10, 0x08, 0x04]),
    g!(b'>', [0x10, 0x08, 0x04, 0x02, 0x04, 0x08, 0x10]),
    g!(b'[', [0x3C, 0x20, 0x20, 0x20, 0x20, 0x20, 0x3C]),
    g!(b']', [0x3C, 0x04, 0x04, 0x04, 0x04, 0x04, 0x3C]),
    g!(b'{', [0x1C, 0x10, 0x10, 0x20, 0x10, 0x10, 0x1C]),
    g!(b'}', [0x38, 0x08, 0x08, 0x04, 0x08, 0x08, 0x38]),
    g!(b'+', [0x00, 0x08, 0x08, 0x3E, 0x08, 0x08, 0x00]),
    g!(b'=', [0x00, 0x00, 0x3E, 0x00, 0x3E, 0x00, 0x00]),
    g!(b'_', [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x3E]),
    g!(b'@', [0x1C, 0x22, 0x2E, 0x2A, 0x2E, 0x20, 0x1C]),
    g!(b'#', [0x14, 0x3E, 0x14, 0x14, 0x3E, 0x14, 0x00]),
    g!(b'$', [0x08, 0x1E, 0x28, 0x1C, 0x0A, 0x3C, 0x08]),
    g!(b'%', [0x32, 0x32, 0x04, 0x08, 0x10, 0x26, 0x26]),
    g!(b'&', [0x18, 0x24, 0x28, 0x10, 0x2A, 0x24, 0x1A]),
    g!(b'*', [0x00, 0x14, 0x08, 0x3E, 0x08, 0x14, 0x00]),
    g!(b'|', [0x08, 0x08, 0x08, 0x08, 0x08, 0x08, 0x08]),
    g!(b' ', [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]),
];

/// Look up the 7-row bitmap for `c`, preferring an exact-case match, falling
/// back to the uppercase shape for a lowercase letter with no distinct
/// glyph, and finally to `?` for anything unrecognized.
pub fn rows_for(c: u8) -> [u8; 7] {
    if let Some(glyph) = GLYPHS.iter().find(|g| g.ch == c) {
        return glyph.rows;
    }
    if c.is_ascii_lowercase() {
        let upper = c.to_ascii_uppercase();
        if let Some(glyph) = GLYPHS.iter().find(|g| g.ch == upper) {
            return glyph.rows;
        }
    }
    GLYPHS.iter().find(|g| g.ch == b'?').unwrap().rows
}

/// Which pixel run(s) a box-drawing byte traces through the cell's midpoint.
/// Returns `None` for anything not in the 6-byte box-drawing set.
pub enum BoxLine {
    Horizontal,
    Vertical,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

pub fn box_line_for(c: u8) -> Option<BoxLine> {
    Some(match c {
        BOX_HORIZONTAL => BoxLine::Horizontal,
        BOX_VERTICAL => BoxLine::Vertical,
        BOX_TOP_LEFT => BoxLine::TopLeft,
        BOX_TOP_RIGHT => BoxLine::TopRight,
        BOX_BOTTOM_LEFT => BoxLine::BottomLeft,
        BOX_BOTTOM_RIGHT => BoxLine::BottomRight,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_byte_falls_back_to_question_mark() {
        assert_eq!(rows_for(0x01), rows_for(b'?'));
    }

    #[test]
    fn lowercase_has_its_own_distinct_shape() {
        assert_ne!(rows_for(b'a'), rows_for(b'A'));
    }

    #[test]
    fn box_bytes_route_to_line_drawing_not_bitmap() {
        assert!(is_box_drawing(BOX_HORIZONTAL));
        assert!(box_line_for(BOX_HORIZONTAL).is_some());
    }
}
