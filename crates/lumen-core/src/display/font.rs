//! 3×5 pixel glyphs for the matrix.
//!
//! Each glyph is five rows of three bits, most significant bit leftmost.

use super::frame::Frame;

pub type Glyph = [u8; 5];

pub const DIGITS: [Glyph; 10] = [
    [0b111, 0b101, 0b101, 0b101, 0b111], // 0
    [0b010, 0b110, 0b010, 0b010, 0b111], // 1
    [0b111, 0b001, 0b111, 0b100, 0b111], // 2
    [0b111, 0b001, 0b111, 0b001, 0b111], // 3
    [0b101, 0b101, 0b111, 0b001, 0b001], // 4
    [0b111, 0b100, 0b111, 0b001, 0b111], // 5
    [0b111, 0b100, 0b111, 0b101, 0b111], // 6
    [0b111, 0b001, 0b010, 0b010, 0b010], // 7
    [0b111, 0b101, 0b111, 0b101, 0b111], // 8
    [0b111, 0b101, 0b111, 0b001, 0b111], // 9
];

pub const GLYPH_X: Glyph = [0b101, 0b010, 0b010, 0b010, 0b101];
pub const GLYPH_PERCENT: Glyph = [0b101, 0b001, 0b010, 0b100, 0b101];
pub const GLYPH_DEG_C: Glyph = [0b000, 0b111, 0b100, 0b111, 0b000];

/// Glyph for a decimal digit; anything out of range falls back to zero.
pub fn digit(d: u32) -> &'static Glyph {
    DIGITS.get(d as usize).unwrap_or(&DIGITS[0])
}

/// Blit a glyph with its top-left corner at `(x0, y0)`.
pub fn draw_glyph(frame: &mut Frame, glyph: &Glyph, x0: i32, y0: i32) {
    for (row, bits) in glyph.iter().enumerate() {
        for col in 0..3 {
            let on = (bits >> (2 - col)) & 1 != 0;
            frame.set(x0 + col, y0 + row as i32, on);
        }
    }
}

/// Two-digit decimal value, clamped to 0..=99, 4-pixel column advance.
pub fn draw_two_digits(frame: &mut Frame, value: i32, x0: i32, y0: i32) {
    let value = value.clamp(0, 99) as u32;
    draw_glyph(frame, digit(value / 10), x0, y0);
    draw_glyph(frame, digit(value % 10), x0 + 4, y0);
}

/// Temperature with one decimal: two whole digits, a decimal point, and the
/// tenths digit.
pub fn draw_temp_tenths(frame: &mut Frame, temp_c: f32, x0: i32, y0: i32) {
    let temp10 = round_i32(temp_c * 10.0);
    let whole = (temp10 / 10).clamp(0, 99);
    let tenths = (temp10 % 10).unsigned_abs();

    draw_two_digits(frame, whole, x0, y0);
    frame.set(x0 + 7, y0 + 4, true);
    draw_glyph(frame, digit(tenths), x0 + 8, y0);
}

/// Half-away-from-zero rounding; `libm`-free since the inputs are tiny.
fn round_i32(v: f32) -> i32 {
    if v >= 0.0 { (v + 0.5) as i32 } else { (v - 0.5) as i32 }
}
