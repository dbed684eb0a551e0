//! 12×8 monochrome frame buffer for the LED matrix.
//!
//! All drawing targets this RAM buffer; a [`MatrixDriver`] then pushes the
//! finished frame to whatever panel is attached (real matrix, fat-pixel LCD,
//! simulator window). The buffer also implements
//! `embedded_graphics::DrawTarget` so ecosystem primitives can draw on it,
//! though the built-in screens mostly use [`Frame::set`] directly.

use core::convert::Infallible;

use embedded_graphics::Pixel;
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::{DrawTarget, OriginDimensions, Size};

/// Matrix width in pixels.
pub const WIDTH: usize = 12;
/// Matrix height in pixels.
pub const HEIGHT: usize = 8;

/// One monochrome frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pixels: [[bool; WIDTH]; HEIGHT],
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

impl Frame {
    /// An all-dark frame.
    pub const fn new() -> Self {
        Self {
            pixels: [[false; WIDTH]; HEIGHT],
        }
    }

    pub fn clear(&mut self) {
        self.pixels = [[false; WIDTH]; HEIGHT];
    }

    /// Set one pixel. Out-of-bounds coordinates are ignored, so drawing
    /// routines can be sloppy at the edges.
    pub fn set(&mut self, x: i32, y: i32, on: bool) {
        if x < 0 || x >= WIDTH as i32 || y < 0 || y >= HEIGHT as i32 {
            return;
        }
        self.pixels[y as usize][x as usize] = on;
    }

    pub fn get(&self, x: i32, y: i32) -> bool {
        if x < 0 || x >= WIDTH as i32 || y < 0 || y >= HEIGHT as i32 {
            return false;
        }
        self.pixels[y as usize][x as usize]
    }

    /// Copy one column from another frame, used by the wipe transition.
    pub fn copy_column(&mut self, from: &Frame, x: usize) {
        if x >= WIDTH {
            return;
        }
        for y in 0..HEIGHT {
            self.pixels[y][x] = from.pixels[y][x];
        }
    }

    /// Number of lit pixels, handy for tests.
    pub fn lit_count(&self) -> usize {
        self.pixels
            .iter()
            .map(|row| row.iter().filter(|&&p| p).count())
            .sum()
    }
}

impl OriginDimensions for Frame {
    fn size(&self) -> Size {
        Size::new(WIDTH as u32, HEIGHT as u32)
    }
}

impl DrawTarget for Frame {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            self.set(point.x, point.y, color.is_on());
        }
        Ok(())
    }
}

/// Hardware seam: pushes a finished frame to the attached panel.
pub trait MatrixDriver {
    fn render(&mut self, frame: &Frame);
}
