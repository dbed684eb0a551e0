//! Fat-pixel rendering of the 12×8 matrix onto the SPI LCD.
//!
//! Each matrix pixel becomes a filled square with a one-pixel gutter, warm
//! amber on black like the LED panel it stands in for.

use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};
use log::error;

use lumen_core::display::{Frame, MatrixDriver, HEIGHT, WIDTH};

/// Edge length of one fat pixel, including the gutter.
const CELL: i32 = 24;
/// Lit-cell inset, leaving the gutter dark.
const INSET: i32 = 2;

const COLOR_ON: Rgb565 = Rgb565::new(31, 40, 0);
const COLOR_OFF: Rgb565 = Rgb565::new(2, 4, 1);

/// [`MatrixDriver`] over any RGB565 draw target (the mipidsi display).
///
/// Tracks the previously rendered frame and repaints only cells that
/// changed, keeping the SPI traffic per tick small.
pub struct FatPixelMatrix<D> {
    display: D,
    origin: Point,
    last: Option<Frame>,
}

impl<D> FatPixelMatrix<D>
where
    D: DrawTarget<Color = Rgb565>,
    D::Error: core::fmt::Debug,
{
    pub fn new(display: D, origin: Point) -> Self {
        Self {
            display,
            origin,
            last: None,
        }
    }

    fn paint_cell(&mut self, x: i32, y: i32, on: bool) -> Result<(), D::Error> {
        let top_left = Point::new(self.origin.x + x * CELL, self.origin.y + y * CELL);
        let cell = Rectangle::new(
            top_left + Point::new(INSET, INSET),
            Size::new((CELL - 2 * INSET) as u32, (CELL - 2 * INSET) as u32),
        );
        let color = if on { COLOR_ON } else { COLOR_OFF };
        cell.into_styled(PrimitiveStyle::with_fill(color))
            .draw(&mut self.display)
    }
}

impl<D> MatrixDriver for FatPixelMatrix<D>
where
    D: DrawTarget<Color = Rgb565>,
    D::Error: core::fmt::Debug,
{
    fn render(&mut self, frame: &Frame) {
        for y in 0..HEIGHT as i32 {
            for x in 0..WIDTH as i32 {
                let on = frame.get(x, y);
                if self.last.is_some_and(|prev| prev.get(x, y) == on) {
                    continue;
                }
                if let Err(e) = self.paint_cell(x, y, on) {
                    error!("matrix: draw failed: {e:?}");
                    self.last = None;
                    return;
                }
            }
        }
        self.last = Some(*frame);
    }
}
