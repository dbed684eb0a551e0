//! Connectivity feedback animations.
//!
//! Implements [`StatusAnimator`] on top of a [`Frame`] and a [`MatrixDriver`]:
//! the signal-bars wave while associating, the bouncing packet while the
//! broker session comes up, and the pulsing X on failure. All three are pure
//! functions of the step/phase counter and the current time.

use crate::clock::Millis;
use crate::conn::StatusAnimator;

use super::frame::{Frame, MatrixDriver};

/// Heights of the four signal bars, shortest to tallest.
const BAR_HEIGHTS: [i32; 4] = [1, 2, 3, 4];
/// Columns of the four signal bars.
const BAR_COLUMNS: [i32; 4] = [2, 4, 6, 8];
/// Wave table the bars sample, phase-shifted per bar.
const BAR_WAVE: [i32; 24] = [
    0, 1, 2, 3, 4, 3, 2, 1, 0, 0, 1, 2, 3, 4, 3, 2, 1, 0, 0, 1, 2, 3, 2, 1,
];

/// Connectivity animator rendering onto the matrix.
pub struct MatrixAnimator<M: MatrixDriver> {
    frame: Frame,
    driver: M,
}

impl<M: MatrixDriver> MatrixAnimator<M> {
    pub fn new(driver: M) -> Self {
        Self {
            frame: Frame::new(),
            driver,
        }
    }

    fn flush(&mut self) {
        self.driver.render(&self.frame);
    }
}

impl<M: MatrixDriver> StatusAnimator for MatrixAnimator<M> {
    fn draw_associating_frame(&mut self, step: u32) {
        draw_wifi_bars(&mut self.frame, step);
        self.flush();
    }

    fn draw_session_frame(&mut self, phase: u32) {
        draw_session_packet(&mut self.frame, phase);
        self.flush();
    }

    fn draw_failure_frame(&mut self, now: Millis) {
        draw_failure_x(&mut self.frame, now);
        self.flush();
    }
}

/// Animated signal bars with a pedestal pixel and a sparkle on the wave peak.
pub fn draw_wifi_bars(frame: &mut Frame, step: u32) {
    frame.clear();
    frame.set(0, 6, true);

    for (bar, (&x, &height)) in BAR_COLUMNS.iter().zip(BAR_HEIGHTS.iter()).enumerate() {
        let idx = (step as usize + bar * 4) % BAR_WAVE.len();
        let lit = BAR_WAVE[idx].min(height);
        for dy in 0..lit {
            frame.set(x, 6 - dy, true);
        }
    }

    // Sparkle above the tallest bar when its wave crests.
    if BAR_WAVE[(step as usize + 12) % BAR_WAVE.len()] >= 4 {
        frame.set(8, 2, true);
    }
}

/// A two-pixel "packet" bouncing between the device and broker node pixels.
pub fn draw_session_packet(frame: &mut Frame, phase: u32) {
    frame.clear();

    const XMIN: i32 = 2;
    const XMAX: i32 = 9;
    const SPAN: i32 = XMAX - XMIN;

    let cycle = (SPAN * 2) as u32;
    let p = (phase % cycle) as i32;
    let (x, forward) = if p <= SPAN {
        (XMIN + p, true)
    } else {
        (XMAX - (p - SPAN), false)
    };

    let y = 3 + ((phase / 4) & 1) as i32;
    frame.set(x, y, true);
    frame.set(x, y + 1, true);

    // Tail behind, flickering nose ahead.
    if forward {
        if x - 2 >= XMIN {
            frame.set(x - 2, y + 1, true);
        }
        if phase & 1 == 0 && x + 1 <= XMAX {
            frame.set(x + 1, y, true);
        }
    } else {
        if x + 2 <= XMAX {
            frame.set(x + 2, y + 1, true);
        }
        if phase & 1 == 0 && x - 1 >= XMIN {
            frame.set(x - 1, y, true);
        }
    }

    // Endpoint nodes, pulsing briefly when the packet arrives.
    frame.set(0, 4, true);
    frame.set(0, 5, true);
    frame.set(11, 2, true);
    frame.set(11, 3, true);
    frame.set(11, 4, true);
    if x == XMIN && phase & 0x3 == 0 {
        frame.set(1, 4, true);
    }
    if x == XMAX && phase & 0x3 == 0 {
        frame.set(10, 3, true);
    }
}

/// Full-frame X whose corners pulse on a 900 ms period.
pub fn draw_failure_x(frame: &mut Frame, now: Millis) {
    frame.clear();

    for i in 0..8 {
        // Spread the diagonal over the 12-wide matrix.
        let x1 = (i * 11 + 3) / 7;
        let x2 = 11 - x1;
        frame.set(x1, i, true);
        frame.set(x2, i, true);
    }

    if (now.0 / 900) % 2 == 0 {
        frame.set(0, 0, true);
        frame.set(11, 0, true);
        frame.set(0, 7, true);
        frame.set(11, 7, true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wifi_bars_pedestal_always_lit() {
        for step in 0..48 {
            let mut frame = Frame::new();
            draw_wifi_bars(&mut frame, step);
            assert!(frame.get(0, 6), "pedestal missing at step {step}");
        }
    }

    #[test]
    fn test_wifi_bars_respect_heights() {
        for step in 0..24 {
            let mut frame = Frame::new();
            draw_wifi_bars(&mut frame, step);
            // Shortest bar (column 2, height 1) never grows past one pixel.
            assert!(!frame.get(2, 5), "short bar too tall at step {step}");
        }
    }

    #[test]
    fn test_session_packet_nodes_always_present() {
        for phase in 0..32 {
            let mut frame = Frame::new();
            draw_session_packet(&mut frame, phase);
            assert!(frame.get(0, 4) && frame.get(0, 5));
            assert!(frame.get(11, 2) && frame.get(11, 3) && frame.get(11, 4));
        }
    }

    #[test]
    fn test_session_packet_stays_in_corridor() {
        for phase in 0..64 {
            let mut frame = Frame::new();
            draw_session_packet(&mut frame, phase);
            for y in 0..2 {
                for x in 1..11 {
                    // Rows 0 and 1 are outside the packet corridor.
                    assert!(!frame.get(x, y), "stray pixel at ({x},{y}) phase {phase}");
                }
            }
        }
    }

    #[test]
    fn test_failure_x_diagonals() {
        let mut frame = Frame::new();
        draw_failure_x(&mut frame, Millis(0));
        // Both diagonals span corner to corner.
        assert!(frame.get(0, 0) && frame.get(11, 7));
        assert!(frame.get(11, 0) && frame.get(0, 7));
        // Mirrored pair on every row (11 is odd, so they never coincide).
        for y in 0..8 {
            let row_lit: usize = (0..12).filter(|&x| frame.get(x, y)).count();
            assert_eq!(row_lit, 2, "row {y}");
        }
    }
}
