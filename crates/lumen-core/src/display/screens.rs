//! The three data screens: temperature, humidity, clock.
//!
//! Layout notes live next to the code; the common furniture is the blinking
//! stale badge in the top-left and a three-pixel progress cue in the
//! bottom-right showing how far into its display slot the screen is.

use crate::clock::Millis;
use crate::config::DisplayTuning;
use crate::feed::SensorFeed;
use crate::quiet_hours::LocalTime;

use super::font::{self, GLYPH_PERCENT, GLYPH_X};
use super::frame::Frame;

/// Temperature with one decimal, or the no-data glyph.
pub fn draw_temp_screen(
    frame: &mut Frame,
    feed: &SensorFeed<'_>,
    now: Millis,
    elapsed_ms: u32,
    tuning: &DisplayTuning,
) {
    frame.clear();

    let stale = feed.temperature_stale(now, tuning.stale_after_ms);
    draw_stale_badge(frame, now, stale);

    match feed.temperature() {
        Some(temp) => font::draw_temp_tenths(frame, temp, 0, 0),
        None => draw_no_data(frame, 4, 1),
    }

    draw_progress(frame, now, elapsed_ms, tuning.show_ms);
}

/// Relative humidity as a whole percentage plus a level bar.
pub fn draw_hum_screen(
    frame: &mut Frame,
    feed: &SensorFeed<'_>,
    now: Millis,
    elapsed_ms: u32,
    tuning: &DisplayTuning,
) {
    frame.clear();

    let stale = feed.humidity_stale(now, tuning.stale_after_ms);
    draw_stale_badge(frame, now, stale);

    match feed.humidity() {
        Some(hum) => {
            let hum = (hum + 0.5) as i32;
            let hum = hum.clamp(0, 99);
            font::draw_two_digits(frame, hum, 1, 0);
            font::draw_glyph(frame, &GLYPH_PERCENT, 9, 0);
            draw_hum_level_bar(frame, hum);
        }
        None => draw_no_data(frame, 4, 1),
    }

    draw_progress(frame, now, elapsed_ms, tuning.show_ms);
}

/// Clock alternating between hours and minutes, with a corner dot telling
/// which is showing. Falls back to a dashed placeholder until time is valid.
pub fn draw_clock_screen(
    frame: &mut Frame,
    feed: &SensorFeed<'_>,
    local: Option<LocalTime>,
    now: Millis,
    elapsed_ms: u32,
    tuning: &DisplayTuning,
) {
    let Some(local) = local else {
        draw_clock_placeholder(frame, feed, now, elapsed_ms, tuning);
        return;
    };

    frame.clear();

    let stale = feed.temperature_stale(now, tuning.stale_after_ms)
        || feed.humidity_stale(now, tuning.stale_after_ms);
    draw_stale_badge(frame, now, stale);

    let show_hours = (now.0 / tuning.clock_toggle_ms) % 2 == 0;
    let value = if show_hours {
        local.hour
    } else {
        local.minute
    };
    font::draw_two_digits(frame, value as i32, 2, 1);
    // Hours marker top-left, minutes marker top-right.
    frame.set(if show_hours { 0 } else { 11 }, 0, true);

    draw_progress(frame, now, elapsed_ms, tuning.show_ms);
}

fn draw_clock_placeholder(
    frame: &mut Frame,
    feed: &SensorFeed<'_>,
    now: Millis,
    elapsed_ms: u32,
    tuning: &DisplayTuning,
) {
    frame.clear();

    let stale = feed.temperature_stale(now, tuning.stale_after_ms)
        || feed.humidity_stale(now, tuning.stale_after_ms);
    draw_stale_badge(frame, now, stale);

    // Four dashes across the middle row.
    for group in 0..4 {
        let x0 = group * 3;
        for dx in 0..3 {
            frame.set(x0 + dx, 3, true);
        }
    }

    draw_progress(frame, now, elapsed_ms, tuning.show_ms);
}

/// Tiny "!" badge in the top-left, blinking on a 400 ms period.
fn draw_stale_badge(frame: &mut Frame, now: Millis, stale: bool) {
    if !stale || (now.0 / 400) % 2 != 0 {
        return;
    }
    frame.set(0, 0, true);
    frame.set(0, 1, true);
    frame.set(0, 3, true);
    frame.set(1, 0, true);
}

fn draw_no_data(frame: &mut Frame, x0: i32, y0: i32) {
    font::draw_glyph(frame, &GLYPH_X, x0, y0);
}

/// Horizontal humidity level bar along the bottom-left, 0–8 pixels.
fn draw_hum_level_bar(frame: &mut Frame, hum: i32) {
    let lit = ((hum * 8 + 50) / 100).clamp(0, 8);
    for x in 0..8 {
        frame.set(x, 7, x < lit);
    }
}

/// Three-pixel slot-progress cue in the bottom-right, kept tiny to preserve
/// the data area. The last pixel blinks as the slot runs out.
fn draw_progress(frame: &mut Frame, now: Millis, elapsed_ms: u32, total_ms: u32) {
    let p = if total_ms == 0 {
        1.0
    } else {
        (elapsed_ms as f32 / total_ms as f32).clamp(0.0, 1.0)
    };

    let step = ((p * 3.0) as i32).clamp(0, 2);
    for x in 9..=11 {
        frame.set(x, 7, false);
    }
    for i in 0..=step {
        frame.set(9 + i, 7, true);
    }
    if p > 0.90 && (now.0 / 200) % 2 == 0 {
        frame.set(11, 7, false);
    }
}
