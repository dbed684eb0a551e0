//! Screen rotation and the column-wipe transition.
//!
//! While connectivity is up, the display cycles temperature → humidity →
//! clock, each shown for the configured slot, with a center-out column wipe
//! between screens. During quiet hours the panel is blanked and the manager
//! goes idle until the schedule opens again.

use crate::clock::Millis;
use crate::config::DisplayTuning;
use crate::display::frame::{Frame, MatrixDriver};
use crate::display::screens;
use crate::feed::SensorFeed;
use crate::quiet_hours::{self, LocalTime};

/// Which data screen is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenMode {
    Temperature,
    Humidity,
    Clock,
}

impl ScreenMode {
    fn next(self) -> Self {
        match self {
            Self::Temperature => Self::Humidity,
            Self::Humidity => Self::Clock,
            Self::Clock => Self::Temperature,
        }
    }
}

/// Column order of the wipe: center-out, alternating sides.
const WIPE_ORDER: [usize; 12] = [5, 6, 4, 7, 3, 8, 2, 9, 1, 10, 0, 11];

/// Floor on the per-column step so very short wipe budgets stay visible.
const MIN_STEP_MS: u32 = 8;

struct WipeState {
    from: Frame,
    to: Frame,
    out: Frame,
    step: usize,
    next_step_at: Millis,
    step_interval_ms: u32,
    next_mode: ScreenMode,
}

/// Owns the data-screen frame, the rotation timers, and the wipe.
pub struct ScreenManager<M: MatrixDriver> {
    driver: M,
    tuning: DisplayTuning,
    mode: ScreenMode,
    screen_started_at: Millis,
    last_ui_tick_at: Millis,
    frame: Frame,
    wipe: Option<WipeState>,
    dark: bool,
}

impl<M: MatrixDriver> ScreenManager<M> {
    pub fn new(driver: M, tuning: DisplayTuning) -> Self {
        Self {
            driver,
            tuning,
            mode: ScreenMode::Temperature,
            screen_started_at: Millis::ZERO,
            last_ui_tick_at: Millis::ZERO,
            frame: Frame::new(),
            wipe: None,
            dark: false,
        }
    }

    pub fn mode(&self) -> ScreenMode {
        self.mode
    }

    /// Whether the quiet-hours blanking is in effect.
    pub fn is_dark(&self) -> bool {
        self.dark
    }

    /// Advance the UI by one step. Bounded and non-blocking, same contract as
    /// the connectivity tick.
    pub fn tick(&mut self, now: Millis, feed: &SensorFeed<'_>, local: Option<LocalTime>) {
        let dark = local.map(quiet_hours::quiet_hours).unwrap_or(false);
        if dark != self.dark {
            self.dark = dark;
            if dark {
                self.wipe = None;
                self.frame.clear();
                self.driver.render(&self.frame);
            } else {
                // Re-enter with a fresh slot and an immediate redraw.
                self.screen_started_at = now;
                self.last_ui_tick_at = Millis::ZERO;
            }
        }
        if self.dark {
            return;
        }

        if self.wipe.is_some() {
            self.tick_wipe(now);
            return;
        }

        if self.screen_started_at == Millis::ZERO {
            self.screen_started_at = now;
        }

        let elapsed = now.since(self.screen_started_at);
        if elapsed >= self.tuning.show_ms {
            self.start_wipe(now, feed, local);
            return;
        }

        if now.since(self.last_ui_tick_at) >= self.tuning.ui_tick_ms {
            self.last_ui_tick_at = now;
            self.draw_mode(self.mode, now, elapsed, feed, local);
            let frame = self.frame;
            self.driver.render(&frame);
        }
    }

    fn draw_mode(
        &mut self,
        mode: ScreenMode,
        now: Millis,
        elapsed_ms: u32,
        feed: &SensorFeed<'_>,
        local: Option<LocalTime>,
    ) {
        match mode {
            ScreenMode::Temperature => {
                screens::draw_temp_screen(&mut self.frame, feed, now, elapsed_ms, &self.tuning)
            }
            ScreenMode::Humidity => {
                screens::draw_hum_screen(&mut self.frame, feed, now, elapsed_ms, &self.tuning)
            }
            ScreenMode::Clock => screens::draw_clock_screen(
                &mut self.frame,
                feed,
                local,
                now,
                elapsed_ms,
                &self.tuning,
            ),
        }
    }

    fn start_wipe(&mut self, now: Millis, feed: &SensorFeed<'_>, local: Option<LocalTime>) {
        let next_mode = self.mode.next();

        self.draw_mode(self.mode, now, 0, feed, local);
        let from = self.frame;
        self.draw_mode(next_mode, now, 0, feed, local);
        let to = self.frame;

        self.wipe = Some(WipeState {
            from,
            to,
            out: from,
            step: 0,
            next_step_at: now,
            step_interval_ms: (self.tuning.wipe_ms / WIPE_ORDER.len() as u32).max(MIN_STEP_MS),
            next_mode,
        });
    }

    fn tick_wipe(&mut self, now: Millis) {
        let Some(wipe) = &mut self.wipe else {
            return;
        };
        if !now.reached(wipe.next_step_at) {
            return;
        }

        let column = WIPE_ORDER[wipe.step];
        let source = wipe.to;
        wipe.out.copy_column(&source, column);
        wipe.step += 1;
        wipe.next_step_at = now.wrapping_add(wipe.step_interval_ms);

        let out = wipe.out;
        let done = wipe.step >= WIPE_ORDER.len();
        let next_mode = wipe.next_mode;

        self.driver.render(&out);

        if done {
            self.wipe = None;
            self.mode = next_mode;
            self.frame = out;
            self.screen_started_at = now;
            self.last_ui_tick_at = Millis::ZERO;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeedLimits;
    use core::cell::{Cell, RefCell};

    #[derive(Default)]
    struct RecordingDriver {
        renders: Cell<u32>,
        last: RefCell<Frame>,
    }

    impl MatrixDriver for &RecordingDriver {
        fn render(&mut self, frame: &Frame) {
            self.renders.set(self.renders.get() + 1);
            *self.last.borrow_mut() = *frame;
        }
    }

    fn feed() -> SensorFeed<'static> {
        let mut feed = SensorFeed::new("t", "h", FeedLimits::default());
        feed.apply("t", b"21.0", Millis(500)).unwrap();
        feed.apply("h", b"55", Millis(500)).unwrap();
        feed
    }

    fn daytime() -> Option<LocalTime> {
        Some(LocalTime {
            hour: 12,
            minute: 30,
            second: 0,
            weekday0: 2,
        })
    }

    #[test]
    fn test_redraw_respects_ui_tick_cadence() {
        let driver = RecordingDriver::default();
        let tuning = DisplayTuning::default();
        let mut mgr = ScreenManager::new(&driver, tuning);
        let feed = feed();

        mgr.tick(Millis(1_000), &feed, daytime());
        assert_eq!(driver.renders.get(), 1);

        // Within the cadence window: no redraw.
        mgr.tick(Millis(1_000 + tuning.ui_tick_ms - 50), &feed, daytime());
        assert_eq!(driver.renders.get(), 1);

        mgr.tick(Millis(1_000 + tuning.ui_tick_ms), &feed, daytime());
        assert_eq!(driver.renders.get(), 2);
    }

    #[test]
    fn test_rotation_through_all_screens() {
        let driver = RecordingDriver::default();
        let tuning = DisplayTuning::default();
        let mut mgr = ScreenManager::new(&driver, tuning);
        let feed = feed();

        assert_eq!(mgr.mode(), ScreenMode::Temperature);

        let mut now = 1_000;
        let mut prev = mgr.mode();
        let mut seen = heapless::Vec::<ScreenMode, 8>::new();
        while seen.len() < 3 {
            now += 25;
            mgr.tick(Millis(now), &feed, daytime());
            if mgr.mode() != prev {
                prev = mgr.mode();
                seen.push(prev).unwrap();
            }
            assert!(now < 60_000);
        }

        assert_eq!(
            seen.as_slice(),
            &[ScreenMode::Humidity, ScreenMode::Clock, ScreenMode::Temperature]
        );
    }

    #[test]
    fn test_wipe_replaces_columns_in_order() {
        let driver = RecordingDriver::default();
        let tuning = DisplayTuning::default();
        let mut mgr = ScreenManager::new(&driver, tuning);
        let feed = feed();

        // Run up to the end of the first slot so a wipe starts.
        let mut now = 1_000;
        while mgr.wipe.is_none() {
            now += 25;
            mgr.tick(Millis(now), &feed, daytime());
            assert!(now < 20_000);
        }

        // First wipe step replaces the first column in the order table.
        let renders_before = driver.renders.get();
        now += 25;
        mgr.tick(Millis(now), &feed, daytime());
        assert_eq!(driver.renders.get(), renders_before + 1);
        assert_eq!(mgr.wipe.as_ref().unwrap().step, 1);

        // Drive the wipe to completion; the mode flips afterwards.
        while mgr.wipe.is_some() {
            now += 25;
            mgr.tick(Millis(now), &feed, daytime());
            assert!(now < 20_000);
        }
        assert_eq!(mgr.mode(), ScreenMode::Humidity);
    }

    #[test]
    fn test_quiet_hours_blank_and_resume() {
        let driver = RecordingDriver::default();
        let tuning = DisplayTuning::default();
        let mut mgr = ScreenManager::new(&driver, tuning);
        let feed = feed();

        mgr.tick(Millis(1_000), &feed, daytime());
        assert!(driver.last.borrow().lit_count() > 0);

        let night = Some(LocalTime {
            hour: 23,
            minute: 0,
            second: 0,
            weekday0: 1,
        });
        mgr.tick(Millis(2_000), &feed, night);
        assert!(mgr.is_dark());
        assert_eq!(driver.last.borrow().lit_count(), 0);

        // Further night ticks stay idle.
        let renders = driver.renders.get();
        mgr.tick(Millis(3_000), &feed, night);
        assert_eq!(driver.renders.get(), renders);

        // Morning: drawing resumes.
        mgr.tick(Millis(4_000), &feed, daytime());
        assert!(!mgr.is_dark());
        assert!(driver.last.borrow().lit_count() > 0);
    }
}
