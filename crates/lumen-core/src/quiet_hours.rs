//! Night schedule: when the panel goes dark and the minute heartbeat.
//!
//! Wall-clock time (NTP sync, timezone rules) is an external service consumed
//! through [`WallClock`]; until it reports a valid time the display simply
//! stays on.

use crate::clock::Millis;

/// Local civil time snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalTime {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    /// 0 = Sunday … 6 = Saturday.
    pub weekday0: u8,
}

/// Source of valid local time, `None` until synchronized.
pub trait WallClock {
    fn local_time(&self) -> Option<LocalTime>;
}

/// Wall clock that never synchronizes; placeholder until a time service is
/// wired up.
pub struct NoWallClock;

impl WallClock for NoWallClock {
    fn local_time(&self) -> Option<LocalTime> {
        None
    }
}

/// Whether the panel should be dark right now.
///
/// Dark before 08:00 every day, and from 22:00 on Sunday through Thursday
/// (the panel stays on later into Friday and Saturday night).
pub fn quiet_hours(local: LocalTime) -> bool {
    if local.hour < 8 {
        return true;
    }
    local.weekday0 <= 4 && local.hour >= 22
}

/// Pulse duration of the minute heartbeat LED.
const PULSE_MS: u32 = 120;

/// While the panel is dark, blink a status LED briefly once per minute so the
/// device is visibly alive.
#[derive(Debug, Default)]
pub struct MinuteBlink {
    last_minute: Option<u8>,
    pulse_until: Option<Millis>,
}

impl MinuteBlink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the blinker; returns whether the LED should be lit.
    pub fn tick(&mut self, now: Millis, local: Option<LocalTime>, display_dark: bool) -> bool {
        let Some(local) = local else {
            return false;
        };
        if !display_dark {
            self.pulse_until = None;
            return false;
        }

        if self.last_minute != Some(local.minute) {
            self.last_minute = Some(local.minute);
            self.pulse_until = Some(now.wrapping_add(PULSE_MS));
        }

        match self.pulse_until {
            Some(until) if now.reached(until) => {
                self.pulse_until = None;
                false
            }
            Some(_) => true,
            None => false,
        }
    }
}
