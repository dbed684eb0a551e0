//! Sensor intake: numeric readings arriving on the subscription topics.
//!
//! Payloads are expected to be a bare decimal number in UTF-8, possibly with
//! trailing whitespace or a newline. Anything else is rejected without
//! touching the stored reading, as are values outside the configured range.

use log::warn;
use thiserror_no_std::Error;

use crate::clock::Millis;
use crate::config::FeedLimits;
use crate::conn::MessageSink;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FeedError {
    #[error("payload is not UTF-8")]
    NotUtf8,
    #[error("payload is not a number")]
    NotANumber,
    #[error("value out of accepted range")]
    OutOfRange,
    #[error("topic is not subscribed")]
    UnknownTopic,
}

/// One reading slot: value, arrival time, persist-arming flag.
#[derive(Debug, Clone, Copy, Default)]
struct Reading {
    value: Option<f32>,
    updated_at: Option<Millis>,
    dirty: bool,
}

impl Reading {
    fn accept(&mut self, value: f32, now: Millis, persist_delta: f32) {
        let moved = match self.value {
            None => true,
            Some(prev) => abs(prev - value) >= persist_delta,
        };
        self.value = Some(value);
        self.updated_at = Some(now);
        if moved {
            self.dirty = true;
        }
    }

    fn stale(&self, now: Millis, after_ms: u32) -> bool {
        match self.updated_at {
            None => true,
            Some(at) => now.since(at) > after_ms,
        }
    }
}

/// Last-known temperature and humidity, fed from inbound broker messages.
pub struct SensorFeed<'a> {
    temp_topic: &'a str,
    hum_topic: &'a str,
    limits: FeedLimits,
    temp: Reading,
    hum: Reading,
}

impl<'a> SensorFeed<'a> {
    pub fn new(temp_topic: &'a str, hum_topic: &'a str, limits: FeedLimits) -> Self {
        Self {
            temp_topic,
            hum_topic,
            limits,
            temp: Reading::default(),
            hum: Reading::default(),
        }
    }

    /// Apply one inbound message. Rejected payloads leave state untouched.
    pub fn apply(&mut self, topic: &str, payload: &[u8], now: Millis) -> Result<(), FeedError> {
        let value = parse_number(payload)?;

        if topic == self.temp_topic {
            if value < self.limits.temp_min_c || value > self.limits.temp_max_c {
                return Err(FeedError::OutOfRange);
            }
            self.temp.accept(value, now, self.limits.persist_delta);
            Ok(())
        } else if topic == self.hum_topic {
            if value < self.limits.hum_min || value > self.limits.hum_max {
                return Err(FeedError::OutOfRange);
            }
            self.hum.accept(value, now, self.limits.persist_delta);
            Ok(())
        } else {
            Err(FeedError::UnknownTopic)
        }
    }

    /// Seed readings from persisted state at boot; stamps them as fresh so
    /// the display shows the restored values instead of the no-data glyph.
    pub fn restore(&mut self, temp_c: Option<f32>, hum: Option<f32>, now: Millis) {
        if let Some(v) = temp_c {
            self.temp.value = Some(v);
            self.temp.updated_at = Some(now);
        }
        if let Some(v) = hum {
            self.hum.value = Some(v);
            self.hum.updated_at = Some(now);
        }
    }

    pub fn temperature(&self) -> Option<f32> {
        self.temp.value
    }

    pub fn humidity(&self) -> Option<f32> {
        self.hum.value
    }

    pub fn temperature_stale(&self, now: Millis, after_ms: u32) -> bool {
        self.temp.stale(now, after_ms)
    }

    pub fn humidity_stale(&self, now: Millis, after_ms: u32) -> bool {
        self.hum.stale(now, after_ms)
    }

    /// Whether any reading moved enough to be worth persisting.
    pub fn is_dirty(&self) -> bool {
        self.temp.dirty || self.hum.dirty
    }

    /// Whether any reading moved enough to be worth persisting, clearing the
    /// flags. Called by the persistence throttle.
    pub fn take_dirty(&mut self) -> bool {
        let dirty = self.temp.dirty || self.hum.dirty;
        self.temp.dirty = false;
        self.hum.dirty = false;
        dirty
    }
}

impl MessageSink for SensorFeed<'_> {
    fn on_message(&mut self, topic: &str, payload: &[u8], now: Millis) {
        if let Err(e) = self.apply(topic, payload, now) {
            warn!("feed: dropped message on {topic}: {e:?}");
        }
    }
}

fn parse_number(payload: &[u8]) -> Result<f32, FeedError> {
    let text = core::str::from_utf8(payload).map_err(|_| FeedError::NotUtf8)?;
    text.trim().parse::<f32>().map_err(|_| FeedError::NotANumber)
}

fn abs(v: f32) -> f32 {
    if v < 0.0 { -v } else { v }
}
