//! Non-volatile persistence of last-known readings and runtime settings.
//!
//! Each record lives in its own fixed 64-byte slot behind the
//! `embedded-storage` traits and is framed as
//! `magic (u32 LE) | version (u16 LE) | len (u8) | postcard payload | checksum (u16 LE)`
//! where the checksum is an additive byte sum over everything before it.
//! A record that fails any of the three guards is treated as absent, never
//! as an error the caller has to care about beyond falling back to defaults.

use embedded_storage::Storage;
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

use crate::clock::Millis;
use crate::feed::SensorFeed;

/// Byte offset of the readings slot.
pub const READINGS_SLOT: u32 = 0;
/// Byte offset of the settings slot.
pub const SETTINGS_SLOT: u32 = 64;

const SLOT_SIZE: usize = 64;
const HEADER_SIZE: usize = 7;
const CHECKSUM_SIZE: usize = 2;

const READINGS_MAGIC: u32 = 0x4C4D_5244; // "LMRD"
const SETTINGS_MAGIC: u32 = 0x4C4D_5354; // "LMST"
const FORMAT_VERSION: u16 = 1;

/// Throttle floor between persisted writes, to spare the flash.
pub const MIN_PERSIST_INTERVAL_MS: u32 = 600_000;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PersistError {
    #[error("storage access failed")]
    Storage,
    #[error("record magic mismatch")]
    BadMagic,
    #[error("record version mismatch")]
    BadVersion,
    #[error("record checksum mismatch")]
    BadChecksum,
    #[error("record does not fit its slot")]
    TooLarge,
    #[error("record payload is malformed")]
    Malformed,
}

/// Last-known sensor readings.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct ReadingsRecord {
    pub temp_c: Option<f32>,
    pub hum: Option<f32>,
}

/// User-adjustable runtime settings.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingsRecord {
    pub show_ms: u32,
    pub ui_tick_ms: u32,
}

impl SettingsRecord {
    /// Accepted bounds; fields outside them are ignored on load.
    const SHOW_RANGE: (u32, u32) = (500, 120_000);
    const UI_TICK_RANGE: (u32, u32) = (16, 2_000);

    /// Apply the in-range fields onto `tuning`, leaving the rest untouched.
    pub fn apply_to(&self, tuning: &mut crate::config::DisplayTuning) {
        if (Self::SHOW_RANGE.0..=Self::SHOW_RANGE.1).contains(&self.show_ms) {
            tuning.show_ms = self.show_ms;
        }
        if (Self::UI_TICK_RANGE.0..=Self::UI_TICK_RANGE.1).contains(&self.ui_tick_ms) {
            tuning.ui_tick_ms = self.ui_tick_ms;
        }
    }
}

/// Record store over a flash/EEPROM-like backend.
pub struct SettingsStore<S> {
    storage: S,
}

impl<S: Storage> SettingsStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn load_readings(&mut self) -> Result<ReadingsRecord, PersistError> {
        self.load(READINGS_SLOT, READINGS_MAGIC)
    }

    pub fn save_readings(&mut self, record: &ReadingsRecord) -> Result<(), PersistError> {
        self.save(READINGS_SLOT, READINGS_MAGIC, record)
    }

    pub fn load_settings(&mut self) -> Result<SettingsRecord, PersistError> {
        self.load(SETTINGS_SLOT, SETTINGS_MAGIC)
    }

    pub fn save_settings(&mut self, record: &SettingsRecord) -> Result<(), PersistError> {
        self.save(SETTINGS_SLOT, SETTINGS_MAGIC, record)
    }

    /// Invalidate both slots.
    pub fn factory_reset(&mut self) -> Result<(), PersistError> {
        let blank = [0u8; SLOT_SIZE];
        self.storage
            .write(READINGS_SLOT, &blank)
            .map_err(|_| PersistError::Storage)?;
        self.storage
            .write(SETTINGS_SLOT, &blank)
            .map_err(|_| PersistError::Storage)
    }

    fn load<T: for<'de> Deserialize<'de>>(
        &mut self,
        slot: u32,
        magic: u32,
    ) -> Result<T, PersistError> {
        let mut buf = [0u8; SLOT_SIZE];
        self.storage
            .read(slot, &mut buf)
            .map_err(|_| PersistError::Storage)?;

        let stored_magic = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        if stored_magic != magic {
            return Err(PersistError::BadMagic);
        }
        let version = u16::from_le_bytes([buf[4], buf[5]]);
        if version != FORMAT_VERSION {
            return Err(PersistError::BadVersion);
        }
        let len = buf[6] as usize;
        if HEADER_SIZE + len + CHECKSUM_SIZE > SLOT_SIZE {
            return Err(PersistError::Malformed);
        }

        let body_end = HEADER_SIZE + len;
        let stored_sum = u16::from_le_bytes([buf[body_end], buf[body_end + 1]]);
        if checksum16(&buf[..body_end]) != stored_sum {
            return Err(PersistError::BadChecksum);
        }

        postcard::from_bytes(&buf[HEADER_SIZE..body_end]).map_err(|_| PersistError::Malformed)
    }

    fn save<T: Serialize>(&mut self, slot: u32, magic: u32, record: &T) -> Result<(), PersistError> {
        let mut buf = [0u8; SLOT_SIZE];
        buf[0..4].copy_from_slice(&magic.to_le_bytes());
        buf[4..6].copy_from_slice(&FORMAT_VERSION.to_le_bytes());

        let payload_max = SLOT_SIZE - HEADER_SIZE - CHECKSUM_SIZE;
        let used = postcard::to_slice(record, &mut buf[HEADER_SIZE..HEADER_SIZE + payload_max])
            .map_err(|_| PersistError::TooLarge)?
            .len();
        buf[6] = used as u8;

        let body_end = HEADER_SIZE + used;
        let sum = checksum16(&buf[..body_end]);
        buf[body_end..body_end + 2].copy_from_slice(&sum.to_le_bytes());

        self.storage
            .write(slot, &buf)
            .map_err(|_| PersistError::Storage)
    }
}

fn checksum16(bytes: &[u8]) -> u16 {
    bytes
        .iter()
        .fold(0u16, |sum, &b| sum.wrapping_add(b as u16))
}

/// Write-throttled persistence of the feed's readings.
///
/// Writes only when a reading moved meaningfully since the last write and at
/// most once per [`MIN_PERSIST_INTERVAL_MS`].
pub struct ReadingsPersister {
    last_persist_at: Option<Millis>,
    min_interval_ms: u32,
}

impl Default for ReadingsPersister {
    fn default() -> Self {
        Self::new(MIN_PERSIST_INTERVAL_MS)
    }
}

impl ReadingsPersister {
    pub fn new(min_interval_ms: u32) -> Self {
        Self {
            last_persist_at: None,
            min_interval_ms,
        }
    }

    /// Returns `Ok(true)` when a write actually happened.
    pub fn maybe_persist<S: Storage>(
        &mut self,
        store: &mut SettingsStore<S>,
        feed: &mut SensorFeed<'_>,
        now: Millis,
    ) -> Result<bool, PersistError> {
        if !feed.is_dirty() {
            return Ok(false);
        }
        if let Some(last) = self.last_persist_at {
            if now.since(last) < self.min_interval_ms {
                return Ok(false);
            }
        }

        store.save_readings(&ReadingsRecord {
            temp_c: feed.temperature(),
            hum: feed.humidity(),
        })?;
        feed.take_dirty();
        self.last_persist_at = Some(now);
        Ok(true)
    }
}
