//! Settings persistence on the ESP32's internal flash.
//!
//! Rebases the record slots onto a small reserved region above the
//! application image, so the store's slot offsets stay zero-based.

use embedded_storage::{ReadStorage, Storage};
use esp_storage::FlashStorage;

/// Absolute flash offset of the reserved settings region.
pub const SETTINGS_BASE: u32 = 0x9000;

/// Flash-backed storage window for the settings store.
pub struct SettingsPartition {
    flash: FlashStorage,
    base: u32,
}

impl SettingsPartition {
    pub fn new(flash: FlashStorage) -> Self {
        Self {
            flash,
            base: SETTINGS_BASE,
        }
    }
}

impl ReadStorage for SettingsPartition {
    type Error = esp_storage::FlashStorageError;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        self.flash.read(self.base + offset, bytes)
    }

    fn capacity(&self) -> usize {
        4096
    }
}

impl Storage for SettingsPartition {
    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        self.flash.write(self.base + offset, bytes)
    }
}
