//! ESP32-S3 firmware-specific modules for lumen-rs
//!
//! This crate contains hardware-specific code that cannot compile on desktop
//! targets: ESP32 peripheral initialization, the esp-radio wifi adapter, the
//! rust-mqtt session adapter, and the fat-pixel LCD rendering of the matrix.

#![no_std]

extern crate alloc;

pub mod matrix;
pub mod radio;
pub mod secrets;
pub mod session;
pub mod settings_flash;
