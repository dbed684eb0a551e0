//! Device configuration: credentials, broker endpoint, and timing policy.
//!
//! The string-bearing structs borrow their data (typically from flash-resident
//! constants baked in at build time), mirroring how the firmware embeds its
//! credentials. The tuning structs are plain value types with the shipped
//! defaults; every duration here is policy, not protocol.

use serde::{Deserialize, Serialize};

use crate::conn::QoS;

/// Static IPv4 addressing used instead of DHCP when configured.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticV4 {
    pub address: [u8; 4],
    pub gateway: [u8; 4],
    pub subnet: [u8; 4],
    pub dns: [u8; 4],
}

/// Wireless network credentials and addressing.
#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(bound(deserialize = "'de: 'a"))]
pub struct WifiConfig<'a> {
    pub ssid: &'a str,
    pub password: &'a str,
    /// `None` selects DHCP.
    pub static_v4: Option<StaticV4>,
}

/// MQTT broker endpoint, identity, and topic layout.
#[derive(Debug)]
pub struct BrokerConfig<'a> {
    pub host: &'a str,
    pub port: u16,
    pub client_id: &'a str,
    /// `None` connects anonymously.
    pub credentials: Option<(&'a str, &'a str)>,
    pub keep_alive_secs: u16,
    /// Topics the display subscribes to (temperature, humidity).
    pub subscriptions: &'a [&'a str],
    pub subscribe_qos: QoS,
    /// Retained status topic carrying the last-will mechanism.
    pub status_topic: &'a str,
    pub status_online: &'a str,
    pub status_offline: &'a str,
    pub status_qos: QoS,
    pub status_retain: bool,
}

/// Connectivity state machine timing policy.
///
/// A zero `broker_total_timeout_ms` disables the whole-session ceiling; every
/// other field is always live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnTuning {
    /// How long the wifi warm-up animation runs before the first association.
    pub warmup_anim_ms: u32,
    /// How long to wait for association before backing off.
    pub wifi_timeout_ms: u32,
    pub wifi_backoff_base_ms: u32,
    pub wifi_backoff_max_ms: u32,
    /// Cadence of the signal-bars animation.
    pub wifi_anim_tick_ms: u32,
    /// Cadence of the broker packet animation.
    pub broker_anim_tick_ms: u32,
    /// Ceiling on one whole session-establishment episode; 0 disables.
    pub broker_total_timeout_ms: u32,
    /// Minimum animation time before the first connect attempt.
    pub broker_anim_run_ms: u32,
    /// Minimum spacing between connect attempts.
    pub broker_try_interval_ms: u32,
    /// How long the failure visual is held in the fail-display state.
    pub broker_fail_show_ms: u32,
    pub broker_backoff_base_ms: u32,
    pub broker_backoff_max_ms: u32,
}

impl Default for ConnTuning {
    fn default() -> Self {
        Self {
            warmup_anim_ms: 1_500,
            wifi_timeout_ms: 15_000,
            wifi_backoff_base_ms: 1_000,
            wifi_backoff_max_ms: 30_000,
            wifi_anim_tick_ms: 120,
            broker_anim_tick_ms: 60,
            broker_total_timeout_ms: 0,
            broker_anim_run_ms: 2_000,
            broker_try_interval_ms: 5_000,
            broker_fail_show_ms: 1_500,
            broker_backoff_base_ms: 1_000,
            broker_backoff_max_ms: 30_000,
        }
    }
}

/// Display and UI timing policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayTuning {
    /// How long each screen is shown before rotating.
    pub show_ms: u32,
    /// UI redraw cadence while a screen is active.
    pub ui_tick_ms: u32,
    /// Total duration of the column-wipe transition.
    pub wipe_ms: u32,
    /// A reading older than this is flagged stale.
    pub stale_after_ms: u32,
    /// Hours/minutes alternation period on the clock screen.
    pub clock_toggle_ms: u32,
}

impl Default for DisplayTuning {
    fn default() -> Self {
        Self {
            show_ms: 6_000,
            ui_tick_ms: 150,
            wipe_ms: 360,
            stale_after_ms: 300_000,
            clock_toggle_ms: 2_000,
        }
    }
}

/// Sensor intake policy: accepted ranges and persistence arming threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedLimits {
    pub temp_min_c: f32,
    pub temp_max_c: f32,
    pub hum_min: f32,
    pub hum_max: f32,
    /// Minimum change that marks a reading worth persisting.
    pub persist_delta: f32,
}

impl Default for FeedLimits {
    fn default() -> Self {
        Self {
            temp_min_c: -20.0,
            temp_max_c: 60.0,
            hum_min: 0.0,
            hum_max: 100.0,
            persist_delta: 0.1,
        }
    }
}
