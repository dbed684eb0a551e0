//! Build-time credentials, injected from `.env` by the build script.

pub const WIFI_SSID: &str = env!("LUMEN_WIFI_SSID");
pub const WIFI_PASS: &str = env!("LUMEN_WIFI_PASS");
pub const MQTT_HOST: &str = env!("LUMEN_MQTT_HOST");

pub fn mqtt_port() -> u16 {
    env!("LUMEN_MQTT_PORT").parse().unwrap_or(1883)
}
