//! Loads wifi/broker credentials from a `.env` file next to the crate and
//! re-exports them as compile-time environment variables.

fn main() {
    println!("cargo:rerun-if-changed=.env");
    let _ = dotenvy::dotenv();

    for key in [
        "LUMEN_WIFI_SSID",
        "LUMEN_WIFI_PASS",
        "LUMEN_MQTT_HOST",
        "LUMEN_MQTT_PORT",
    ] {
        if let Ok(value) = std::env::var(key) {
            println!("cargo:rustc-env={key}={value}");
        }
    }
}
