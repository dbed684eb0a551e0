//! esp-radio adapter for the connectivity manager's radio seam.

use esp_radio::wifi::{ClientConfiguration, Configuration, WifiController};
use log::warn;

use lumen_core::config::WifiConfig;
use lumen_core::conn::{LinkStatus, RadioLink};

/// [`RadioLink`] over the ESP32 wifi controller.
///
/// `begin_association` is fire-and-forget: errors are logged and surface as a
/// continued `NotAssociated` status, which the state machine resolves through
/// its normal timeout/backoff path. Static addressing is applied when the
/// embassy-net stack is brought up, not here.
pub struct EspRadioLink<'d> {
    controller: WifiController<'d>,
    started: bool,
}

impl<'d> EspRadioLink<'d> {
    pub fn new(controller: WifiController<'d>) -> Self {
        Self {
            controller,
            started: false,
        }
    }
}

impl RadioLink for EspRadioLink<'_> {
    fn status(&self) -> LinkStatus {
        match self.controller.is_connected() {
            Ok(true) => LinkStatus::Associated,
            _ => LinkStatus::NotAssociated,
        }
    }

    fn begin_association(&mut self, config: &WifiConfig<'_>) {
        let client = ClientConfiguration {
            ssid: config.ssid.into(),
            password: config.password.into(),
            ..Default::default()
        };
        if let Err(e) = self
            .controller
            .set_configuration(&Configuration::Client(client))
        {
            warn!("radio: configuration rejected: {e:?}");
            return;
        }
        if !self.started {
            if let Err(e) = self.controller.start() {
                warn!("radio: start failed: {e:?}");
                return;
            }
            self.started = true;
        }
        if let Err(e) = self.controller.connect() {
            warn!("radio: connect request failed: {e:?}");
        }
    }
}
