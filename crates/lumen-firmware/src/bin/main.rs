#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use core::cell::RefCell;

use embassy_executor::Spawner;
use embassy_net::StackResources;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_time::{Duration, Instant, Timer};
use esp_hal::clock::CpuClock;
use esp_hal::gpio::{Level, Output, OutputConfig};
use esp_hal::timer::timg::TimerGroup;
use rtt_target::rprintln;
use static_cell::StaticCell;

// Display-LCD panel specific imports
use embedded_graphics::prelude::Point;
use embedded_hal_bus::spi::{ExclusiveDevice, NoDelay};
use esp_hal::spi::master::{Config, Spi};
use mipidsi::interface::SpiInterface;
use mipidsi::{models::ILI9342CRgb565, Builder as MipidsiBuilder, Display, NoResetPin};

use lumen_core::clock::Millis;
use lumen_core::config::{BrokerConfig, ConnTuning, DisplayTuning, FeedLimits, WifiConfig};
use lumen_core::conn::{BrokerSession, ConnectionManager, QoS};
use lumen_core::display::{Frame, MatrixAnimator, MatrixDriver};
use lumen_core::feed::SensorFeed;
use lumen_core::persist::{ReadingsPersister, SettingsStore};
use lumen_core::quiet_hours::{NoWallClock, WallClock};
use lumen_core::screen_manager::ScreenManager;

use lumen_firmware::matrix::FatPixelMatrix;
use lumen_firmware::radio::EspRadioLink;
use lumen_firmware::secrets;
use lumen_firmware::session::{session_worker, ChannelSession};
use lumen_firmware::settings_flash::SettingsPartition;

const DISPLAY_WIDTH: u16 = 320;
const DISPLAY_HEIGHT: u16 = 240;

/// Control loop cadence; the connectivity tick tolerates anything sub-second.
const LOOP_INTERVAL: Duration = Duration::from_millis(5);

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

extern crate alloc;

// This creates a default app-descriptor required by the esp-idf bootloader.
esp_bootloader_esp_idf::esp_app_desc!();

static WIFI: WifiConfig<'static> = WifiConfig {
    ssid: secrets::WIFI_SSID,
    password: secrets::WIFI_PASS,
    static_v4: None,
};

const SUBSCRIPTIONS: &[&str] = &["home/living/temperature", "home/living/humidity"];

// ---------------------------------------------------------------------------
// Shared panel: both the connectivity animator and the screen manager write
// frames here; the render task pushes them to the LCD.
// ---------------------------------------------------------------------------

struct PanelShared {
    frame: Frame,
    dirty: bool,
}

static PANEL: Mutex<CriticalSectionRawMutex, RefCell<PanelShared>> =
    Mutex::new(RefCell::new(PanelShared {
        frame: Frame::new(),
        dirty: true,
    }));

/// Cheap handle writing into [`PANEL`].
struct PanelSink;

impl MatrixDriver for PanelSink {
    fn render(&mut self, frame: &Frame) {
        PANEL.lock(|panel| {
            let mut panel = panel.borrow_mut();
            if panel.frame != *frame {
                panel.frame = *frame;
                panel.dirty = true;
            }
        });
    }
}

type LcdSpiDevice = ExclusiveDevice<Spi<'static, esp_hal::Blocking>, Output<'static>, NoDelay>;
type LcdDisplay = Display<
    SpiInterface<'static, LcdSpiDevice, Output<'static>>,
    ILI9342CRgb565,
    NoResetPin,
>;

#[embassy_executor::task]
async fn render_task(mut matrix: FatPixelMatrix<LcdDisplay>) {
    loop {
        let frame = PANEL.lock(|panel| {
            let mut panel = panel.borrow_mut();
            if panel.dirty {
                panel.dirty = false;
                Some(panel.frame)
            } else {
                None
            }
        });
        if let Some(frame) = frame {
            matrix.render(&frame);
        }
        Timer::after(Duration::from_millis(16)).await;
    }
}

#[embassy_executor::task]
async fn net_task(mut runner: embassy_net::Runner<'static, esp_radio::wifi::WifiDevice<'static>>) {
    runner.run().await
}

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    rtt_target::rtt_init_print!();

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 73744);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    rprintln!("Embassy initialized!");

    // Wifi controller + station interface.
    let radio_init = esp_radio::init().expect("Failed to initialize Wi-Fi/BLE controller");
    let (wifi_controller, interfaces) =
        esp_radio::wifi::new(&radio_init, peripherals.WIFI, Default::default())
            .expect("Failed to initialize Wi-Fi controller");

    // Network stack over the station interface. Static addressing would be
    // configured here; this device uses DHCP.
    let net_config = embassy_net::Config::dhcpv4(Default::default());
    static RESOURCES: StaticCell<StackResources<4>> = StaticCell::new();
    let seed = 0x6c75_6d65_6e00_0001;
    let (stack, runner) = embassy_net::new(
        interfaces.sta,
        net_config,
        RESOURCES.init(StackResources::new()),
        seed,
    );
    spawner.spawn(net_task(runner)).unwrap();
    spawner.spawn(session_worker(stack)).unwrap();

    // Configure and initialize the display.
    let spi_bus = Spi::new(peripherals.SPI2, Config::default())
        .unwrap()
        .with_sck(peripherals.GPIO36)
        .with_mosi(peripherals.GPIO37);
    let cs = Output::new(peripherals.GPIO35, Level::High, OutputConfig::default());
    let spi_device = ExclusiveDevice::new_no_delay(spi_bus, cs).unwrap();
    let dc = Output::new(peripherals.GPIO34, Level::Low, OutputConfig::default());

    static SPI_BUFFER: StaticCell<[u8; 64]> = StaticCell::new();
    let di = SpiInterface::new(spi_device, dc, SPI_BUFFER.init([0u8; 64]));

    let display = MipidsiBuilder::new(ILI9342CRgb565, di)
        .display_size(DISPLAY_WIDTH, DISPLAY_HEIGHT)
        .init(&mut embassy_time::Delay)
        .expect("Failed to initialize display");

    rprintln!("Display initialized!");

    // Center the 12×8 fat-pixel matrix on the panel.
    let matrix = FatPixelMatrix::new(display, Point::new(16, 24));
    spawner.spawn(render_task(matrix)).unwrap();

    // Persistence: restore readings and runtime settings from flash.
    let mut store = SettingsStore::new(SettingsPartition::new(esp_storage::FlashStorage::new()));
    let mut display_tuning = DisplayTuning::default();
    if let Ok(settings) = store.load_settings() {
        settings.apply_to(&mut display_tuning);
    }

    let mut feed = SensorFeed::new(SUBSCRIPTIONS[0], SUBSCRIPTIONS[1], FeedLimits::default());
    if let Ok(readings) = store.load_readings() {
        feed.restore(readings.temp_c, readings.hum, Millis::ZERO);
    }

    let broker = BrokerConfig {
        host: secrets::MQTT_HOST,
        port: secrets::mqtt_port(),
        client_id: "lumen-display",
        credentials: None,
        keep_alive_secs: 30,
        subscriptions: SUBSCRIPTIONS,
        subscribe_qos: QoS::AtMostOnce,
        status_topic: "home/living/display/status",
        status_online: "online",
        status_offline: "offline",
        status_qos: QoS::AtLeastOnce,
        status_retain: true,
    };

    let mut conn = ConnectionManager::new(
        EspRadioLink::new(wifi_controller),
        ChannelSession::new(),
        MatrixAnimator::new(PanelSink),
        &WIFI,
        &broker,
        ConnTuning::default(),
    );

    let mut screens = ScreenManager::new(PanelSink, display_tuning);
    let mut persister = ReadingsPersister::default();
    let wall = NoWallClock;

    loop {
        let now = Millis(Instant::now().as_millis() as u32);

        conn.tick(now);

        if conn.is_connected() {
            conn.session_mut().poll(&mut feed, now);
            screens.tick(now, &feed, wall.local_time());
        }

        if let Err(e) = persister.maybe_persist(&mut store, &mut feed, now) {
            rprintln!("persist failed: {:?}", e);
        }

        Timer::after(LOOP_INTERVAL).await;
    }
}
