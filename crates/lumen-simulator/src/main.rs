//! Desktop simulator for the lumen-rs status display.
//!
//! Runs the real connectivity state machine and screen rotation against
//! scripted radio/broker doubles, rendering the 12×8 matrix as block glyphs
//! in the terminal. The scripted timeline exercises the interesting paths:
//!
//! | Simulated time | Event                                            |
//! |----------------|--------------------------------------------------|
//! | 0 s            | power-on, warm-up animation                      |
//! | 3 s after join | association completes                            |
//! | first connects | broker refuses twice (retry-interval backoff)    |
//! | 25–27 s        | radio outage: Connected → warm-up preemption     |
//! | 45 s           | broker drops the session once                    |
//!
//! Synthetic temperature/humidity messages arrive every two seconds while
//! the session is up. Run with `RUST_LOG=debug` to watch the transitions;
//! an optional argument sets the run duration in seconds (default 60).

use std::cell::{Cell, RefCell};
use std::convert::Infallible;
use std::io::Write as _;
use std::rc::Rc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use log::info;

use lumen_core::clock::Millis;
use lumen_core::config::{
    BrokerConfig, ConnTuning, DisplayTuning, FeedLimits, WifiConfig,
};
use lumen_core::conn::{
    BrokerSession, ConnectionManager, LinkStatus, MessageSink, QoS, RadioLink, SessionOptions,
};
use lumen_core::display::{Frame, MatrixAnimator, MatrixDriver, HEIGHT, WIDTH};
use lumen_core::feed::SensorFeed;
use lumen_core::persist::{ReadingsPersister, SettingsStore};
use lumen_core::quiet_hours::{LocalTime, WallClock};
use lumen_core::screen_manager::ScreenManager;

/// Control loop cadence.
const TICK: Duration = Duration::from_millis(5);

/// Cadence of synthetic sensor publishes.
const PUBLISH_INTERVAL_MS: u32 = 2_000;

// ---------------------------------------------------------------------------
// Shared panel
// ---------------------------------------------------------------------------

/// Latest rendered frame, shared between the connectivity animator and the
/// screen manager. Cloning hands out another handle to the same panel.
#[derive(Clone)]
struct PanelHandle {
    inner: Rc<RefCell<Panel>>,
}

struct Panel {
    frame: Frame,
    dirty: bool,
}

impl PanelHandle {
    fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Panel {
                frame: Frame::new(),
                dirty: true,
            })),
        }
    }

    /// The latest frame, if it changed since the last call.
    fn take_changed(&self) -> Option<Frame> {
        let mut panel = self.inner.borrow_mut();
        if panel.dirty {
            panel.dirty = false;
            Some(panel.frame)
        } else {
            None
        }
    }
}

impl MatrixDriver for PanelHandle {
    fn render(&mut self, frame: &Frame) {
        let mut panel = self.inner.borrow_mut();
        if panel.frame != *frame {
            panel.frame = *frame;
            panel.dirty = true;
        }
    }
}

/// Draw the matrix as fat block pixels, repainting in place.
fn paint(frame: &Frame, status: &str) {
    // Cursor home; the frame height plus status line is repainted each time.
    print!("\x1B[H");
    println!("┌{}┐", "──".repeat(WIDTH));
    for y in 0..HEIGHT as i32 {
        print!("│");
        for x in 0..WIDTH as i32 {
            print!("{}", if frame.get(x, y) { "██" } else { "  " });
        }
        println!("│");
    }
    println!("└{}┘", "──".repeat(WIDTH));
    println!("{status:<60}");
    let _ = std::io::stdout().flush();
}

// ---------------------------------------------------------------------------
// Scripted radio
// ---------------------------------------------------------------------------

/// Radio double: associates a fixed delay after each join request and goes
/// deaf during the scripted outage window.
struct ScriptedRadio {
    associate_delay_ms: u32,
    outage: (u32, u32),
    begun_at: Cell<Option<Millis>>,
    now: Cell<Millis>,
}

impl ScriptedRadio {
    fn new(associate_delay_ms: u32, outage: (u32, u32)) -> Self {
        Self {
            associate_delay_ms,
            outage,
            begun_at: Cell::new(None),
            now: Cell::new(Millis::ZERO),
        }
    }

    fn set_now(&self, now: Millis) {
        self.now.set(now);
    }

    fn in_outage(&self) -> bool {
        let t = self.now.get().0;
        t >= self.outage.0 && t < self.outage.1
    }
}

impl RadioLink for &ScriptedRadio {
    fn status(&self) -> LinkStatus {
        let associated = match self.begun_at.get() {
            Some(at) => self.now.get().since(at) >= self.associate_delay_ms,
            None => false,
        };
        if associated && !self.in_outage() {
            LinkStatus::Associated
        } else {
            LinkStatus::NotAssociated
        }
    }

    fn begin_association(&mut self, config: &WifiConfig<'_>) {
        info!("radio: joining {:?}", config.ssid);
        self.begun_at.set(Some(self.now.get()));
    }
}

// ---------------------------------------------------------------------------
// Scripted broker
// ---------------------------------------------------------------------------

/// Broker double: refuses the first connects, then serves synthetic readings
/// and drops the session once at a scripted time.
struct ScriptedBroker {
    refuse_connects: Cell<u32>,
    drop_at: Cell<Option<u32>>,
    connected: Cell<bool>,
    last_publish_at: Cell<Millis>,
    now: Cell<Millis>,
}

impl ScriptedBroker {
    fn new(refuse_connects: u32, drop_at_ms: u32) -> Self {
        Self {
            refuse_connects: Cell::new(refuse_connects),
            drop_at: Cell::new(Some(drop_at_ms)),
            connected: Cell::new(false),
            last_publish_at: Cell::new(Millis::ZERO),
            now: Cell::new(Millis::ZERO),
        }
    }

    fn set_now(&self, now: Millis) {
        self.now.set(now);
        if let Some(drop_at) = self.drop_at.get() {
            if self.connected.get() && now.0 >= drop_at {
                info!("broker: dropping session");
                self.drop_at.set(None);
                self.connected.set(false);
            }
        }
    }
}

impl BrokerSession for &ScriptedBroker {
    fn configure(&mut self, options: &SessionOptions<'_>) {
        info!("broker: session configured as {:?}", options.client_id);
    }

    fn configure_last_will(&mut self, topic: &str, _payload: &[u8], _retain: bool, _qos: QoS) {
        info!("broker: last will registered on {topic}");
    }

    fn connect(&mut self, host: &str, port: u16) -> bool {
        let refusals = self.refuse_connects.get();
        if refusals > 0 {
            self.refuse_connects.set(refusals - 1);
            info!("broker: connect to {host}:{port} refused");
            return false;
        }
        info!("broker: connected to {host}:{port}");
        self.connected.set(true);
        self.last_publish_at.set(self.now.get());
        true
    }

    fn connected(&self) -> bool {
        self.connected.get()
    }

    fn subscribe(&mut self, topic: &str, _qos: QoS) -> bool {
        info!("broker: subscribed to {topic}");
        true
    }

    fn publish_retained(&mut self, topic: &str, payload: &[u8], _qos: QoS) {
        info!(
            "broker: retained {} = {:?}",
            topic,
            core::str::from_utf8(payload).unwrap_or("<binary>")
        );
    }

    fn stop(&mut self) {
        self.connected.set(false);
    }

    fn poll<S: MessageSink>(&mut self, sink: &mut S, now: Millis) {
        if !self.connected.get() || now.since(self.last_publish_at.get()) < PUBLISH_INTERVAL_MS {
            return;
        }
        self.last_publish_at.set(now);

        // Slowly drifting synthetic environment.
        let t = now.0 as f32 / 1_000.0;
        let temp = 21.0 + 2.5 * (t / 40.0).sin();
        let hum = 50.0 + 8.0 * (t / 60.0).cos();
        sink.on_message("home/living/temperature", format!("{temp:.1}").as_bytes(), now);
        sink.on_message("home/living/humidity", format!("{hum:.0}").as_bytes(), now);
    }
}

// ---------------------------------------------------------------------------
// Wall clock
// ---------------------------------------------------------------------------

/// Host wall clock in UTC; good enough to exercise the clock screen and the
/// night schedule without pulling in timezone data.
struct HostWallClock;

impl WallClock for HostWallClock {
    fn local_time(&self) -> Option<LocalTime> {
        let secs = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_secs();
        let day_secs = (secs % 86_400) as u32;
        Some(LocalTime {
            hour: (day_secs / 3_600) as u8,
            minute: (day_secs / 60 % 60) as u8,
            second: (day_secs % 60) as u8,
            // The epoch fell on a Thursday.
            weekday0: ((secs / 86_400 + 4) % 7) as u8,
        })
    }
}

// ---------------------------------------------------------------------------
// In-memory settings storage
// ---------------------------------------------------------------------------

struct MemStorage {
    bytes: [u8; 256],
}

impl embedded_storage::ReadStorage for MemStorage {
    type Error = Infallible;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let offset = offset as usize;
        bytes.copy_from_slice(&self.bytes[offset..offset + bytes.len()]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.bytes.len()
    }
}

impl embedded_storage::Storage for MemStorage {
    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        let offset = offset as usize;
        self.bytes[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

const SUBSCRIPTIONS: &[&str] = &["home/living/temperature", "home/living/humidity"];

fn main() {
    env_logger::init();

    let run_secs: u64 = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(60);
    info!("starting lumen simulator for {run_secs}s");

    let wifi = WifiConfig {
        ssid: "simnet",
        password: "simnet-pass",
        static_v4: None,
    };
    let broker_cfg = BrokerConfig {
        host: "broker.sim",
        port: 1883,
        client_id: "lumen-sim",
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

    let radio = ScriptedRadio::new(3_000, (25_000, 27_000));
    let broker = ScriptedBroker::new(2, 45_000);
    let panel = PanelHandle::new();

    let mut conn = ConnectionManager::new(
        &radio,
        &broker,
        MatrixAnimator::new(panel.clone()),
        &wifi,
        &broker_cfg,
        ConnTuning::default(),
    );

    let mut feed = SensorFeed::new(SUBSCRIPTIONS[0], SUBSCRIPTIONS[1], FeedLimits::default());
    let mut screens = ScreenManager::new(panel.clone(), DisplayTuning::default());
    let mut store = SettingsStore::new(MemStorage { bytes: [0xFF; 256] });
    // Short throttle so persistence is visible within the demo run.
    let mut persister = ReadingsPersister::new(15_000);
    let wall = HostWallClock;

    // Restore anything a previous run would have left behind.
    if let Ok(readings) = store.load_readings() {
        feed.restore(readings.temp_c, readings.hum, Millis::ZERO);
    }

    print!("\x1B[2J");
    let started = Instant::now();
    let deadline = started + Duration::from_secs(run_secs);

    while Instant::now() < deadline {
        let now = Millis(started.elapsed().as_millis() as u32);
        radio.set_now(now);
        broker.set_now(now);

        conn.tick(now);

        if conn.is_connected() {
            conn.session_mut().poll(&mut feed, now);
            screens.tick(now, &feed, wall.local_time());
        }

        if let Ok(true) = persister.maybe_persist(&mut store, &mut feed, now) {
            info!("persisted readings at t={}ms", now.0);
        }

        if let Some(frame) = panel.take_changed() {
            let status = format!(
                "t={:>6}ms  state={:?}  temp={:?}  hum={:?}",
                now.0,
                conn.state(),
                feed.temperature(),
                feed.humidity(),
            );
            paint(&frame, &status);
        }

        std::thread::sleep(TICK);
    }

    println!("\nsimulation finished after {run_secs}s");
}
