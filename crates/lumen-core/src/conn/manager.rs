//! Connectivity lifecycle state machine.
//!
//! [`ConnectionManager::tick`] is called by the outer control loop on every
//! iteration. Each call inspects the radio and session adapters, advances
//! timers, triggers at most one feedback draw, and performs at most one state
//! transition. Nothing in here blocks: waiting is expressed as deadline
//! comparisons against the wrapping millisecond clock, re-evaluated on the
//! next tick.
//!
//! Priority order per tick is fixed: radio-loss check, session-loss check,
//! then the handler for the current state. Wifi loss therefore preempts any
//! broker state, including an established session.
//!
//! Failures are never surfaced outward. An association timeout, a refused
//! connect, a failed subscription, or the whole-session ceiling each resolve
//! into a backoff state whose delay doubles per consecutive failure up to a
//! cap, so the machine always keeps retrying but never busy-loops.

use log::debug;

use super::backoff;
use super::traits::{BrokerSession, LinkStatus, RadioLink, SessionOptions, StatusAnimator};
use crate::clock::Millis;
use crate::config::{BrokerConfig, ConnTuning, WifiConfig};

// ---------------------------------------------------------------------------
// States and context
// ---------------------------------------------------------------------------

/// Connectivity lifecycle states.
///
/// `WifiBegin` is transient: its handler issues the association request and
/// leaves within the tick that runs it. `BrokerFailShown` is part of the
/// closed state set and its timed exit works, but no transition in the main
/// graph enters it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    WifiWarmup,
    WifiBegin,
    WifiWait,
    WifiBackoff,
    BrokerAnimating,
    BrokerFailShown,
    BrokerSessionBackoff,
    Connected,
}

/// Mutable state owned exclusively by the manager and touched only via
/// [`ConnectionManager::tick`]. Other subsystems see read-only accessors.
#[derive(Debug, Clone, Copy)]
struct ConnContext {
    state: ConnState,
    /// Stamped on every transition, and only on a transition (plus the
    /// first-ever tick, which the boot sentinel of `Millis::ZERO` marks).
    state_entered_at: Millis,
    last_anim_tick_at: Millis,
    wifi_anim_step: u32,
    broker_anim_phase: u32,
    wifi_backoff_ms: u32,
    wifi_backoff_until: Millis,
    broker_backoff_ms: u32,
    broker_backoff_until: Millis,
    session_started_at: Millis,
    last_attempt_at: Option<Millis>,
}

impl ConnContext {
    fn new() -> Self {
        Self {
            state: ConnState::WifiWarmup,
            state_entered_at: Millis::ZERO,
            last_anim_tick_at: Millis::ZERO,
            wifi_anim_step: 0,
            broker_anim_phase: 0,
            wifi_backoff_ms: 0,
            wifi_backoff_until: Millis::ZERO,
            broker_backoff_ms: 0,
            broker_backoff_until: Millis::ZERO,
            session_started_at: Millis::ZERO,
            last_attempt_at: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// Drives wireless association and broker-session establishment.
///
/// Owns the radio, session, and animator adapters plus the connectivity
/// context; borrows the (flash-resident) configuration.
pub struct ConnectionManager<'c, R, B, A>
where
    R: RadioLink,
    B: BrokerSession,
    A: StatusAnimator,
{
    radio: R,
    session: B,
    animator: A,
    wifi: &'c WifiConfig<'c>,
    broker: &'c BrokerConfig<'c>,
    tuning: ConnTuning,
    ctx: ConnContext,
}

impl<'c, R, B, A> ConnectionManager<'c, R, B, A>
where
    R: RadioLink,
    B: BrokerSession,
    A: StatusAnimator,
{
    pub fn new(
        radio: R,
        session: B,
        animator: A,
        wifi: &'c WifiConfig<'c>,
        broker: &'c BrokerConfig<'c>,
        tuning: ConnTuning,
    ) -> Self {
        Self {
            radio,
            session,
            animator,
            wifi,
            broker,
            tuning,
            ctx: ConnContext::new(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnState {
        self.ctx.state
    }

    /// Whether a broker session is fully established.
    pub fn is_connected(&self) -> bool {
        self.ctx.state == ConnState::Connected
    }

    /// Current radio-layer backoff delay in milliseconds (0 until a failure).
    pub fn wifi_backoff_ms(&self) -> u32 {
        self.ctx.wifi_backoff_ms
    }

    /// Current session-layer backoff delay in milliseconds (0 until a failure).
    pub fn broker_backoff_ms(&self) -> u32 {
        self.ctx.broker_backoff_ms
    }

    /// Access the session adapter, e.g. for the outer loop to drain inbound
    /// messages while connected.
    pub fn session_mut(&mut self) -> &mut B {
        &mut self.session
    }

    /// Advance the lifecycle by one step. Bounded, non-blocking; safe to call
    /// at arbitrary sub-second intervals.
    pub fn tick(&mut self, now: Millis) {
        // Wifi loss preempts everything, including an established session.
        if self.ctx.state == ConnState::Connected
            && self.radio.status() == LinkStatus::NotAssociated
        {
            self.session.stop();
            self.ctx.wifi_anim_step = 0;
            self.transition(ConnState::WifiWarmup, now);
            return;
        }

        if self.ctx.state == ConnState::Connected && !self.session.connected() {
            self.ctx.broker_anim_phase = 0;
            self.ctx.session_started_at = now;
            self.ctx.last_attempt_at = None;
            self.transition(ConnState::BrokerAnimating, now);
            return;
        }

        let next = match self.ctx.state {
            ConnState::WifiWarmup => self.on_wifi_warmup(now),
            ConnState::WifiBegin => self.on_wifi_begin(now),
            ConnState::WifiWait => self.on_wifi_wait(now),
            ConnState::WifiBackoff => self.on_wifi_backoff(now),
            ConnState::BrokerAnimating => self.on_broker_animating(now),
            ConnState::BrokerFailShown => self.on_broker_fail_shown(now),
            ConnState::BrokerSessionBackoff => self.on_broker_session_backoff(now),
            ConnState::Connected => None,
        };

        if let Some(next) = next {
            self.transition(next, now);
        }
    }

    fn transition(&mut self, next: ConnState, now: Millis) {
        debug!("conn: {:?} -> {:?}", self.ctx.state, next);
        self.ctx.state = next;
        self.ctx.state_entered_at = now;
        // Forces the first animation frame of the new state on the next tick.
        self.ctx.last_anim_tick_at = Millis::ZERO;
    }

    // -----------------------------------------------------------------------
    // Per-state handlers. Each returns the next state, or `None` to stay.
    // -----------------------------------------------------------------------

    fn on_wifi_warmup(&mut self, now: Millis) -> Option<ConnState> {
        // First tick after power-on: the context boots with a zero stamp.
        if self.ctx.state_entered_at == Millis::ZERO {
            self.ctx.state_entered_at = now;
            self.animator.draw_associating_frame(0);
        }
        self.animate_wifi(now);
        if now.since(self.ctx.state_entered_at) >= self.tuning.warmup_anim_ms {
            return Some(ConnState::WifiBegin);
        }
        None
    }

    fn on_wifi_begin(&mut self, _now: Millis) -> Option<ConnState> {
        // Static vs. DHCP addressing is the adapter's concern; it reads the
        // config it is handed.
        self.radio.begin_association(self.wifi);
        Some(ConnState::WifiWait)
    }

    fn on_wifi_wait(&mut self, now: Millis) -> Option<ConnState> {
        self.animate_wifi(now);

        if self.radio.status() == LinkStatus::Associated {
            self.ctx.wifi_backoff_ms = 0;
            self.configure_session_once();
            self.ctx.broker_anim_phase = 0;
            self.ctx.session_started_at = now;
            self.ctx.last_attempt_at = None;
            self.animator.draw_session_frame(0);
            return Some(ConnState::BrokerAnimating);
        }

        if now.since(self.ctx.state_entered_at) >= self.tuning.wifi_timeout_ms {
            self.animator.draw_failure_frame(now);
            self.ctx.wifi_backoff_ms = backoff::next_delay(
                self.ctx.wifi_backoff_ms,
                self.tuning.wifi_backoff_base_ms,
                self.tuning.wifi_backoff_max_ms,
            );
            self.ctx.wifi_backoff_until = now.wrapping_add(self.ctx.wifi_backoff_ms);
            return Some(ConnState::WifiBackoff);
        }
        None
    }

    fn on_wifi_backoff(&mut self, now: Millis) -> Option<ConnState> {
        self.animator.draw_failure_frame(now);
        if now.reached(self.ctx.wifi_backoff_until) {
            self.ctx.wifi_anim_step = 0;
            self.animator.draw_associating_frame(0);
            return Some(ConnState::WifiWarmup);
        }
        None
    }

    fn on_broker_animating(&mut self, now: Millis) -> Option<ConnState> {
        self.animate_broker(now);

        let total = self.tuning.broker_total_timeout_ms;
        if total > 0 && now.since(self.ctx.session_started_at) >= total {
            self.animator.draw_failure_frame(now);
            self.arm_broker_backoff(now);
            return Some(ConnState::BrokerSessionBackoff);
        }

        if now.since(self.ctx.state_entered_at) >= self.tuning.broker_anim_run_ms {
            let due = match self.ctx.last_attempt_at {
                None => true,
                Some(at) => now.since(at) >= self.tuning.broker_try_interval_ms,
            };
            if due {
                self.ctx.last_attempt_at = Some(now);
                if self.try_establish() {
                    self.ctx.broker_backoff_ms = 0;
                    return Some(ConnState::Connected);
                }
                // Failed attempt: stay here, next attempt is interval-gated.
            }
        }
        None
    }

    fn on_broker_fail_shown(&mut self, now: Millis) -> Option<ConnState> {
        self.animator.draw_failure_frame(now);
        if now.since(self.ctx.state_entered_at) >= self.tuning.broker_fail_show_ms {
            self.arm_broker_backoff(now);
            return Some(ConnState::BrokerSessionBackoff);
        }
        None
    }

    fn on_broker_session_backoff(&mut self, now: Millis) -> Option<ConnState> {
        self.animator.draw_failure_frame(now);
        if now.reached(self.ctx.broker_backoff_until) {
            if self.radio.status() == LinkStatus::NotAssociated {
                self.ctx.wifi_anim_step = 0;
                self.animator.draw_associating_frame(0);
                return Some(ConnState::WifiWarmup);
            }
            self.ctx.broker_anim_phase = 0;
            self.ctx.session_started_at = now;
            self.animator.draw_session_frame(0);
            return Some(ConnState::BrokerAnimating);
        }
        None
    }

    // -----------------------------------------------------------------------
    // Actions
    // -----------------------------------------------------------------------

    fn animate_wifi(&mut self, now: Millis) {
        if now.since(self.ctx.last_anim_tick_at) >= self.tuning.wifi_anim_tick_ms {
            self.ctx.last_anim_tick_at = now;
            self.animator
                .draw_associating_frame(self.ctx.wifi_anim_step % 5);
            self.ctx.wifi_anim_step = self.ctx.wifi_anim_step.wrapping_add(1);
        }
    }

    fn animate_broker(&mut self, now: Millis) {
        if now.since(self.ctx.last_anim_tick_at) >= self.tuning.broker_anim_tick_ms {
            self.ctx.last_anim_tick_at = now;
            let phase = self.ctx.broker_anim_phase;
            self.ctx.broker_anim_phase = phase.wrapping_add(1);
            self.animator.draw_session_frame(phase);
        }
    }

    /// One-time session parameters, applied on each fresh association.
    fn configure_session_once(&mut self) {
        self.session.configure(&SessionOptions {
            client_id: self.broker.client_id,
            clean_session: true,
            keep_alive_secs: self.broker.keep_alive_secs,
            credentials: self.broker.credentials,
        });
        self.session.configure_last_will(
            self.broker.status_topic,
            self.broker.status_offline.as_bytes(),
            self.broker.status_retain,
            self.broker.status_qos,
        );
    }

    /// One compound connect + subscribe + announce attempt.
    ///
    /// A session that cannot subscribe to every required topic is stopped
    /// immediately rather than left half-subscribed.
    fn try_establish(&mut self) -> bool {
        if !self.session.connect(self.broker.host, self.broker.port) {
            return false;
        }
        for topic in self.broker.subscriptions {
            if !self.session.subscribe(topic, self.broker.subscribe_qos) {
                self.session.stop();
                return false;
            }
        }
        self.session.publish_retained(
            self.broker.status_topic,
            self.broker.status_online.as_bytes(),
            self.broker.status_qos,
        );
        true
    }

    fn arm_broker_backoff(&mut self, now: Millis) {
        self.ctx.broker_backoff_ms = backoff::next_delay(
            self.ctx.broker_backoff_ms,
            self.tuning.broker_backoff_base_ms,
            self.tuning.broker_backoff_max_ms,
        );
        self.ctx.broker_backoff_until = now.wrapping_add(self.ctx.broker_backoff_ms);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conn::QoS;
    use core::cell::{Cell, RefCell};

    struct FakeRadio {
        associated: Cell<bool>,
        begins: Cell<u32>,
    }

    impl FakeRadio {
        fn new() -> Self {
            Self {
                associated: Cell::new(false),
                begins: Cell::new(0),
            }
        }
    }

    impl RadioLink for &FakeRadio {
        fn status(&self) -> LinkStatus {
            if self.associated.get() {
                LinkStatus::Associated
            } else {
                LinkStatus::NotAssociated
            }
        }

        fn begin_association(&mut self, _config: &WifiConfig<'_>) {
            self.begins.set(self.begins.get() + 1);
        }
    }

    #[derive(Default)]
    struct FakeSession {
        accept_connect: Cell<bool>,
        fail_subscribe: Cell<bool>,
        connected: Cell<bool>,
        connects: Cell<u32>,
        stops: Cell<u32>,
        configures: Cell<u32>,
        wills: Cell<u32>,
        subscribed: RefCell<heapless::Vec<heapless::String<32>, 8>>,
        retained: RefCell<heapless::Vec<heapless::String<32>, 8>>,
    }

    impl BrokerSession for &FakeSession {
        fn configure(&mut self, _options: &SessionOptions<'_>) {
            self.configures.set(self.configures.get() + 1);
        }

        fn configure_last_will(
            &mut self,
            _topic: &str,
            _payload: &[u8],
            _retain: bool,
            _qos: QoS,
        ) {
            self.wills.set(self.wills.get() + 1);
        }

        fn connect(&mut self, _host: &str, _port: u16) -> bool {
            self.connects.set(self.connects.get() + 1);
            if self.accept_connect.get() {
                self.connected.set(true);
                true
            } else {
                false
            }
        }

        fn connected(&self) -> bool {
            self.connected.get()
        }

        fn subscribe(&mut self, topic: &str, _qos: QoS) -> bool {
            if self.fail_subscribe.get() {
                return false;
            }
            let mut owned = heapless::String::new();
            owned.push_str(topic).unwrap();
            self.subscribed.borrow_mut().push(owned).unwrap();
            true
        }

        fn publish_retained(&mut self, topic: &str, _payload: &[u8], _qos: QoS) {
            let mut owned = heapless::String::new();
            owned.push_str(topic).unwrap();
            self.retained.borrow_mut().push(owned).unwrap();
        }

        fn stop(&mut self) {
            self.stops.set(self.stops.get() + 1);
            self.connected.set(false);
        }

        fn poll<S: super::super::traits::MessageSink>(&mut self, _sink: &mut S, _now: Millis) {}
    }

    #[derive(Default)]
    struct RecordingAnimator {
        associating_frames: Cell<u32>,
        session_frames: Cell<u32>,
        failure_frames: Cell<u32>,
        last_step: Cell<u32>,
    }

    impl StatusAnimator for &RecordingAnimator {
        fn draw_associating_frame(&mut self, step: u32) {
            self.associating_frames.set(self.associating_frames.get() + 1);
            self.last_step.set(step);
        }

        fn draw_session_frame(&mut self, _phase: u32) {
            self.session_frames.set(self.session_frames.get() + 1);
        }

        fn draw_failure_frame(&mut self, _now: Millis) {
            self.failure_frames.set(self.failure_frames.get() + 1);
        }
    }

    const SUBSCRIPTIONS: &[&str] = &["home/temp", "home/hum"];

    fn wifi_config() -> WifiConfig<'static> {
        WifiConfig {
            ssid: "testnet",
            password: "hunter2",
            static_v4: None,
        }
    }

    fn broker_config() -> BrokerConfig<'static> {
        BrokerConfig {
            host: "broker.local",
            port: 1883,
            client_id: "lumen-display",
            credentials: None,
            keep_alive_secs: 30,
            subscriptions: SUBSCRIPTIONS,
            subscribe_qos: QoS::AtMostOnce,
            status_topic: "home/display/status",
            status_online: "online",
            status_offline: "offline",
            status_qos: QoS::AtLeastOnce,
            status_retain: true,
        }
    }

    /// Tick every 50 ms over `(from, to]`.
    macro_rules! run_ticks {
        ($mgr:expr, $from:expr, $to:expr) => {
            let mut t = $from + 50;
            while t <= $to {
                $mgr.tick(Millis(t));
                t += 50;
            }
        };
    }

    #[test]
    fn test_warmup_then_begin_then_wait() {
        let radio = FakeRadio::new();
        let session = FakeSession::default();
        let anim = RecordingAnimator::default();
        let wifi = wifi_config();
        let broker = broker_config();
        let tuning = ConnTuning::default();
        let mut mgr = ConnectionManager::new(&radio, &session, &anim, &wifi, &broker, tuning);

        mgr.tick(Millis(1_000));
        assert_eq!(mgr.state(), ConnState::WifiWarmup);
        assert!(anim.associating_frames.get() >= 1);

        // One transition per tick: the warm-up expiry tick lands on WifiBegin,
        // the next tick issues the association request and moves to WifiWait.
        run_ticks!(mgr, 1_000, 1_000 + tuning.warmup_anim_ms);
        assert_eq!(mgr.state(), ConnState::WifiBegin);
        assert_eq!(radio.begins.get(), 0);

        mgr.tick(Millis(1_000 + tuning.warmup_anim_ms + 50));
        assert_eq!(mgr.state(), ConnState::WifiWait);
        assert_eq!(radio.begins.get(), 1);
    }

    #[test]
    fn test_association_timeout_backs_off_with_base_delay() {
        let radio = FakeRadio::new();
        let session = FakeSession::default();
        let anim = RecordingAnimator::default();
        let wifi = wifi_config();
        let broker = broker_config();
        let tuning = ConnTuning::default();
        let mut mgr = ConnectionManager::new(&radio, &session, &anim, &wifi, &broker, tuning);

        let wait_start = 1_000 + tuning.warmup_anim_ms + 100;
        run_ticks!(mgr, 950, wait_start);
        assert_eq!(mgr.state(), ConnState::WifiWait);

        run_ticks!(mgr, wait_start, wait_start + tuning.wifi_timeout_ms + 100);
        assert_eq!(mgr.state(), ConnState::WifiBackoff);
        assert_eq!(mgr.wifi_backoff_ms(), tuning.wifi_backoff_base_ms);
        assert!(anim.failure_frames.get() >= 1);
    }

    #[test]
    fn test_repeated_timeouts_double_backoff_to_cap() {
        let radio = FakeRadio::new();
        let session = FakeSession::default();
        let anim = RecordingAnimator::default();
        let wifi = wifi_config();
        let broker = broker_config();
        let tuning = ConnTuning::default();
        let mut mgr = ConnectionManager::new(&radio, &session, &anim, &wifi, &broker, tuning);

        let mut now = 1_000;
        let mut observed = heapless::Vec::<u32, 12>::new();
        for _ in 0..8 {
            // Drive until the next WifiBackoff entry.
            while mgr.state() != ConnState::WifiBackoff {
                now += 50;
                mgr.tick(Millis(now));
            }
            observed.push(mgr.wifi_backoff_ms()).unwrap();
            // Sit out the backoff window.
            while mgr.state() == ConnState::WifiBackoff {
                now += 50;
                mgr.tick(Millis(now));
            }
        }

        assert_eq!(
            observed.as_slice(),
            &[1_000, 2_000, 4_000, 8_000, 16_000, 30_000, 30_000, 30_000]
        );
    }

    #[test]
    fn test_association_resets_wifi_backoff_and_configures_session() {
        let radio = FakeRadio::new();
        let session = FakeSession::default();
        let anim = RecordingAnimator::default();
        let wifi = wifi_config();
        let broker = broker_config();
        let tuning = ConnTuning::default();
        let mut mgr = ConnectionManager::new(&radio, &session, &anim, &wifi, &broker, tuning);

        // One failed cycle first, so backoff is nonzero going in.
        let mut now = 1_000;
        while mgr.state() != ConnState::WifiBackoff {
            now += 50;
            mgr.tick(Millis(now));
        }
        assert_eq!(mgr.wifi_backoff_ms(), 1_000);
        while mgr.state() != ConnState::WifiWait {
            now += 50;
            mgr.tick(Millis(now));
        }

        radio.associated.set(true);
        now += 50;
        mgr.tick(Millis(now));
        assert_eq!(mgr.state(), ConnState::BrokerAnimating);
        assert_eq!(mgr.wifi_backoff_ms(), 0);
        assert_eq!(session.configures.get(), 1);
        assert_eq!(session.wills.get(), 1);
    }

    #[test]
    fn test_connect_and_subscribe_success_reaches_connected() {
        let radio = FakeRadio::new();
        let session = FakeSession::default();
        let anim = RecordingAnimator::default();
        let wifi = wifi_config();
        let broker = broker_config();
        let tuning = ConnTuning::default();
        let mut mgr = ConnectionManager::new(&radio, &session, &anim, &wifi, &broker, tuning);

        radio.associated.set(true);
        session.accept_connect.set(true);

        let mut now = 1_000;
        while mgr.state() != ConnState::Connected {
            now += 50;
            mgr.tick(Millis(now));
            assert!(now < 60_000, "never reached Connected");
        }

        assert_eq!(mgr.broker_backoff_ms(), 0);
        let subscribed = session.subscribed.borrow();
        assert_eq!(subscribed.len(), 2);
        assert_eq!(subscribed[0].as_str(), "home/temp");
        assert_eq!(subscribed[1].as_str(), "home/hum");
        let retained = session.retained.borrow();
        assert_eq!(retained.len(), 1);
        assert_eq!(retained[0].as_str(), "home/display/status");
    }

    #[test]
    fn test_subscribe_failure_stops_session_and_stays() {
        let radio = FakeRadio::new();
        let session = FakeSession::default();
        let anim = RecordingAnimator::default();
        let wifi = wifi_config();
        let broker = broker_config();
        let tuning = ConnTuning::default();
        let mut mgr = ConnectionManager::new(&radio, &session, &anim, &wifi, &broker, tuning);

        radio.associated.set(true);
        session.accept_connect.set(true);
        session.fail_subscribe.set(true);

        let mut now = 1_000;
        while session.connects.get() == 0 {
            now += 50;
            mgr.tick(Millis(now));
            assert!(now < 60_000, "no connect attempt issued");
        }

        assert_eq!(mgr.state(), ConnState::BrokerAnimating);
        assert_eq!(session.stops.get(), 1);
        assert!(session.retained.borrow().is_empty());
    }

    #[test]
    fn test_connect_attempt_cadence() {
        let radio = FakeRadio::new();
        let session = FakeSession::default();
        let anim = RecordingAnimator::default();
        let wifi = wifi_config();
        let broker = broker_config();
        let tuning = ConnTuning::default();
        let mut mgr = ConnectionManager::new(&radio, &session, &anim, &wifi, &broker, tuning);

        radio.associated.set(true);

        // Drive to BrokerAnimating and note its entry time.
        let mut now = 1_000;
        while mgr.state() != ConnState::BrokerAnimating {
            now += 50;
            mgr.tick(Millis(now));
        }
        let entered = now;

        // First attempt happens at entry + anim run, not earlier.
        let mut first_attempt = 0;
        while session.connects.get() == 0 {
            now += 50;
            mgr.tick(Millis(now));
            if session.connects.get() == 1 {
                first_attempt = now;
            }
            assert!(now < entered + 10_000);
        }
        assert_eq!(first_attempt, entered + tuning.broker_anim_run_ms);

        // Connect refused; the retry waits out the try interval.
        let mut second_attempt = 0;
        while session.connects.get() == 1 {
            now += 50;
            mgr.tick(Millis(now));
            if session.connects.get() == 2 {
                second_attempt = now;
            }
            assert!(now < first_attempt + 10_000);
        }
        assert_eq!(second_attempt, first_attempt + tuning.broker_try_interval_ms);
    }

    #[test]
    fn test_radio_loss_preempts_connected() {
        let radio = FakeRadio::new();
        let session = FakeSession::default();
        let anim = RecordingAnimator::default();
        let wifi = wifi_config();
        let broker = broker_config();
        let tuning = ConnTuning::default();
        let mut mgr = ConnectionManager::new(&radio, &session, &anim, &wifi, &broker, tuning);

        radio.associated.set(true);
        session.accept_connect.set(true);
        let mut now = 1_000;
        while mgr.state() != ConnState::Connected {
            now += 50;
            mgr.tick(Millis(now));
        }

        radio.associated.set(false);
        mgr.tick(Millis(now + 50));
        assert_eq!(mgr.state(), ConnState::WifiWarmup);
        assert_eq!(session.stops.get(), 1);
    }

    #[test]
    fn test_session_loss_restarts_broker_phase() {
        let radio = FakeRadio::new();
        let session = FakeSession::default();
        let anim = RecordingAnimator::default();
        let wifi = wifi_config();
        let broker = broker_config();
        let tuning = ConnTuning::default();
        let mut mgr = ConnectionManager::new(&radio, &session, &anim, &wifi, &broker, tuning);

        radio.associated.set(true);
        session.accept_connect.set(true);
        let mut now = 1_000;
        while mgr.state() != ConnState::Connected {
            now += 50;
            mgr.tick(Millis(now));
        }

        session.connected.set(false);
        mgr.tick(Millis(now + 50));
        assert_eq!(mgr.state(), ConnState::BrokerAnimating);
        // Radio is still up, so no association restart.
        assert_eq!(radio.begins.get(), 1);
    }

    #[test]
    fn test_session_total_timeout_backs_off_and_doubles() {
        let radio = FakeRadio::new();
        let session = FakeSession::default();
        let anim = RecordingAnimator::default();
        let wifi = wifi_config();
        let broker = broker_config();
        let tuning = ConnTuning {
            broker_total_timeout_ms: 10_000,
            ..ConnTuning::default()
        };
        let mut mgr = ConnectionManager::new(&radio, &session, &anim, &wifi, &broker, tuning);

        radio.associated.set(true);

        let mut now = 1_000;
        let mut observed = heapless::Vec::<u32, 4>::new();
        for _ in 0..3 {
            while mgr.state() != ConnState::BrokerSessionBackoff {
                now += 50;
                mgr.tick(Millis(now));
            }
            observed.push(mgr.broker_backoff_ms()).unwrap();
            while mgr.state() == ConnState::BrokerSessionBackoff {
                now += 50;
                mgr.tick(Millis(now));
            }
            // Radio still associated: the retry goes straight back to the
            // broker phase.
            assert_eq!(mgr.state(), ConnState::BrokerAnimating);
        }

        assert_eq!(observed.as_slice(), &[1_000, 2_000, 4_000]);
    }

    #[test]
    fn test_session_backoff_falls_back_to_wifi_when_radio_lost() {
        let radio = FakeRadio::new();
        let session = FakeSession::default();
        let anim = RecordingAnimator::default();
        let wifi = wifi_config();
        let broker = broker_config();
        let tuning = ConnTuning {
            broker_total_timeout_ms: 10_000,
            ..ConnTuning::default()
        };
        let mut mgr = ConnectionManager::new(&radio, &session, &anim, &wifi, &broker, tuning);

        radio.associated.set(true);
        let mut now = 1_000;
        while mgr.state() != ConnState::BrokerSessionBackoff {
            now += 50;
            mgr.tick(Millis(now));
        }

        radio.associated.set(false);
        while mgr.state() == ConnState::BrokerSessionBackoff {
            now += 50;
            mgr.tick(Millis(now));
        }
        assert_eq!(mgr.state(), ConnState::WifiWarmup);
    }

    #[test]
    fn test_fail_shown_exits_into_session_backoff() {
        let radio = FakeRadio::new();
        let session = FakeSession::default();
        let anim = RecordingAnimator::default();
        let wifi = wifi_config();
        let broker = broker_config();
        let tuning = ConnTuning::default();
        let mut mgr = ConnectionManager::new(&radio, &session, &anim, &wifi, &broker, tuning);

        mgr.ctx.state = ConnState::BrokerFailShown;
        mgr.ctx.state_entered_at = Millis(5_000);

        mgr.tick(Millis(5_100));
        assert_eq!(mgr.state(), ConnState::BrokerFailShown);
        assert!(anim.failure_frames.get() >= 1);

        mgr.tick(Millis(5_000 + tuning.broker_fail_show_ms));
        assert_eq!(mgr.state(), ConnState::BrokerSessionBackoff);
        assert_eq!(mgr.broker_backoff_ms(), tuning.broker_backoff_base_ms);
    }

    #[test]
    fn test_connected_is_quiescent_while_healthy() {
        let radio = FakeRadio::new();
        let session = FakeSession::default();
        let anim = RecordingAnimator::default();
        let wifi = wifi_config();
        let broker = broker_config();
        let tuning = ConnTuning::default();
        let mut mgr = ConnectionManager::new(&radio, &session, &anim, &wifi, &broker, tuning);

        radio.associated.set(true);
        session.accept_connect.set(true);
        let mut now = 1_000;
        while mgr.state() != ConnState::Connected {
            now += 50;
            mgr.tick(Millis(now));
        }

        let failures_before = anim.failure_frames.get();
        run_ticks!(mgr, now, now + 30_000);
        assert_eq!(mgr.state(), ConnState::Connected);
        assert_eq!(anim.failure_frames.get(), failures_before);
    }
}
