//! Adapter seams between the connectivity manager and the outside world.
//!
//! The state machine never talks to hardware or a protocol stack directly; it
//! drives these traits. Every method is required to return promptly: an
//! implementation may run its own bounded internal timeout, but it must never
//! park the control loop.

use crate::clock::Millis;
use crate::config::WifiConfig;

/// Delivery guarantee requested for a subscription or publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QoS {
    /// At most once.
    AtMostOnce,
    /// At least once.
    AtLeastOnce,
}

/// Radio-layer association status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Associated,
    NotAssociated,
}

/// Wireless radio: association status plus an asynchronous join request.
pub trait RadioLink {
    /// Current association status. Cheap, called every tick.
    fn status(&self) -> LinkStatus;

    /// Kick off association with the configured network. Fire-and-forget:
    /// the result is observed later through [`RadioLink::status`]. The
    /// adapter applies static addressing when `config.static_v4` is set,
    /// DHCP otherwise.
    fn begin_association(&mut self, config: &WifiConfig<'_>);
}

/// One-time session parameters applied before the first connect attempt.
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions<'a> {
    pub client_id: &'a str,
    pub clean_session: bool,
    pub keep_alive_secs: u16,
    pub credentials: Option<(&'a str, &'a str)>,
}

/// Consumer of inbound publish/subscribe messages drained by `poll`.
pub trait MessageSink {
    fn on_message(&mut self, topic: &str, payload: &[u8], now: Millis);
}

/// Broker session: connect/subscribe/publish surface over the messaging
/// protocol, used as a black box.
pub trait BrokerSession {
    /// Apply identity and keep-alive parameters. Called once per association,
    /// before any connect attempt.
    fn configure(&mut self, options: &SessionOptions<'_>);

    /// Register the retained last-will message the broker publishes on our
    /// behalf if the session dies unexpectedly.
    fn configure_last_will(&mut self, topic: &str, payload: &[u8], retain: bool, qos: QoS);

    /// One bounded connect attempt. `true` means the session is established.
    fn connect(&mut self, host: &str, port: u16) -> bool;

    /// Whether the session is currently established.
    fn connected(&self) -> bool;

    /// Subscribe to one topic. `true` on acknowledged subscription.
    fn subscribe(&mut self, topic: &str, qos: QoS) -> bool;

    /// Publish a retained message.
    fn publish_retained(&mut self, topic: &str, payload: &[u8], qos: QoS);

    /// Tear the session down immediately. Safe to call when not connected.
    fn stop(&mut self);

    /// Drain any buffered inbound messages into `sink` without blocking.
    fn poll<S: MessageSink>(&mut self, sink: &mut S, now: Millis);
}

/// Visual feedback hooks the state machine drives while (re)connecting.
///
/// Pure presentation: implementations own their frame and matrix handle and
/// return nothing. Injecting this as a capability lets tests substitute a
/// recorder for the real panel.
pub trait StatusAnimator {
    /// One frame of the signal-bars wave shown while associating.
    fn draw_associating_frame(&mut self, step: u32);

    /// One frame of the packet animation shown while the session comes up.
    fn draw_session_frame(&mut self, phase: u32);

    /// The failure visual (pulsing X).
    fn draw_failure_frame(&mut self, now: Millis);
}
