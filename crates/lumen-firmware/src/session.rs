//! rust-mqtt broker-session adapter.
//!
//! The connectivity manager's [`BrokerSession`] seam is synchronous and
//! non-blocking, while the MQTT client and the TCP stack underneath are
//! async. The split here mirrors that: a [`ChannelSession`] implements the
//! seam by exchanging commands and results with [`session_worker`], an
//! embassy task that owns the socket, the client, and their buffers for the
//! duration of each broker connection.
//!
//! Calls that must report an outcome (`connect`, `subscribe`) wait on their
//! result signal with a hard deadline, so the control loop never stalls past
//! the adapter's own timeout budget.

use core::sync::atomic::{AtomicBool, Ordering};

use embassy_futures::block_on;
use embassy_futures::select::{select, Either};
use embassy_net::tcp::TcpSocket;
use embassy_net::{IpEndpoint, Stack};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use embassy_time::{with_timeout, Duration};
use heapless::{String, Vec};
use log::{debug, info, warn};
use rust_mqtt::client::client::MqttClient;
use rust_mqtt::client::client_config::{ClientConfig, MqttVersion};
use rust_mqtt::packet::v5::publish_packet::QualityOfService;
use rust_mqtt::utils::rng_generator::CountingRng;

use lumen_core::clock::Millis;
use lumen_core::conn::{BrokerSession, MessageSink, QoS, SessionOptions};

/// Budget for one connect attempt (TCP + MQTT CONNECT).
const CONNECT_TIMEOUT: Duration = Duration::from_millis(4_000);
/// Budget for one subscribe acknowledgment.
const SUBSCRIBE_TIMEOUT: Duration = Duration::from_millis(2_000);

const TOPIC_CAP: usize = 64;
const PAYLOAD_CAP: usize = 64;

type Topic = String<TOPIC_CAP>;
type Payload = Vec<u8, PAYLOAD_CAP>;

/// One decoded inbound publish.
pub struct InboundMessage {
    pub topic: Topic,
    pub payload: Payload,
}

enum Command {
    SetOptions {
        client_id: Topic,
        keep_alive_secs: u16,
        username: Option<Topic>,
        password: Option<Topic>,
    },
    SetWill {
        topic: Topic,
        payload: Payload,
        retain: bool,
    },
    Connect {
        host: Topic,
        port: u16,
    },
    Subscribe {
        topic: Topic,
        qos: QoS,
    },
    PublishRetained {
        topic: Topic,
        payload: Payload,
        qos: QoS,
    },
    Stop,
}

static COMMANDS: Channel<CriticalSectionRawMutex, Command, 8> = Channel::new();
static INBOUND: Channel<CriticalSectionRawMutex, InboundMessage, 8> = Channel::new();
static CONNECT_RESULT: Signal<CriticalSectionRawMutex, bool> = Signal::new();
static SUBSCRIBE_RESULT: Signal<CriticalSectionRawMutex, bool> = Signal::new();
static ESTABLISHED: AtomicBool = AtomicBool::new(false);

fn owned_str(s: &str) -> Topic {
    let mut out = Topic::new();
    let _ = out.push_str(&s[..s.len().min(TOPIC_CAP)]);
    out
}

fn owned_bytes(b: &[u8]) -> Payload {
    let mut out = Payload::new();
    let _ = out.extend_from_slice(&b[..b.len().min(PAYLOAD_CAP)]);
    out
}

/// Synchronous face of the MQTT session, paired with [`session_worker`].
pub struct ChannelSession;

impl ChannelSession {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ChannelSession {
    fn default() -> Self {
        Self::new()
    }
}

impl BrokerSession for ChannelSession {
    fn configure(&mut self, options: &SessionOptions<'_>) {
        let _ = COMMANDS.try_send(Command::SetOptions {
            client_id: owned_str(options.client_id),
            keep_alive_secs: options.keep_alive_secs,
            username: options.credentials.map(|(u, _)| owned_str(u)),
            password: options.credentials.map(|(_, p)| owned_str(p)),
        });
    }

    fn configure_last_will(&mut self, topic: &str, payload: &[u8], retain: bool, _qos: QoS) {
        let _ = COMMANDS.try_send(Command::SetWill {
            topic: owned_str(topic),
            payload: owned_bytes(payload),
            retain,
        });
    }

    fn connect(&mut self, host: &str, port: u16) -> bool {
        if ESTABLISHED.load(Ordering::Acquire) {
            return true;
        }
        CONNECT_RESULT.reset();
        if COMMANDS
            .try_send(Command::Connect {
                host: owned_str(host),
                port,
            })
            .is_err()
        {
            return false;
        }
        block_on(with_timeout(CONNECT_TIMEOUT, CONNECT_RESULT.wait())).unwrap_or(false)
    }

    fn connected(&self) -> bool {
        ESTABLISHED.load(Ordering::Acquire)
    }

    fn subscribe(&mut self, topic: &str, qos: QoS) -> bool {
        SUBSCRIBE_RESULT.reset();
        if COMMANDS
            .try_send(Command::Subscribe {
                topic: owned_str(topic),
                qos,
            })
            .is_err()
        {
            return false;
        }
        block_on(with_timeout(SUBSCRIBE_TIMEOUT, SUBSCRIBE_RESULT.wait())).unwrap_or(false)
    }

    fn publish_retained(&mut self, topic: &str, payload: &[u8], qos: QoS) {
        let _ = COMMANDS.try_send(Command::PublishRetained {
            topic: owned_str(topic),
            payload: owned_bytes(payload),
            qos,
        });
    }

    fn stop(&mut self) {
        let _ = COMMANDS.try_send(Command::Stop);
    }

    fn poll<S: MessageSink>(&mut self, sink: &mut S, now: Millis) {
        while let Ok(message) = INBOUND.try_receive() {
            sink.on_message(&message.topic, &message.payload, now);
        }
    }
}

fn to_mqtt_qos(qos: QoS) -> QualityOfService {
    match qos {
        QoS::AtMostOnce => QualityOfService::QoS0,
        QoS::AtLeastOnce => QualityOfService::QoS1,
    }
}

struct StoredOptions {
    client_id: Topic,
    keep_alive_secs: u16,
    username: Option<Topic>,
    password: Option<Topic>,
}

struct StoredWill {
    topic: Topic,
    payload: Payload,
    retain: bool,
}

/// Owns the TCP socket and MQTT client for the lifetime of each broker
/// connection, executing commands from the [`ChannelSession`].
#[embassy_executor::task]
pub async fn session_worker(stack: Stack<'static>) {
    let mut sock_rx = [0u8; 2048];
    let mut sock_tx = [0u8; 2048];
    let mut mqtt_write = [0u8; 1024];
    let mut mqtt_recv = [0u8; 1024];

    let mut options: Option<StoredOptions> = None;
    let mut will: Option<StoredWill> = None;

    loop {
        // Idle: remember configuration, wait for a connect request.
        let (host, port) = loop {
            match COMMANDS.receive().await {
                Command::SetOptions {
                    client_id,
                    keep_alive_secs,
                    username,
                    password,
                } => {
                    options = Some(StoredOptions {
                        client_id,
                        keep_alive_secs,
                        username,
                        password,
                    });
                }
                Command::SetWill {
                    topic,
                    payload,
                    retain,
                } => {
                    will = Some(StoredWill {
                        topic,
                        payload,
                        retain,
                    });
                }
                Command::Connect { host, port } => break (host, port),
                Command::Subscribe { .. } => SUBSCRIBE_RESULT.signal(false),
                Command::PublishRetained { .. } | Command::Stop => {}
            }
        };

        // Resolve and dial the broker.
        let Some(endpoint) = resolve(stack, &host, port).await else {
            CONNECT_RESULT.signal(false);
            continue;
        };

        let mut socket = TcpSocket::new(stack, &mut sock_rx, &mut sock_tx);
        socket.set_timeout(Some(Duration::from_secs(10)));
        if let Err(e) = socket.connect(endpoint).await {
            warn!("mqtt: tcp connect failed: {e:?}");
            CONNECT_RESULT.signal(false);
            continue;
        }

        let mut config: ClientConfig<'_, 5, CountingRng> =
            ClientConfig::new(MqttVersion::MQTTv5, CountingRng(20_000));
        config.max_packet_size = 1024;
        if let Some(opts) = &options {
            config.add_client_id(&opts.client_id);
            config.keep_alive = opts.keep_alive_secs;
            if let (Some(user), Some(pass)) = (&opts.username, &opts.password) {
                config.add_username(user);
                config.add_password(pass);
            }
        }
        if let Some(will) = &will {
            config.add_will(&will.topic, &will.payload, will.retain);
        }

        let mut client = MqttClient::<_, 5, _>::new(
            socket,
            &mut mqtt_write,
            1024,
            &mut mqtt_recv,
            1024,
            config,
        );

        if let Err(e) = client.connect_to_broker().await {
            warn!("mqtt: broker refused connection: {e:?}");
            CONNECT_RESULT.signal(false);
            continue;
        }
        info!("mqtt: session established with {}:{}", &*host, port);
        ESTABLISHED.store(true, Ordering::Release);
        CONNECT_RESULT.signal(true);

        // Serve the session: commands and inbound publishes, interleaved.
        loop {
            match select(COMMANDS.receive(), client.receive_message()).await {
                Either::First(Command::Subscribe { topic, qos: _ }) => {
                    let ok = client.subscribe_to_topic(&topic).await.is_ok();
                    if !ok {
                        debug!("mqtt: subscribe to {} failed", &*topic);
                    }
                    SUBSCRIBE_RESULT.signal(ok);
                }
                Either::First(Command::PublishRetained {
                    topic,
                    payload,
                    qos,
                }) => {
                    if let Err(e) = client
                        .send_message(&topic, &payload, to_mqtt_qos(qos), true)
                        .await
                    {
                        warn!("mqtt: publish to {} failed: {e:?}", &*topic);
                    }
                }
                Either::First(Command::Stop) => {
                    let _ = client.disconnect().await;
                    break;
                }
                Either::First(Command::Connect { .. }) => {
                    // Already connected; acknowledge so the caller moves on.
                    CONNECT_RESULT.signal(true);
                }
                Either::First(Command::SetOptions { .. })
                | Either::First(Command::SetWill { .. }) => {
                    // Reconfiguration applies to the next connection.
                }
                Either::Second(Ok((topic, payload))) => {
                    let message = InboundMessage {
                        topic: owned_str(topic),
                        payload: owned_bytes(payload),
                    };
                    if INBOUND.try_send(message).is_err() {
                        debug!("mqtt: inbound queue full, dropping message");
                    }
                }
                Either::Second(Err(e)) => {
                    warn!("mqtt: session error: {e:?}");
                    break;
                }
            }
        }

        ESTABLISHED.store(false, Ordering::Release);
    }
}

/// DNS-resolve `host` (or parse it as a literal IPv4 address).
async fn resolve(stack: Stack<'static>, host: &str, port: u16) -> Option<IpEndpoint> {
    if let Ok(v4) = host.parse::<core::net::Ipv4Addr>() {
        return Some(IpEndpoint::new(embassy_net::IpAddress::Ipv4(v4), port));
    }
    let addrs = stack
        .dns_query(host, embassy_net::dns::DnsQueryType::A)
        .await
        .ok()?;
    addrs.first().map(|&addr| IpEndpoint::new(addr, port))
}
