//! Connectivity lifecycle: wireless association and broker-session
//! establishment with independent exponential backoff per layer.

pub mod backoff;
pub mod manager;
pub mod traits;

pub use manager::{ConnState, ConnectionManager};
pub use traits::{
    BrokerSession, LinkStatus, MessageSink, QoS, RadioLink, SessionOptions, StatusAnimator,
};
