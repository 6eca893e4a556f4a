//! Delivery notifications
//!
//! - `memory`: in-process topics with subscriber channels
//! - `nsq`: TCP producer for an nsqd broker
//! - `test`: records publishes, with failure injection

pub mod memory;
pub mod nsq;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::Deserialize;

pub use memory::MemoryBus;
pub use nsq::NsqBus;
pub use test::TestBus;

use crate::PublishError;

/// Topic read by the remote delivery workers
pub const REMOTE_DELIVERY_TOPIC: &str = "queueRemote";

/// At-least-once publish channel to the delivery workers
///
/// No ordering is promised between payloads, whether they belong to the
/// same message or not.
#[async_trait]
pub trait NotificationBus: Send + Sync + std::fmt::Debug {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), PublishError>;
}

/// Selects the notification bus driver
///
/// ```ron
/// bus: Nsq(
///     address: "127.0.0.1:4150",
///     user_agent: "mailqueue.smtpd",
/// ),
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub enum BusConfig {
    #[default]
    Memory,
    Nsq {
        address: String,
        #[serde(default = "default_user_agent")]
        user_agent: String,
        /// Applies to connecting and to each publish round-trip
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
}

fn default_user_agent() -> String {
    nsq::DEFAULT_USER_AGENT.to_string()
}

const fn default_timeout_secs() -> u64 {
    10
}

impl BusConfig {
    #[must_use]
    pub fn into_bus(self) -> Arc<dyn NotificationBus> {
        match self {
            Self::Memory => Arc::new(MemoryBus::new()),
            Self::Nsq {
                address,
                user_agent,
                timeout_secs,
            } => Arc::new(
                NsqBus::new(address)
                    .with_user_agent(user_agent)
                    .with_timeout(Duration::from_secs(timeout_secs)),
            ),
        }
    }
}
