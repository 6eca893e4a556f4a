//! NSQ producer
//!
//! Speaks just enough of the nsqd TCP protocol (`V2`) to publish:
//!
//! ```text
//! client: "  V2"
//! client: "IDENTIFY\n" <u32 size> <json>
//! client: "PUB <topic>\n" <u32 size> <body>
//! server: <u32 size> <u32 frame type> <data>
//! ```
//!
//! Frame type 0 is a response (`OK` or `_heartbeat_`), 1 an error.
//! All integers are big-endian.

use std::time::Duration;

use async_trait::async_trait;
use mailqueue_common::internal;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt, BufStream},
    net::TcpStream,
    sync::Mutex,
};

use crate::{PublishError, bus::NotificationBus};

pub const DEFAULT_USER_AGENT: &str = "mailqueue";

const MAGIC_V2: &[u8] = b"  V2";
const FRAME_TYPE_RESPONSE: u32 = 0;
const FRAME_TYPE_ERROR: u32 = 1;
const HEARTBEAT: &[u8] = b"_heartbeat_";
const MAX_FRAME_SIZE: u32 = 1024 * 1024;
const MAX_TOPIC_LEN: usize = 64;

/// Publishes to a single nsqd over TCP
///
/// The connection is opened on first publish and reused. Any failure drops
/// it, so the following publish starts from a fresh connection; the failed
/// publish itself is not retried.
#[derive(Debug)]
pub struct NsqBus {
    address: String,
    user_agent: String,
    timeout: Duration,
    conn: Mutex<Option<BufStream<TcpStream>>>,
}

impl NsqBus {
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(10),
            conn: Mutex::new(None),
        }
    }

    /// Identify to nsqd with this user agent
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Bound on connecting and on each publish round-trip
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn connect(&self) -> Result<BufStream<TcpStream>, PublishError> {
        internal!(level = DEBUG, "Connecting to nsqd at {}", self.address);

        let mut stream = BufStream::new(TcpStream::connect(&self.address).await?);
        stream.write_all(MAGIC_V2).await?;

        let identify = serde_json::to_vec(&serde_json::json!({
            "user_agent": self.user_agent,
            "feature_negotiation": false,
        }))?;
        write_command(&mut stream, b"IDENTIFY\n", &identify).await?;
        read_ok(&mut stream).await?;

        Ok(stream)
    }

    async fn publish_on(
        &self,
        conn: &mut Option<BufStream<TcpStream>>,
        topic: &str,
        payload: &[u8],
    ) -> Result<(), PublishError> {
        // nsqd may have closed an idle connection since the last publish.
        // Nothing was acknowledged on it, so one resend on a fresh
        // connection keeps delivery at-least-once.
        if let Some(mut stream) = conn.take() {
            match send_pub(&mut stream, topic, payload).await {
                Err(PublishError::Io(err)) => {
                    internal!(
                        level = DEBUG,
                        "Reused connection to {} failed ({err}), reconnecting",
                        self.address
                    );
                }
                result => {
                    *conn = Some(stream);
                    return result;
                }
            }
        }

        let stream = conn.insert(self.connect().await?);
        send_pub(stream, topic, payload).await
    }
}

async fn send_pub(
    stream: &mut BufStream<TcpStream>,
    topic: &str,
    payload: &[u8],
) -> Result<(), PublishError> {
    write_command(stream, format!("PUB {topic}\n").as_bytes(), payload).await?;
    read_ok(stream).await
}

/// nsqd topic names: 1 to 64 characters of `[.a-zA-Z0-9_-]`
fn validate_topic(topic: &str) -> Result<(), PublishError> {
    let valid = (1..=MAX_TOPIC_LEN).contains(&topic.len())
        && topic
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'));

    if valid {
        Ok(())
    } else {
        Err(PublishError::InvalidTopic(topic.to_string()))
    }
}

async fn write_command(
    stream: &mut BufStream<TcpStream>,
    command: &[u8],
    body: &[u8],
) -> Result<(), PublishError> {
    let size = u32::try_from(body.len())
        .map_err(|_| PublishError::Protocol(format!("body of {} bytes is too large", body.len())))?;

    stream.write_all(command).await?;
    stream.write_u32(size).await?;
    stream.write_all(body).await?;
    stream.flush().await?;

    Ok(())
}

/// Read frames until a response arrives, answering heartbeats on the way
async fn read_ok(stream: &mut BufStream<TcpStream>) -> Result<(), PublishError> {
    loop {
        let size = stream.read_u32().await?;
        if !(4..=MAX_FRAME_SIZE).contains(&size) {
            return Err(PublishError::Protocol(format!("invalid frame size {size}")));
        }

        let frame_type = stream.read_u32().await?;
        let mut data = vec![0; (size - 4) as usize];
        stream.read_exact(&mut data).await?;

        match frame_type {
            FRAME_TYPE_RESPONSE if data == HEARTBEAT => {
                stream.write_all(b"NOP\n").await?;
                stream.flush().await?;
            }
            FRAME_TYPE_RESPONSE if data == b"OK" => return Ok(()),
            FRAME_TYPE_RESPONSE => {
                return Err(PublishError::Protocol(format!(
                    "unexpected response {:?}",
                    String::from_utf8_lossy(&data)
                )));
            }
            FRAME_TYPE_ERROR => {
                return Err(PublishError::Rejected(
                    String::from_utf8_lossy(&data).into_owned(),
                ));
            }
            other => {
                return Err(PublishError::Protocol(format!(
                    "unexpected frame type {other}"
                )));
            }
        }
    }
}

#[async_trait]
impl NotificationBus for NsqBus {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), PublishError> {
        validate_topic(topic)?;

        let mut conn = self.conn.lock().await;
        let result = tokio::time::timeout(self.timeout, self.publish_on(&mut conn, topic, payload))
            .await
            .unwrap_or_else(|_| {
                Err(PublishError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("publish to {} timed out", self.address),
                )))
            });

        if let Err(e) = &result {
            internal!(
                level = WARN,
                "Publish to nsqd topic {topic} failed, dropping connection: {e}"
            );
            *conn = None;
        }

        result
    }
}
