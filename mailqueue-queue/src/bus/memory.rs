use std::{collections::VecDeque, sync::Arc};

use async_trait::async_trait;
use dashmap::DashMap;
use mailqueue_common::internal;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use crate::{PublishError, bus::NotificationBus};

/// Payloads held per topic while it has no subscriber
pub const DEFAULT_BACKLOG: usize = 1024;

#[derive(Debug, Default)]
struct Topic {
    /// Payloads published while nobody was listening, oldest first
    backlog: VecDeque<Arc<[u8]>>,
    subscribers: Vec<UnboundedSender<Arc<[u8]>>>,
}

/// In-process notification bus
///
/// Every live subscriber of a topic receives its own copy of each payload.
/// Payloads published to a topic without subscribers are held back and
/// handed to the first one that subscribes. The backlog of each topic is
/// bounded; once full, the oldest payload is dropped to make room.
#[derive(Debug, Clone)]
pub struct MemoryBus {
    topics: Arc<DashMap<String, Topic>>,
    backlog: usize,
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::with_backlog(DEFAULT_BACKLOG)
    }
}

impl MemoryBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold at most `backlog` payloads per topic without a subscriber
    #[must_use]
    pub fn with_backlog(backlog: usize) -> Self {
        Self {
            topics: Arc::default(),
            backlog,
        }
    }

    /// Start receiving payloads published to `topic`
    #[must_use]
    pub fn subscribe(&self, topic: &str) -> UnboundedReceiver<Arc<[u8]>> {
        let (tx, rx) = unbounded_channel();
        let mut topic = self.topics.entry(topic.to_string()).or_default();

        for payload in topic.backlog.drain(..) {
            // The receiver is still in hand, so this cannot fail
            let _ = tx.send(payload);
        }
        topic.subscribers.push(tx);

        rx
    }

    /// Payloads waiting for a first subscriber on `topic`
    #[must_use]
    pub fn backlog_len(&self, topic: &str) -> usize {
        self.topics
            .get(topic)
            .map_or(0, |topic| topic.backlog.len())
    }
}

#[async_trait]
impl NotificationBus for MemoryBus {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), PublishError> {
        let payload: Arc<[u8]> = Arc::from(payload);
        let mut entry = self.topics.entry(topic.to_string()).or_default();

        entry
            .subscribers
            .retain(|tx| tx.send(Arc::clone(&payload)).is_ok());

        if entry.subscribers.is_empty() {
            if self.backlog == 0 {
                internal!(level = WARN, "No subscriber on {topic}, dropping notification");
                return Ok(());
            }

            if entry.backlog.len() >= self.backlog {
                entry.backlog.pop_front();
                internal!(
                    level = WARN,
                    "Backlog for {topic} is full ({} entries), dropped the oldest notification",
                    self.backlog
                );
            }
            entry.backlog.push_back(payload);
        }

        Ok(())
    }
}
