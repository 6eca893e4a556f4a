use chrono::{DateTime, Utc};
use mailqueue_common::{Address, Domain};
use mailqueue_store::MessageKey;
use serde::{Deserialize, Serialize};

/// One (message, recipient) delivery obligation
///
/// Entries created from the same message share its [`MessageKey`]. After
/// creation the queue only ever deletes entries; the delivery worker owns
/// `delivery_in_progress`, `delivery_failed_count` and `next_delivery_at`.
///
/// # Wire format
/// This struct, serialized as JSON, is the payload published to delivery
/// workers. Field names and order are part of that contract:
///
/// ```text
/// id, key, mailFrom, returnPath, rcptTo, host, addedAt,
/// deliveryStartedAt, nextDeliveryAt, deliveryInProgress, deliveryFailedCount
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    /// Assigned by the record store on create; 0 until then
    pub id: i64,
    pub key: MessageKey,
    pub mail_from: String,
    pub return_path: String,
    pub rcpt_to: String,
    /// Domain of `rcpt_to`, used for routing
    pub host: Domain,
    pub added_at: DateTime<Utc>,
    pub delivery_started_at: DateTime<Utc>,
    pub next_delivery_at: DateTime<Utc>,
    pub delivery_in_progress: bool,
    pub delivery_failed_count: u32,
}

impl QueueEntry {
    /// A fresh, not yet stored entry for `rcpt_to`.
    ///
    /// All three timestamps are `now` and `delivery_in_progress` starts out
    /// `true`, which is what existing delivery workers expect to find.
    #[must_use]
    pub fn new(
        key: MessageKey,
        mail_from: String,
        return_path: String,
        rcpt_to: &Address,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            key,
            mail_from,
            return_path,
            rcpt_to: rcpt_to.to_string(),
            host: rcpt_to.host(),
            added_at: now,
            delivery_started_at: now,
            next_delivery_at: now,
            delivery_in_progress: true,
            delivery_failed_count: 0,
        }
    }

    /// Encode as a bus payload
    ///
    /// # Errors
    /// Returns an error if JSON encoding fails
    pub fn to_payload(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Decode a bus payload
    ///
    /// # Errors
    /// Returns an error if the payload is not a valid entry
    pub fn from_payload(payload: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entry_initial_state() {
        let now = Utc::now();
        let rcpt: Address = "rcpt@dest.example".parse().unwrap();
        let entry = QueueEntry::new(
            MessageKey::digest(b"body"),
            "from@src.example".to_string(),
            "bounce@src.example".to_string(),
            &rcpt,
            now,
        );

        assert_eq!(entry.id, 0);
        assert_eq!(entry.rcpt_to, "rcpt@dest.example");
        assert_eq!(entry.host.as_str(), "dest.example");
        assert_eq!(entry.added_at, now);
        assert_eq!(entry.delivery_started_at, now);
        assert_eq!(entry.next_delivery_at, now);
        assert!(entry.delivery_in_progress);
        assert_eq!(entry.delivery_failed_count, 0);
    }
}
