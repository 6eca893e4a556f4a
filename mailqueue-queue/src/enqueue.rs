use chrono::Utc;
use mailqueue_common::{
    Envelope, Message, address_parser::parse_header_address, internal,
};
use mailqueue_store::MessageKey;

use crate::{PublishError, QueueContext, QueueEntry, QueueError, REMOTE_DELIVERY_TOPIC};

const RETURN_PATH: &str = "Return-Path";

/// Accepts messages into the queue
///
/// The raw message is written once to the content store under its SHA-1
/// key, then one [`QueueEntry`] per envelope recipient is created and
/// announced on the bus, in envelope order.
#[derive(Debug, Clone)]
pub struct Enqueuer {
    ctx: QueueContext,
    topic: String,
}

impl Enqueuer {
    #[must_use]
    pub fn new(ctx: QueueContext) -> Self {
        Self {
            ctx,
            topic: REMOTE_DELIVERY_TOPIC.to_string(),
        }
    }

    /// Publish to `topic` instead of [`REMOTE_DELIVERY_TOPIC`]
    #[must_use]
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    /// Queue `message` for every recipient of `envelope`
    ///
    /// On success every recipient has a stored entry and a published
    /// notification, and the key of the stored blob is returned.
    ///
    /// Processing stops at the first recipient that fails. Entries created
    /// for earlier recipients are kept and their notifications stand; only
    /// the failing recipient's own entry is undone, and the blob is dropped
    /// only if that recipient was the first one.
    ///
    /// # Errors
    /// - [`QueueError::AddressParse`] if the `Return-Path` header is present
    ///   but malformed
    /// - [`QueueError::NoRecipients`] if the envelope is empty
    /// - [`QueueError::Record`] if the message cannot be pinned against
    ///   concurrent removal
    /// - [`QueueError::Store`] if the blob cannot be written
    /// - [`QueueError::Record`] or [`QueueError::Publish`] for the first
    ///   recipient that could not be queued
    pub async fn add_message(
        &self,
        message: &Message,
        envelope: &Envelope,
    ) -> Result<MessageKey, QueueError> {
        let return_path = resolve_return_path(message, envelope)?;

        if envelope.recipients().is_empty() {
            return Err(QueueError::NoRecipients);
        }

        let key = MessageKey::digest(message.raw());

        // Keeps a concurrent removal from collecting the blob until this
        // call's entries exist
        if let Err(err) = self.ctx.records.pin(&key).await {
            internal!(level = ERROR, "Unable to pin message {key}: {err}");
            return Err(err.into());
        }

        let queued = self.store_and_fan_out(&key, message, envelope, &return_path).await;

        if let Err(err) = self.ctx.records.unpin(&key).await {
            internal!(level = WARN, "Unable to unpin message {key}: {err}");
        }

        queued.map(|()| key)
    }

    async fn store_and_fan_out(
        &self,
        key: &MessageKey,
        message: &Message,
        envelope: &Envelope,
        return_path: &str,
    ) -> Result<(), QueueError> {
        if let Err(err) = self.ctx.store.put(key, message.raw()).await {
            internal!(level = ERROR, "Unable to store message {key}: {err}");
            return Err(err.into());
        }

        let mail_from = envelope.mail_from();
        let now = Utc::now();

        for (index, rcpt_to) in envelope.recipients().iter().enumerate() {
            let mut entry = QueueEntry::new(
                key.clone(),
                mail_from.clone(),
                return_path.to_string(),
                rcpt_to,
                now,
            );
            let rollback = Rollback {
                ctx: &self.ctx,
                key,
                index,
            };

            if let Err(err) = self.ctx.records.create(&mut entry).await {
                internal!(
                    level = ERROR,
                    "Unable to create queue entry for {rcpt_to} of {key}: {err}"
                );
                rollback.recipient_failed(None).await;
                return Err(err.into());
            }

            if let Err(err) = self.notify(&entry).await {
                internal!(
                    level = ERROR,
                    "Unable to announce queue entry {} for {rcpt_to}: {err}",
                    entry.id
                );
                rollback.recipient_failed(Some(&entry)).await;
                return Err(err.into());
            }

            internal!(
                level = DEBUG,
                "Queued entry {} for {rcpt_to} ({})",
                entry.id,
                entry.host
            );
        }

        internal!(
            level = INFO,
            "Queued message {key} for {} recipient(s)",
            envelope.recipients().len()
        );

        Ok(())
    }

    async fn notify(&self, entry: &QueueEntry) -> Result<(), PublishError> {
        let payload = entry.to_payload()?;
        self.ctx.bus.publish(&self.topic, &payload).await
    }
}

/// The `Return-Path` header if present, the envelope sender otherwise
fn resolve_return_path(message: &Message, envelope: &Envelope) -> Result<String, QueueError> {
    match message.header(RETURN_PATH) {
        Some(value) => {
            let mailbox = parse_header_address(value).inspect_err(|err| {
                internal!(level = WARN, "Rejecting Return-Path {value:?}: {err}");
            })?;
            Ok(mailbox.to_string())
        }
        None => Ok(envelope.mail_from()),
    }
}

/// Compensation for one recipient that could not be queued
///
/// Undoes the failing recipient's own entry, if it got as far as being
/// created. The blob goes only when `index` is 0, whether or not this call
/// was the one that first wrote it. Failures here are logged and swallowed
/// so the caller sees the error that triggered the rollback.
struct Rollback<'a> {
    ctx: &'a QueueContext,
    key: &'a MessageKey,
    index: usize,
}

impl Rollback<'_> {
    async fn recipient_failed(&self, created: Option<&QueueEntry>) {
        if let Some(entry) = created
            && let Err(err) = self.ctx.records.delete(entry).await
        {
            internal!(
                level = WARN,
                "Rollback could not delete queue entry {}: {err}",
                entry.id
            );
        }

        if self.index == 0
            && let Err(err) = self.ctx.store.del(self.key).await
        {
            internal!(
                level = WARN,
                "Rollback could not delete message {}: {err}",
                self.key
            );
        }
    }
}
