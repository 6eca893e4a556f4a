//! Error types for the mailqueue-common crate.

use thiserror::Error;

/// Errors that can occur while reading a raw message.
#[derive(Debug, Error)]
pub enum MessageError {
    /// The header block could not be parsed.
    #[error("Invalid message headers: {0}")]
    Headers(#[from] mailparse::MailParseError),

    /// The message has no content at all.
    #[error("Message is empty")]
    Empty,
}
