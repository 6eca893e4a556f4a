use std::sync::Arc;

use crate::error::MessageError;

/// A raw RFC 5322 message together with its parsed header block.
///
/// The raw bytes are kept exactly as received; they are what gets hashed and
/// stored. Headers are only decoded so that individual values can be looked
/// up by name.
#[derive(Debug, Clone)]
pub struct Message {
    raw: Arc<[u8]>,
    headers: Vec<(String, String)>,
}

impl Message {
    /// Parse the header block of `raw`.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError`] if the message is empty or its headers are
    /// malformed.
    pub fn parse(raw: impl Into<Arc<[u8]>>) -> Result<Self, MessageError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(MessageError::Empty);
        }

        let (parsed, _) = mailparse::parse_headers(&raw)?;
        let headers = parsed
            .iter()
            .map(|header| (header.get_key(), header.get_value()))
            .collect();

        Ok(Self { raw, headers })
    }

    /// The message exactly as received
    #[must_use]
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Case-insensitive header presence check
    #[must_use]
    pub fn has_header(&self, name: &str) -> bool {
        self.headers
            .iter()
            .any(|(key, _)| key.eq_ignore_ascii_case(name))
    }

    /// Value of the first header called `name`, compared case-insensitively
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}
