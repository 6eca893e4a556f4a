use sha1::{Digest, Sha1};

/// Content address of a raw message
///
/// The key is the lowercase hex SHA-1 digest of the message bytes, so two
/// byte-identical messages always map to the same key and share one blob.
/// It also serves as the blob's file name in disk-backed stores.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageKey(String);

impl MessageKey {
    /// Length of a hex-encoded SHA-1 digest
    pub const LEN: usize = 40;

    /// Compute the key for `data`
    #[must_use]
    pub fn digest(data: &[u8]) -> Self {
        Self(hex::encode(Sha1::digest(data)))
    }

    /// Parse a key received from elsewhere (a record row, a file name)
    ///
    /// # Security
    /// Only exact-length lowercase hex is accepted, which rules out path
    /// separators and traversal sequences.
    pub fn parse(s: &str) -> Option<Self> {
        (s.len() == Self::LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')))
            .then(|| Self(s.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl serde::Serialize for MessageKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for MessageKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid message key: {s}")))
    }
}
