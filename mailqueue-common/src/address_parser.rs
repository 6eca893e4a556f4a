//! RFC 5321 mailbox parsing
//!
//! Envelope addresses arrive as SMTP paths (`<local@domain>`), while the
//! `Return-Path` header may additionally carry a display name or omit the
//! angle brackets entirely. Both forms are reduced to a [`Mailbox`].
//!
//! ```text
//! Path           = "<" [ A-d-l ":" ] Mailbox ">"
//! Mailbox        = Local-part "@" ( Domain / address-literal )
//! Local-part     = Dot-string / Quoted-string
//! Domain         = sub-domain *("." sub-domain)
//! sub-domain     = Let-dig [Ldh-str]
//! ```
//!
//! Size limits: 256 octets per path, 64 per local-part, 255 per domain.

use std::net::{Ipv4Addr, Ipv6Addr};

pub type Result<T> = std::result::Result<T, AddressError>;

const MAX_PATH: usize = 256;
const MAX_LOCAL_PART: usize = 64;
const MAX_DOMAIN: usize = 255;

/// Errors that can occur during address parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// Empty input, or the null path `<>`
    Empty,
    PathTooLong,
    LocalPartTooLong,
    DomainTooLong,
    MissingOpenBracket,
    MissingCloseBracket,
    MissingAtSign,
    InvalidLocalPart(String),
    InvalidDomain(String),
    InvalidAddressLiteral(String),
    UnclosedQuotedString,
    /// Text follows the closing angle bracket
    TrailingCharacters(String),
}

impl std::fmt::Display for AddressError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "Empty address"),
            Self::PathTooLong => write!(f, "Path exceeds {MAX_PATH} octets"),
            Self::LocalPartTooLong => write!(f, "Local-part exceeds {MAX_LOCAL_PART} octets"),
            Self::DomainTooLong => write!(f, "Domain exceeds {MAX_DOMAIN} octets"),
            Self::MissingOpenBracket => write!(f, "Missing opening angle bracket '<'"),
            Self::MissingCloseBracket => write!(f, "Missing closing angle bracket '>'"),
            Self::MissingAtSign => write!(f, "Missing '@' separator in mailbox"),
            Self::InvalidLocalPart(s) => write!(f, "Invalid local-part: {s}"),
            Self::InvalidDomain(s) => write!(f, "Invalid domain: {s}"),
            Self::InvalidAddressLiteral(s) => write!(f, "Invalid address literal: {s}"),
            Self::UnclosedQuotedString => write!(f, "Unclosed quoted string in local-part"),
            Self::TrailingCharacters(s) => write!(f, "Unexpected characters after address: {s}"),
        }
    }
}

impl std::error::Error for AddressError {}

/// A parsed SMTP mailbox (local-part@domain)
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Mailbox {
    pub local_part: String,
    pub domain: String,
}

impl std::fmt::Display for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.local_part, self.domain)
    }
}

/// Parse a forward-path such as the argument of `RCPT TO`.
///
/// # Errors
///
/// Returns `AddressError` if the input is not a bracketed mailbox.
pub fn parse_forward_path(input: &str) -> Result<Mailbox> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(AddressError::Empty);
    }
    if trimmed.len() > MAX_PATH {
        return Err(AddressError::PathTooLong);
    }
    if !trimmed.starts_with('<') {
        return Err(AddressError::MissingOpenBracket);
    }
    if !trimmed.ends_with('>') {
        return Err(AddressError::MissingCloseBracket);
    }

    let content = &trimmed[1..trimmed.len() - 1];
    if content.is_empty() {
        return Err(AddressError::Empty);
    }

    // Source routes (`@a,@b:user@c`) are obsolete but still seen in the wild
    let mailbox = source_route_end(content).map_or(content, |colon| &content[colon + 1..]);

    parse_mailbox(mailbox)
}

/// Parse the value of an address-bearing header such as `Return-Path`.
///
/// Accepts `user@domain`, `<user@domain>` and `Display Name <user@domain>`.
/// The null path `<>` carries no address and is rejected.
///
/// # Errors
///
/// Returns `AddressError` if no valid mailbox can be extracted.
pub fn parse_header_address(input: &str) -> Result<Mailbox> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(AddressError::Empty);
    }

    let Some(open) = trimmed.rfind('<') else {
        if trimmed.contains('>') {
            return Err(AddressError::MissingOpenBracket);
        }
        if trimmed.len() > MAX_PATH {
            return Err(AddressError::PathTooLong);
        }
        return parse_mailbox(trimmed);
    };

    let rest = &trimmed[open..];
    let close = rest.find('>').ok_or(AddressError::MissingCloseBracket)?;

    let trailing = rest[close + 1..].trim();
    if !trailing.is_empty() {
        return Err(AddressError::TrailingCharacters(trailing.to_string()));
    }

    parse_forward_path(&rest[..=close])
}

/// Parse a bare mailbox: `local-part@domain` or `local-part@[address-literal]`.
///
/// # Errors
///
/// Returns `AddressError` if either half is malformed or too long.
pub fn parse_mailbox(input: &str) -> Result<Mailbox> {
    let at = unquoted_at(input)?;

    let local_part = &input[..at];
    let domain = &input[at + 1..];

    if local_part.len() > MAX_LOCAL_PART {
        return Err(AddressError::LocalPartTooLong);
    }
    if domain.len() > MAX_DOMAIN {
        return Err(AddressError::DomainTooLong);
    }

    validate_local_part(local_part)?;
    validate_domain(domain)?;

    Ok(Mailbox {
        local_part: local_part.to_string(),
        domain: domain.to_string(),
    })
}

fn source_route_end(input: &str) -> Option<usize> {
    if !input.starts_with('@') {
        return None;
    }

    let mut in_brackets = false;
    input.char_indices().find_map(|(i, ch)| match ch {
        '[' => {
            in_brackets = true;
            None
        }
        ']' => {
            in_brackets = false;
            None
        }
        ':' if !in_brackets => Some(i),
        _ => None,
    })
}

/// Position of the last `@` outside a quoted local-part
fn unquoted_at(input: &str) -> Result<usize> {
    let mut in_quotes = false;
    let mut escaped = false;
    let mut found = None;

    for (i, ch) in input.char_indices() {
        match ch {
            '\\' if in_quotes && !escaped => {
                escaped = true;
                continue;
            }
            '"' if !escaped => in_quotes = !in_quotes,
            '@' if !in_quotes => found = Some(i),
            _ => {}
        }
        escaped = false;
    }

    if in_quotes {
        return Err(AddressError::UnclosedQuotedString);
    }

    found.ok_or(AddressError::MissingAtSign)
}

const fn is_atext(ch: char) -> bool {
    ch.is_ascii_alphanumeric()
        || matches!(
            ch,
            '!' | '#'
                | '$'
                | '%'
                | '&'
                | '\''
                | '*'
                | '+'
                | '-'
                | '/'
                | '='
                | '?'
                | '^'
                | '_'
                | '`'
                | '{'
                | '|'
                | '}'
                | '~'
        )
}

fn validate_local_part(input: &str) -> Result<()> {
    if input.is_empty() {
        return Err(AddressError::InvalidLocalPart("Empty local-part".to_string()));
    }

    if let Some(quoted) = input.strip_prefix('"') {
        let content = quoted
            .strip_suffix('"')
            .ok_or(AddressError::UnclosedQuotedString)?;

        let mut chars = content.chars();
        while let Some(ch) = chars.next() {
            let ok = match ch {
                '\\' => chars.next().is_some_and(|next| (' '..='~').contains(&next)),
                '"' => false,
                _ => (' '..='~').contains(&ch),
            };
            if !ok {
                return Err(AddressError::InvalidLocalPart(format!(
                    "Invalid character in quoted string: {input}"
                )));
            }
        }

        return Ok(());
    }

    for atom in input.split('.') {
        if atom.is_empty() {
            return Err(AddressError::InvalidLocalPart(format!(
                "Empty atom in dot-string: {input}"
            )));
        }
        if let Some(ch) = atom.chars().find(|&ch| !is_atext(ch)) {
            return Err(AddressError::InvalidLocalPart(format!(
                "Invalid character '{ch}' in atom"
            )));
        }
    }

    Ok(())
}

fn validate_domain(input: &str) -> Result<()> {
    if input.is_empty() {
        return Err(AddressError::InvalidDomain("Empty domain".to_string()));
    }

    if let Some(literal) = input.strip_prefix('[') {
        let literal = literal
            .strip_suffix(']')
            .ok_or_else(|| AddressError::InvalidAddressLiteral(input.to_string()))?;

        let valid = match literal.strip_prefix("IPv6:") {
            Some(v6) => v6.parse::<Ipv6Addr>().is_ok(),
            None => literal.parse::<Ipv4Addr>().is_ok(),
        };

        return if valid {
            Ok(())
        } else {
            Err(AddressError::InvalidAddressLiteral(input.to_string()))
        };
    }

    for label in input.split('.') {
        let bytes = label.as_bytes();
        let valid = match (bytes.first(), bytes.last()) {
            (Some(first), Some(last)) => {
                first.is_ascii_alphanumeric()
                    && last.is_ascii_alphanumeric()
                    && bytes.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'-')
            }
            _ => false,
        };

        if !valid {
            return Err(AddressError::InvalidDomain(format!(
                "Invalid sub-domain '{label}' in {input}"
            )));
        }
    }

    Ok(())
}
