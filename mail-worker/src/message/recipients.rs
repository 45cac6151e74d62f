//! Recipient resolution and display-name encoding.
//!
//! Callers hand [`crate::Message::send`] a single address, a list of
//! addresses, or address/name pairs. Everything is normalized into an
//! ordered list of header-ready strings.

use std::sync::OnceLock;

use base64::Engine;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Longest UTF-8 run placed in one encoded word. 45 bytes become 60 base64
/// characters, keeping each `=?UTF-8?B?...?=` word under 75 characters.
const ENCODED_WORD_CHUNK: usize = 45;

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^[-_a-z0-9'+*$^&%=~!?{}]+(?:\.[-_a-z0-9'+*$^&%=~!?{}]+)*@(?:[a-z0-9](?:[-a-z0-9.]*[a-z0-9])?\.[a-z]{2,}|\d{1,3}(?:\.\d{1,3}){3})$",
        )
        .expect("valid regex")
    })
}

/// Check whether `candidate` is a syntactically valid bare email address.
pub fn is_valid_email(candidate: &str) -> bool {
    !candidate.contains("..") && email_re().is_match(candidate)
}

/// MIME-encode a header value (RFC 2047, UTF-8, base64).
///
/// Pure ASCII text is returned unchanged.
pub fn encode_mime_header(text: &str) -> String {
    if text.is_ascii() {
        return text.to_string();
    }

    let engine = base64::engine::general_purpose::STANDARD;
    let mut words = Vec::new();
    let mut chunk = String::new();

    for c in text.chars() {
        if chunk.len() + c.len_utf8() > ENCODED_WORD_CHUNK {
            words.push(format!("=?UTF-8?B?{}?=", engine.encode(chunk.as_bytes())));
            chunk.clear();
        }
        chunk.push(c);
    }
    if !chunk.is_empty() {
        words.push(format!("=?UTF-8?B?{}?=", engine.encode(chunk.as_bytes())));
    }

    words.join(" ")
}

/// Build `"<encoded-name> <email>"`.
pub fn format_named(name: &str, email: &str) -> String {
    format!("{} <{}>", encode_mime_header(name), email)
}

/// One recipient of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Receiver {
    /// Used verbatim as an address.
    Address { address: String },
    /// An email with a display name to be encoded.
    Named { email: String, name: String },
}

impl Receiver {
    /// The header-ready form of this recipient.
    pub fn encode(&self) -> String {
        match self {
            Receiver::Address { address } => address.clone(),
            Receiver::Named { email, name } => format_named(name, email),
        }
    }

    /// The bare address, without any display name.
    pub fn email(&self) -> &str {
        match self {
            Receiver::Address { address } => address,
            Receiver::Named { email, .. } => email,
        }
    }
}

/// An ordered recipient list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Receivers(Vec<Receiver>);

impl Receivers {
    /// Resolve key/value pairs.
    ///
    /// A key that is a valid email makes the value its display name.
    /// Any other key (for instance a positional index) is dropped and the
    /// value is used verbatim as the address.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let receivers = pairs
            .into_iter()
            .map(|(key, value)| {
                let key = key.as_ref();
                if is_valid_email(key) {
                    Receiver::Named {
                        email: key.to_string(),
                        name: value.into(),
                    }
                } else {
                    Receiver::Address {
                        address: value.into(),
                    }
                }
            })
            .collect();
        Receivers(receivers)
    }

    /// Header-ready strings, in order.
    pub fn encode(&self) -> Vec<String> {
        self.0.iter().map(Receiver::encode).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Receiver> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Receivers {
    fn from(address: &str) -> Self {
        Receivers(vec![Receiver::Address {
            address: address.to_string(),
        }])
    }
}

impl From<String> for Receivers {
    fn from(address: String) -> Self {
        Receivers(vec![Receiver::Address { address }])
    }
}

impl From<Vec<String>> for Receivers {
    fn from(addresses: Vec<String>) -> Self {
        addresses
            .into_iter()
            .map(|address| Receiver::Address { address })
            .collect()
    }
}

impl From<Vec<&str>> for Receivers {
    fn from(addresses: Vec<&str>) -> Self {
        addresses
            .into_iter()
            .map(|address| Receiver::Address {
                address: address.to_string(),
            })
            .collect()
    }
}

impl From<Vec<Receiver>> for Receivers {
    fn from(receivers: Vec<Receiver>) -> Self {
        Receivers(receivers)
    }
}

impl From<Receiver> for Receivers {
    fn from(receiver: Receiver) -> Self {
        Receivers(vec![receiver])
    }
}

impl FromIterator<Receiver> for Receivers {
    fn from_iter<T: IntoIterator<Item = Receiver>>(iter: T) -> Self {
        Receivers(iter.into_iter().collect())
    }
}

impl IntoIterator for Receivers {
    type Item = Receiver;
    type IntoIter = std::vec::IntoIter<Receiver>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
