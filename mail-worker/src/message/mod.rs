//! Message composition and sending.
//!
//! A [`Message`] collects headers, a body, attachments and substitution
//! params. Params are applied when [`Message::send`] runs, to a copy that
//! is handed to the transport, so the composed message can be sent again:
//!
//! ```text
//! bind_param() → send(receivers) → substitute headers → re-encode recipients
//!              → substitute body → Transport::deliver(copy) → bool
//! ```

pub mod recipients;
pub mod render;
pub mod substitution;

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::transport::Transport;

pub use recipients::{encode_mime_header, is_valid_email, Receiver, Receivers};
pub use render::render;
pub use substitution::{reencode_recipients, substitute};

/// A file attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Attachment {
    /// Raw attachment bytes
    #[serde(with = "base64_bytes")]
    pub content: Vec<u8>,
    /// Part headers, e.g. `Content-Type` and `Content-Disposition`
    #[serde(default)]
    pub headers: IndexMap<String, String>,
}

/// An outbound email under composition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Message {
    #[serde(default)]
    headers: IndexMap<String, String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    attachments: Vec<Attachment>,
    #[serde(default)]
    params: BTreeMap<String, String>,
    /// Where a queued message goes once a worker pulls it.
    #[serde(default, skip_serializing_if = "Receivers::is_empty")]
    recipients: Receivers,
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a header, replacing any previous value under the same name.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl ToString) -> &mut Self {
        self.headers.insert(name.into(), value.to_string());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// All headers, in insertion order.
    pub fn headers(&self) -> &IndexMap<String, String> {
        &self.headers
    }

    /// Replace every header with `headers`, in the given order.
    pub fn set_headers<I, K, V>(&mut self, headers: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        self.headers = headers
            .into_iter()
            .map(|(name, value)| (name.into(), value.to_string()))
            .collect();
        self
    }

    pub fn set_subject(&mut self, subject: impl ToString) -> &mut Self {
        self.set_header("Subject", subject)
    }

    pub fn subject(&self) -> Option<&str> {
        self.header("Subject")
    }

    pub fn set_from(&mut self, from: impl ToString) -> &mut Self {
        self.set_header("From", from)
    }

    pub fn from(&self) -> Option<&str> {
        self.header("From")
    }

    pub fn set_sender(&mut self, sender: impl ToString) -> &mut Self {
        self.set_header("Sender", sender)
    }

    pub fn sender(&self) -> Option<&str> {
        self.header("Sender")
    }

    pub fn set_reply_to(&mut self, reply_to: impl ToString) -> &mut Self {
        self.set_header("Reply-To", reply_to)
    }

    pub fn reply_to(&self) -> Option<&str> {
        self.header("Reply-To")
    }

    pub fn set_return_path(&mut self, return_path: impl ToString) -> &mut Self {
        self.set_header("Return-Path", return_path)
    }

    pub fn return_path(&self) -> Option<&str> {
        self.header("Return-Path")
    }

    /// Set `Cc`. A value may hold several comma-separated recipients.
    pub fn set_cc(&mut self, cc: impl ToString) -> &mut Self {
        self.set_header("Cc", cc)
    }

    pub fn cc(&self) -> Option<&str> {
        self.header("Cc")
    }

    pub fn set_bcc(&mut self, bcc: impl ToString) -> &mut Self {
        self.set_header("Bcc", bcc)
    }

    pub fn bcc(&self) -> Option<&str> {
        self.header("Bcc")
    }

    /// Set the body type, e.g. `text/html; charset=utf-8`.
    pub fn set_content_type(&mut self, content_type: impl ToString) -> &mut Self {
        self.set_header("Content-Type", content_type)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("Content-Type")
    }

    pub fn set_message_id(&mut self, message_id: impl ToString) -> &mut Self {
        self.set_header("Message-ID", message_id)
    }

    pub fn message_id(&self) -> Option<&str> {
        self.header("Message-ID")
    }

    pub fn set_in_reply_to(&mut self, in_reply_to: impl ToString) -> &mut Self {
        self.set_header("In-Reply-To", in_reply_to)
    }

    pub fn in_reply_to(&self) -> Option<&str> {
        self.header("In-Reply-To")
    }

    pub fn set_references(&mut self, references: impl ToString) -> &mut Self {
        self.set_header("References", references)
    }

    pub fn references(&self) -> Option<&str> {
        self.header("References")
    }

    pub fn set_body(&mut self, body: impl ToString) -> &mut Self {
        self.body = Some(body.to_string());
        self
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    /// Append an attachment. Headers are not validated; callers should set
    /// at least `Content-Type`.
    pub fn add_attachment<I, K, V>(&mut self, content: impl Into<Vec<u8>>, headers: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.attachments.push(Attachment {
            content: content.into(),
            headers: headers
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        });
        self
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    /// Bind a substitution param, overwriting any earlier value.
    pub fn bind_param(&mut self, name: impl Into<String>, value: impl ToString) -> &mut Self {
        self.params.insert(name.into(), value.to_string());
        self
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn set_recipients(&mut self, recipients: impl Into<Receivers>) -> &mut Self {
        self.recipients = recipients.into();
        self
    }

    pub fn recipients(&self) -> &Receivers {
        &self.recipients
    }

    /// Move the stored recipients out, leaving the list empty.
    pub fn take_recipients(&mut self) -> Receivers {
        std::mem::take(&mut self.recipients)
    }

    /// A copy with bound params applied to every header and the body, and
    /// any recipients found in the substituted header values re-encoded.
    fn substituted(&self) -> Message {
        let mut sent = self.clone();

        for value in sent.headers.values_mut() {
            let substituted = substitute(value, &self.params);
            *value = reencode_recipients(&substituted);
        }

        if let Some(body) = sent.body.as_mut() {
            *body = substitute(body, &self.params);
        }

        sent
    }

    /// Substitute params and hand the message to `transport`.
    ///
    /// `self` is left as composed; a failed send may simply be retried.
    /// Returns the transport's verdict unchanged; a failed delivery is
    /// never an error.
    pub fn send<T>(&self, receivers: impl Into<Receivers>, transport: &T) -> bool
    where
        T: Transport + ?Sized,
    {
        let to = receivers.into().encode();

        info!(
            recipients = to.len(),
            subject = ?self.subject(),
            params = self.params.len(),
            attachments = self.attachments.len(),
            "message_send_start"
        );

        let sent = transport.deliver(&to, &self.substituted());

        info!(recipients = to.len(), sent = sent, "message_send_complete");

        sent
    }
}

mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::InMemoryTransport;

    #[test]
    fn test_header_last_write_wins_and_keeps_position() {
        let mut message = Message::new();
        message
            .set_header("Subject", "first")
            .set_header("Cc", "a@x.com")
            .set_header("Subject", "second");

        assert_eq!(message.subject(), Some("second"));
        let names: Vec<&str> = message.headers().keys().map(String::as_str).collect();
        assert_eq!(names, vec!["Subject", "Cc"]);
    }

    #[test]
    fn test_values_are_coerced_to_strings() {
        let mut message = Message::new();
        message.set_header("X-Priority", 3).bind_param("{count}", 42).set_body(7.5);

        assert_eq!(message.header("X-Priority"), Some("3"));
        assert_eq!(message.param("{count}"), Some("42"));
        assert_eq!(message.body(), Some("7.5"));
    }

    #[test]
    fn test_send_with_mapping_encodes_names_in_order() {
        let transport = InMemoryTransport::new();
        let mut message = Message::new();
        message.set_subject("Hi").set_body("Body");

        let receivers = Receivers::from_pairs(vec![("a@x.com", "Alice"), ("b@x.com", "Bøb")]);
        assert!(message.send(receivers, &transport));

        let deliveries = transport.deliveries();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(
            deliveries[0].to,
            vec![
                "Alice <a@x.com>".to_string(),
                format!("{} <b@x.com>", encode_mime_header("Bøb")),
            ]
        );
    }

    #[test]
    fn test_send_substitutes_body() {
        let transport = InMemoryTransport::new();
        let mut message = Message::new();
        message.set_body("Hello {name}").bind_param("{name}", "World");

        assert!(message.send("a@x.com", &transport));

        assert_eq!(transport.deliveries()[0].message.body(), Some("Hello World"));
        assert_eq!(message.body(), Some("Hello {name}"));
    }

    #[test]
    fn test_send_reencodes_substituted_cc() {
        let transport = InMemoryTransport::new();
        let mut message = Message::new();
        message
            .set_header("Cc", "{cc}")
            .bind_param("{cc}", "Zoë Doe <zoe@x.com>")
            .set_body("");

        message.send("a@x.com", &transport);

        let delivered = &transport.deliveries()[0].message;
        assert_eq!(
            delivered.header("Cc"),
            Some(format!("{} <zoe@x.com>", encode_mime_header("Zoë Doe")).as_str())
        );
    }

    #[test]
    fn test_resend_after_failure_keeps_encoded_names() {
        let failing = InMemoryTransport::failing();
        let transport = InMemoryTransport::new();
        let mut message = Message::new();
        message
            .set_cc("{cc}")
            .bind_param("{cc}", "Zoë Doe <zoe@x.com>")
            .set_body("Hi {cc}");

        assert!(!message.send("a@x.com", &failing));
        assert!(message.send("a@x.com", &transport));

        let delivered = &transport.deliveries()[0].message;
        assert_eq!(
            delivered.cc(),
            Some(format!("{} <zoe@x.com>", encode_mime_header("Zoë Doe")).as_str())
        );
        assert_eq!(delivered.body(), Some("Hi Zoë Doe <zoe@x.com>"));
        assert_eq!(message.cc(), Some("{cc}"));
    }

    #[test]
    fn test_typed_header_accessors() {
        let mut message = Message::new();
        message
            .set_from("noreply@x.com")
            .set_sender("bounce@x.com")
            .set_reply_to("help@x.com")
            .set_return_path("bounce@x.com")
            .set_cc("c@x.com")
            .set_bcc("d@x.com")
            .set_content_type("text/html; charset=utf-8")
            .set_message_id("<1@x.com>")
            .set_in_reply_to("<0@x.com>")
            .set_references("<0@x.com>");

        assert_eq!(message.from(), Some("noreply@x.com"));
        assert_eq!(message.sender(), Some("bounce@x.com"));
        assert_eq!(message.reply_to(), Some("help@x.com"));
        assert_eq!(message.return_path(), Some("bounce@x.com"));
        assert_eq!(message.cc(), Some("c@x.com"));
        assert_eq!(message.bcc(), Some("d@x.com"));
        assert_eq!(message.content_type(), Some("text/html; charset=utf-8"));
        assert_eq!(message.message_id(), Some("<1@x.com>"));
        assert_eq!(message.in_reply_to(), Some("<0@x.com>"));
        assert_eq!(message.references(), Some("<0@x.com>"));
    }

    #[test]
    fn test_set_headers_replaces_all() {
        let mut message = Message::new();
        message.set_subject("old").set_cc("c@x.com");

        message.set_headers(vec![("From", "f@x.com"), ("Subject", "new")]);

        let names: Vec<&str> = message.headers().keys().map(String::as_str).collect();
        assert_eq!(names, vec!["From", "Subject"]);
        assert_eq!(message.subject(), Some("new"));
        assert_eq!(message.cc(), None);
    }

    #[test]
    fn test_send_reports_transport_failure_as_false() {
        let transport = InMemoryTransport::failing();
        let mut message = Message::new();
        message.set_body("x");

        assert!(!message.send(vec!["a@x.com", "b@x.com"], &transport));
        assert!(transport.deliveries().is_empty());
    }

    #[test]
    fn test_params_bound_after_send_do_not_touch_sent_copy() {
        let transport = InMemoryTransport::new();
        let mut message = Message::new();
        message.set_body("Hi {who}").bind_param("{who}", "Ann");
        message.send("a@x.com", &transport);

        message.bind_param("{who}", "Bob");

        assert_eq!(transport.deliveries()[0].message.body(), Some("Hi Ann"));
    }

    #[test]
    fn test_json_round_trip_keeps_attachment_bytes() {
        let mut message = Message::new();
        message
            .set_subject("Report")
            .set_body("See attached")
            .bind_param("{x}", "y")
            .set_recipients(Receivers::from_pairs(vec![("a@x.com", "Ann")]))
            .add_attachment(vec![0u8, 159, 146, 150], vec![("Content-Type", "application/pdf")]);

        let bytes = serde_json::to_vec(&message).unwrap();
        let decoded: Message = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(decoded, message);
        assert_eq!(decoded.attachments()[0].content, vec![0u8, 159, 146, 150]);
    }

    #[test]
    fn test_decode_rejects_unknown_fields() {
        let result: Result<Message, _> = serde_json::from_str(r#"{"headers":{},"evil":1}"#);
        assert!(result.is_err());
    }
}
