//! Delivery backends.
//!
//! Every backend honors one contract: given the final recipient list and a
//! fully substituted [`Message`], deliver it and report success as a `bool`.
//! The backend is chosen once, from [`TransportKind`], when configuration
//! is loaded.

pub mod memory;
pub mod pipe;

use std::fmt;
use std::str::FromStr;

use crate::error::MailError;
use crate::message::Message;

pub use memory::{Delivery, InMemoryTransport};
pub use pipe::PipeTransport;

/// Hands a composed message to a delivery mechanism.
pub trait Transport: Send + Sync {
    /// Deliver `message` to `to`. Failures are logged by the backend and
    /// reported only as `false`.
    fn deliver(&self, to: &[String], message: &Message) -> bool;
}

/// The closed set of configurable backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Local `sendmail` binary
    Sendmail,
    /// qmail's `qmail-inject`
    Qmail,
    /// Record deliveries in memory
    Memory,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Sendmail => "sendmail",
            TransportKind::Qmail => "qmail",
            TransportKind::Memory => "memory",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = MailError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sendmail" | "mail" => Ok(TransportKind::Sendmail),
            "qmail" => Ok(TransportKind::Qmail),
            "memory" => Ok(TransportKind::Memory),
            other => Err(MailError::Configuration(format!(
                "unknown transport: {other}"
            ))),
        }
    }
}

/// A backend resolved from configuration.
#[derive(Debug, Clone)]
pub enum Backend {
    Pipe(PipeTransport),
    Memory(InMemoryTransport),
}

impl Backend {
    /// Build the backend for `kind`, optionally overriding the program path
    /// of pipe backends.
    pub fn from_kind(kind: TransportKind, command: Option<&str>) -> Self {
        match kind {
            TransportKind::Sendmail => Backend::Pipe(match command {
                Some(program) => PipeTransport::sendmail_at(program),
                None => PipeTransport::sendmail(),
            }),
            TransportKind::Qmail => Backend::Pipe(match command {
                Some(program) => PipeTransport::qmail_at(program),
                None => PipeTransport::qmail(),
            }),
            TransportKind::Memory => Backend::Memory(InMemoryTransport::new()),
        }
    }
}

impl Transport for Backend {
    fn deliver(&self, to: &[String], message: &Message) -> bool {
        match self {
            Backend::Pipe(pipe) => pipe.deliver(to, message),
            Backend::Memory(memory) => memory.deliver(to, message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_kind_parse() {
        assert_eq!("sendmail".parse::<TransportKind>().unwrap(), TransportKind::Sendmail);
        assert_eq!(" QMAIL ".parse::<TransportKind>().unwrap(), TransportKind::Qmail);
        assert_eq!("memory".parse::<TransportKind>().unwrap(), TransportKind::Memory);
        assert!(matches!(
            "smtp".parse::<TransportKind>(),
            Err(MailError::Configuration(_))
        ));
    }

    #[test]
    fn test_backend_dispatches_to_memory() {
        let backend = Backend::from_kind(TransportKind::Memory, None);
        let mut message = Message::new();
        message.set_body("hello");

        assert!(message.send("a@x.com", &backend));

        match backend {
            Backend::Memory(memory) => assert_eq!(memory.deliveries().len(), 1),
            Backend::Pipe(_) => panic!("Expected memory backend"),
        }
    }

    #[test]
    fn test_backend_pipe_uses_command_override() {
        match Backend::from_kind(TransportKind::Qmail, Some("/opt/qmail/bin/qmail-inject")) {
            Backend::Pipe(pipe) => assert_eq!(pipe.program(), "/opt/qmail/bin/qmail-inject"),
            Backend::Memory(_) => panic!("Expected pipe backend"),
        }
    }
}
