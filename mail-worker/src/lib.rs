//! Mailqueue - mail composition with a salted filesystem delivery queue.
//!
//! This library provides shared modules for the two binaries:
//! - `mailqueue-enqueue`: Composes a message and sends or queues it
//! - `mailqueue-worker`: Drains the queue through the configured transport
//!
//! ## Architecture
//!
//! ```text
//! Message::send() ──────────────────────────────→ Transport
//! Mailer (async) → QueueStore::push() → folder → Worker → QueueStore::pull() → Transport
//! ```

pub mod config;
pub mod error;
pub mod mailer;
pub mod message;
pub mod queue;
pub mod transport;

// Re-export commonly used types
pub use config::{Config, QueueProfile};
pub use error::{MailError, Result};
pub use mailer::{Dispatch, Mailer};
pub use message::{Attachment, Message, Receiver, Receivers};
pub use queue::{ConsumerLock, QueueRegistry, QueueStore};
pub use transport::{Backend, InMemoryTransport, PipeTransport, Transport, TransportKind};
