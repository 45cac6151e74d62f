//! Salted filesystem queue for deferred delivery.
//!
//! ## Entry lifecycle
//!
//! ```text
//! absent → push() → written → check() passes → pending → pull(unlink) → absent
//!                           ↘ check() fails → ignored
//! ```

pub mod lock;
pub mod naming;
pub mod registry;
pub mod store;

pub use lock::ConsumerLock;
pub use naming::{digest, entry_name, parse_entry_name};
pub use registry::QueueRegistry;
pub use store::QueueStore;
