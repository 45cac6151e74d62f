//! Queue consumer loop.
//!
//! Each pass pulls entries (unlinking them), delivers each to the
//! recipients stored on it, then sleeps a random interval. Undecodable
//! entries are quarantined so they cannot block the queue.

use std::time::Duration;

use anyhow::{Context, Result};
use rand::Rng;
use tokio::signal;
use tokio::time::sleep;
use tracing::{error, info, warn};

use mailqueue::{Backend, Config, ConsumerLock, MailError, QueueRegistry, QueueStore, Transport};

/// Counts from one drain pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub delivered: usize,
    pub failed: usize,
    pub quarantined: usize,
}

impl DrainReport {
    pub fn total(&self) -> usize {
        self.delivered + self.failed + self.quarantined
    }
}

/// Deliver up to `batch_size` queued messages.
///
/// Stops early when the queue is empty. I/O errors end the pass and are
/// returned; decode errors quarantine the entry and the pass continues.
pub fn drain_once<T>(
    queue: &QueueStore,
    transport: &T,
    batch_size: usize,
) -> mailqueue::Result<DrainReport>
where
    T: Transport + ?Sized,
{
    let mut report = DrainReport::default();

    while report.total() < batch_size {
        match queue.pull(true) {
            Ok(None) => break,
            Ok(Some(mut message)) => {
                let recipients = message.take_recipients();
                if recipients.is_empty() {
                    warn!(subject = ?message.subject(), "worker_entry_without_recipients");
                    report.failed += 1;
                    continue;
                }

                if message.send(recipients, transport) {
                    report.delivered += 1;
                } else {
                    error!(subject = ?message.subject(), "worker_delivery_failed");
                    report.failed += 1;
                }
            }
            Err(MailError::Deserialization { entry, reason }) => {
                error!(entry = %entry, reason = %reason, "worker_entry_undecodable");
                queue.quarantine(&entry)?;
                report.quarantined += 1;
            }
            Err(e) => return Err(e),
        }
    }

    Ok(report)
}

/// Run the consumer until SIGINT/SIGTERM.
///
/// This function:
/// 1. Opens the worker profile's queue (fails fast on bad configuration)
/// 2. Takes the single-consumer lock on the queue folder
/// 3. Drains the queue, sleeping a random poll interval between passes
pub async fn run(config: Config) -> Result<()> {
    let registry = QueueRegistry::from_config(&config);
    let profile = registry
        .profile(&config.worker_profile)
        .cloned()
        .with_context(|| format!("Unknown worker profile {}", config.worker_profile))?;

    let queue = registry
        .open(&profile.name)
        .context("Failed to open mail queue")?;
    let _lock = ConsumerLock::acquire(queue.path()).context("Failed to acquire consumer lock")?;

    let transport = Backend::from_kind(profile.transport, profile.transport_command.as_deref());

    info!(
        profile = %profile.name,
        queue = %queue.path().display(),
        transport = %profile.transport,
        batch_size = config.batch_size,
        "worker_ready"
    );

    // Create shutdown signal future
    let shutdown = async {
        let ctrl_c = async {
            signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Received SIGINT"),
            _ = terminate => info!("Received SIGTERM"),
        }
    };

    tokio::pin!(shutdown);

    loop {
        let pass_queue = queue.clone();
        let pass_transport = transport.clone();
        let batch_size = config.batch_size;

        let full_batch = match tokio::task::spawn_blocking(move || {
            drain_once(&pass_queue, &pass_transport, batch_size)
        })
        .await
        .context("Drain task panicked")?
        {
            Ok(report) => {
                if report.total() > 0 {
                    info!(
                        delivered = report.delivered,
                        failed = report.failed,
                        quarantined = report.quarantined,
                        "worker_pass_complete"
                    );
                }
                report.total() >= batch_size
            }
            Err(e) => {
                error!(error = %e, "worker_pass_failed");
                false
            }
        };

        // A full batch means more may be waiting
        let delay_ms = if full_batch {
            0
        } else {
            let (min, max) = config.poll_interval_ms;
            rand::thread_rng().gen_range(min..=max)
        };

        tokio::select! {
            _ = &mut shutdown => {
                info!("worker_stopping");
                break;
            }
            _ = sleep(Duration::from_millis(delay_ms)) => {}
        }
    }

    info!("worker_shutdown_complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailqueue::queue::digest;
    use mailqueue::{InMemoryTransport, Message, Receivers};
    use std::fs;

    fn queued(body: &str, to: Receivers) -> Message {
        let mut message = Message::new();
        message
            .set_subject("Hi {name}")
            .set_body(body)
            .bind_param("{name}", "Ann")
            .set_recipients(to);
        message
    }

    #[test]
    fn test_drain_delivers_to_stored_recipients() {
        let dir = tempfile::tempdir().unwrap();
        let queue = QueueStore::new(dir.path(), "pepper");
        let transport = InMemoryTransport::new();
        queue
            .push_at(&queued("Dear {name}", Receivers::from_pairs(vec![("a@x.com", "Ann")])), 1)
            .unwrap();
        queue.push_at(&queued("second", Receivers::from("b@x.com")), 2).unwrap();

        let report = drain_once(&queue, &transport, 10).unwrap();

        assert_eq!(report.delivered, 2);
        let deliveries = transport.deliveries();
        assert_eq!(deliveries[0].to, vec!["Ann <a@x.com>".to_string()]);
        assert_eq!(deliveries[0].message.body(), Some("Dear Ann"));
        assert_eq!(deliveries[0].message.subject(), Some("Hi Ann"));
        assert_eq!(deliveries[1].to, vec!["b@x.com".to_string()]);
        assert!(queue.list_pending().unwrap().is_empty());
    }

    #[test]
    fn test_drain_respects_batch_size() {
        let dir = tempfile::tempdir().unwrap();
        let queue = QueueStore::new(dir.path(), "pepper");
        for i in 0..3 {
            queue.push_at(&queued(&format!("m{i}"), Receivers::from("a@x.com")), i).unwrap();
        }

        let report = drain_once(&queue, &InMemoryTransport::new(), 2).unwrap();

        assert_eq!(report.total(), 2);
        assert_eq!(queue.list_pending().unwrap().len(), 1);
    }

    #[test]
    fn test_drain_quarantines_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        let queue = QueueStore::new(dir.path(), "pepper");
        let content = b"garbage";
        let bad = queue.salt(&digest(content), Some(1));
        fs::write(dir.path().join(&bad), content).unwrap();
        queue.push_at(&queued("ok", Receivers::from("a@x.com")), 2).unwrap();

        let report = drain_once(&queue, &InMemoryTransport::new(), 10).unwrap();

        assert_eq!(report.quarantined, 1);
        assert_eq!(report.delivered, 1);
        assert!(dir.path().join(format!("{bad}.corrupt")).exists());
    }

    #[test]
    fn test_drain_counts_failures_and_missing_recipients() {
        let dir = tempfile::tempdir().unwrap();
        let queue = QueueStore::new(dir.path(), "pepper");
        queue.push_at(&queued("nobody", Receivers::default()), 1).unwrap();
        queue.push_at(&queued("rejected", Receivers::from("a@x.com")), 2).unwrap();

        let report = drain_once(&queue, &InMemoryTransport::failing(), 10).unwrap();

        assert_eq!(report.failed, 2);
        assert!(queue.list_pending().unwrap().is_empty());
    }
}
