//! Advisory lock enforcing a single queue consumer.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{info, warn};

use crate::error::{MailError, Result};

/// Lock file name inside the queue directory. It never passes the entry
/// name check, so it is invisible to `list_pending`.
pub const LOCK_FILE: &str = ".consumer.lock";

/// Held for as long as this process drains the queue.
#[derive(Debug)]
pub struct ConsumerLock {
    file: File,
    path: PathBuf,
}

impl ConsumerLock {
    /// Take the consumer lock of `queue_path` without waiting.
    ///
    /// Fails with [`MailError::Configuration`] if another process holds it.
    pub fn acquire(queue_path: &Path) -> Result<Self> {
        let path = queue_path.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| MailError::io(&path, e))?;

        if let Err(e) = file.try_lock_exclusive() {
            warn!(lock = %path.display(), error = %e, "consumer_lock_busy");
            return Err(MailError::Configuration(format!(
                "another consumer holds {}",
                path.display()
            )));
        }

        info!(lock = %path.display(), "consumer_lock_acquired");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ConsumerLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(lock = %self.path.display(), error = %e, "consumer_lock_release_failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_consumer_is_refused_until_release() {
        let dir = tempfile::tempdir().unwrap();

        let held = ConsumerLock::acquire(dir.path()).unwrap();
        assert!(matches!(
            ConsumerLock::acquire(dir.path()),
            Err(MailError::Configuration(_))
        ));

        drop(held);
        assert!(ConsumerLock::acquire(dir.path()).is_ok());
    }

    #[test]
    fn test_lock_file_is_not_a_queue_entry() {
        let dir = tempfile::tempdir().unwrap();
        let _lock = ConsumerLock::acquire(dir.path()).unwrap();

        let queue = crate::queue::QueueStore::new(dir.path(), "pepper");
        assert!(queue.list_pending().unwrap().is_empty());
    }
}
