//! Filesystem-backed message queue.
//!
//! Producers may push concurrently: each entry gets a distinct,
//! content-derived name. Reading (`list_pending`/`pull`) assumes a single
//! consumer; see [`super::ConsumerLock`].

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::naming::{constant_time_compare, digest, entry_name, parse_entry_name, unix_now};
use crate::config::QueueProfile;
use crate::error::{MailError, Result};
use crate::message::Message;

/// Suffix given to entries moved aside by [`QueueStore::quarantine`].
pub const QUARANTINE_SUFFIX: &str = ".corrupt";

/// A queue directory plus the salt that authenticates its entries.
#[derive(Debug, Clone)]
pub struct QueueStore {
    path: PathBuf,
    salt: String,
}

impl QueueStore {
    /// Use `path` as the queue directory without validating it.
    pub fn new(path: impl Into<PathBuf>, salt: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            salt: salt.into(),
        }
    }

    /// Open the queue of an async profile.
    ///
    /// Fails with [`MailError::Configuration`] if the directory is not
    /// writable or the salt is missing.
    pub fn open(profile: &QueueProfile) -> Result<Self> {
        let profile = QueueProfile {
            async_delivery: true,
            ..profile.clone()
        };
        profile.validate()?;

        let salt = profile.salt.unwrap_or_default();
        Ok(Self::new(profile.queue_path, salt))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn entry_path(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// Salted name for content with digest `content_digest`, stamped with
    /// `timestamp` or the current time.
    pub fn salt(&self, content_digest: &str, timestamp: Option<u64>) -> String {
        entry_name(&self.salt, content_digest, timestamp.unwrap_or_else(unix_now))
    }

    /// Serialize `message` into a new entry. Returns the bytes written.
    pub fn push(&self, message: &Message) -> Result<usize> {
        self.push_at(message, unix_now()).map(|(_, written)| written)
    }

    /// Push with an explicit timestamp, returning the entry name too.
    ///
    /// Same content at the same timestamp maps to the same name; the later
    /// write replaces the earlier one.
    pub fn push_at(&self, message: &Message, timestamp: u64) -> Result<(String, usize)> {
        let serialized = serde_json::to_vec(message)?;
        let name = self.salt(&digest(&serialized), Some(timestamp));
        let path = self.entry_path(&name);

        // A partially written file fails `check` until the write completes.
        fs::write(&path, &serialized).map_err(|e| MailError::io(&path, e))?;

        info!(
            queue = %self.path.display(),
            entry = %name,
            bytes = serialized.len(),
            "queue_entry_pushed"
        );

        Ok((name, serialized.len()))
    }

    /// Whether `filename` is a genuine entry of this queue.
    ///
    /// Malformed names, unreadable files and digest mismatches all return
    /// `false`; the directory may legitimately hold unrelated files.
    pub fn check(&self, filename: &str) -> bool {
        let Some((timestamp, _)) = parse_entry_name(filename) else {
            debug!(entry = %filename, "queue_entry_foreign");
            return false;
        };

        let path = self.entry_path(filename);
        let content = match fs::read(&path) {
            Ok(content) => content,
            Err(e) => {
                debug!(entry = %filename, error = %e, "queue_entry_unreadable");
                return false;
            }
        };

        let valid = self.matches(filename, timestamp, &content);
        if !valid {
            warn!(entry = %filename, "queue_entry_integrity_mismatch");
        }
        valid
    }

    fn matches(&self, filename: &str, timestamp: u64, content: &[u8]) -> bool {
        let expected = self.salt(&digest(content), Some(timestamp));
        constant_time_compare(&expected, filename)
    }

    /// Names of valid entries, oldest first.
    ///
    /// Entries are ordered by their embedded timestamp, ties broken by name.
    pub fn list_pending(&self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.path).map_err(|e| MailError::io(&self.path, e))?;

        let mut pending: Vec<(u64, String)> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| MailError::io(&self.path, e))?;
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if !self.check(&name) {
                continue;
            }
            if let Some((timestamp, _)) = parse_entry_name(&name) {
                pending.push((timestamp, name));
            }
        }

        pending.sort();
        Ok(pending.into_iter().map(|(_, name)| name).collect())
    }

    /// Decode the oldest entry.
    ///
    /// Returns `Ok(None)` when the queue is empty. With `unlink`, the file is
    /// removed once it has been read and decoded; a crash before removal
    /// means the entry is delivered again.
    pub fn pull(&self, unlink: bool) -> Result<Option<Message>> {
        let Some(name) = self.list_pending()?.into_iter().next() else {
            debug!(queue = %self.path.display(), "queue_empty");
            return Ok(None);
        };

        let path = self.entry_path(&name);
        let content = fs::read(&path).map_err(|e| MailError::io(&path, e))?;

        let timestamp = parse_entry_name(&name).map(|(ts, _)| ts).unwrap_or_default();
        if !self.matches(&name, timestamp, &content) {
            return Err(MailError::Deserialization {
                entry: name,
                reason: "content changed after validation".to_string(),
            });
        }

        let message: Message =
            serde_json::from_slice(&content).map_err(|e| MailError::Deserialization {
                entry: name.clone(),
                reason: e.to_string(),
            })?;

        if unlink {
            fs::remove_file(&path).map_err(|e| MailError::io(&path, e))?;
        }

        info!(
            queue = %self.path.display(),
            entry = %name,
            bytes = content.len(),
            unlinked = unlink,
            "queue_entry_pulled"
        );

        Ok(Some(message))
    }

    /// Move an entry aside so it no longer blocks the queue.
    ///
    /// The renamed file fails [`QueueStore::check`] and is left for manual
    /// inspection.
    pub fn quarantine(&self, entry: &str) -> Result<PathBuf> {
        let from = self.entry_path(entry);
        let to = self.entry_path(&format!("{entry}{QUARANTINE_SUFFIX}"));

        fs::rename(&from, &to).map_err(|e| MailError::io(&from, e))?;

        warn!(entry = %entry, moved_to = %to.display(), "queue_entry_quarantined");
        Ok(to)
    }
}
