//! Explicit registry of named queue profiles.

use std::collections::HashMap;

use tracing::info;

use super::QueueStore;
use crate::config::{Config, QueueProfile};
use crate::error::{MailError, Result};

/// Builds [`QueueStore`]s for named profiles on demand.
///
/// Nothing is cached: each `open` validates the profile and returns a fresh
/// store. Callers that want to share one keep it themselves.
#[derive(Debug, Clone, Default)]
pub struct QueueRegistry {
    profiles: HashMap<String, QueueProfile>,
}

impl QueueRegistry {
    pub fn new(profiles: impl IntoIterator<Item = QueueProfile>) -> Self {
        Self {
            profiles: profiles
                .into_iter()
                .map(|profile| (profile.name.clone(), profile))
                .collect(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.profiles.iter().cloned())
    }

    pub fn profile(&self, name: &str) -> Option<&QueueProfile> {
        self.profiles.get(name)
    }

    /// Open the queue of profile `name`.
    pub fn open(&self, name: &str) -> Result<QueueStore> {
        let profile = self
            .profile(name)
            .ok_or_else(|| MailError::Configuration(format!("unknown mail profile: {name}")))?;

        let store = QueueStore::open(profile)?;
        info!(profile = name, queue = %store.path().display(), "queue_opened");
        Ok(store)
    }
}
