//! Configuration module for environment variable parsing.
//!
//! Queue profiles are read from `MAIL_*` variables (`MAIL_<NAME>_*` for
//! profiles other than `default`); worker settings from `WORKER_*`.

use std::env;
use std::fs;
use std::path::PathBuf;

use tracing::warn;

use crate::error::{MailError, Result};
use crate::transport::TransportKind;

/// Name of the profile read from the unprefixed `MAIL_*` variables.
pub const DEFAULT_PROFILE: &str = "default";

/// Settings for one named mail queue.
#[derive(Debug, Clone)]
pub struct QueueProfile {
    /// Profile name
    pub name: String,

    /// Directory holding queue entries
    pub queue_path: PathBuf,

    /// Secret mixed into entry names; required when `async_delivery` is on
    pub salt: Option<String>,

    /// Queue messages instead of sending them immediately
    pub async_delivery: bool,

    /// Subject applied to messages that have none
    pub default_subject: Option<String>,

    /// Delivery backend
    pub transport: TransportKind,

    /// Program path overriding the backend's default
    pub transport_command: Option<String>,
}

impl QueueProfile {
    /// A synchronous profile with no queue settings.
    pub fn new(name: impl Into<String>, queue_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            queue_path: queue_path.into(),
            salt: None,
            async_delivery: false,
            default_subject: None,
            transport: TransportKind::Sendmail,
            transport_command: None,
        }
    }

    /// Load the profile `name` from environment variables.
    pub fn from_env(name: &str) -> Self {
        let transport = match profile_var(name, "TRANSPORT") {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                warn!(profile = name, value = %raw, "Invalid transport, using sendmail");
                TransportKind::Sendmail
            }),
            None => TransportKind::Sendmail,
        };

        QueueProfile {
            name: name.to_string(),

            queue_path: profile_var(name, "QUEUE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/var/spool/mailqueue")),

            salt: profile_var(name, "SALT"),

            async_delivery: profile_var(name, "ASYNC")
                .map(|v| parse_bool(&v))
                .unwrap_or(false),

            default_subject: profile_var(name, "DEFAULT_SUBJECT"),

            transport,

            transport_command: profile_var(name, "TRANSPORT_COMMAND"),
        }
    }

    /// Fail when async delivery is enabled without a usable queue.
    ///
    /// The queue directory must exist and accept new files, and the salt
    /// must be set.
    pub fn validate(&self) -> Result<()> {
        if !self.async_delivery {
            return Ok(());
        }

        match self.salt.as_deref() {
            Some(salt) if !salt.trim().is_empty() => {}
            _ => {
                return Err(MailError::Configuration(format!(
                    "salt is not defined for mail profile {}",
                    self.name
                )))
            }
        }

        let path = &self.queue_path;
        let metadata = fs::metadata(path).map_err(|e| {
            MailError::Configuration(format!("queue folder {} is not accessible: {e}", path.display()))
        })?;

        if !metadata.is_dir() {
            return Err(MailError::Configuration(format!(
                "queue path {} is not a folder",
                path.display()
            )));
        }

        let probe = path.join(format!(
            ".write-probe-{}-{:016x}",
            std::process::id(),
            rand::random::<u64>()
        ));
        fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&probe)
            .and_then(|_| fs::remove_file(&probe))
            .map_err(|e| {
                MailError::Configuration(format!(
                    "queue folder {} is not writable: {e}",
                    path.display()
                ))
            })
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Every configured queue profile
    pub profiles: Vec<QueueProfile>,

    /// Profile drained by the worker
    pub worker_profile: String,

    /// Delay range in milliseconds between drain passes (min, max)
    pub poll_interval_ms: (u64, u64),

    /// Maximum entries delivered per drain pass
    pub batch_size: usize,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let names = parse_csv("MAIL_QUEUE_PROFILES")
            .filter(|names| !names.is_empty())
            .unwrap_or_else(|| vec![DEFAULT_PROFILE.to_string()]);

        Config {
            profiles: names.iter().map(|name| QueueProfile::from_env(name)).collect(),

            worker_profile: env::var("WORKER_PROFILE")
                .unwrap_or_else(|_| DEFAULT_PROFILE.to_string()),

            poll_interval_ms: parse_range("WORKER_POLL_INTERVAL_MS", (1000, 5000)),

            batch_size: env::var("WORKER_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|&n: &usize| n > 0)
                .unwrap_or(100),
        }
    }

    pub fn profile(&self, name: &str) -> Option<&QueueProfile> {
        self.profiles.iter().find(|p| p.name == name)
    }
}

/// Environment variable `key` for `profile`.
fn profile_var(profile: &str, key: &str) -> Option<String> {
    let name = if profile == DEFAULT_PROFILE {
        format!("MAIL_{key}")
    } else {
        format!("MAIL_{}_{key}", profile.to_ascii_uppercase().replace('-', "_"))
    };
    env::var(name).ok()
}

fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Parse a comma-separated range like "500,5000" into a tuple.
fn parse_range(name: &str, default: (u64, u64)) -> (u64, u64) {
    let raw = match env::var(name) {
        Ok(v) => v,
        Err(_) => return default,
    };

    let parts: Vec<&str> = raw.split(',').collect();
    if parts.len() != 2 {
        warn!(env_var = name, value = %raw, "Invalid range format, using default");
        return default;
    }

    let min = parts[0].trim().parse::<u64>();
    let max = parts[1].trim().parse::<u64>();

    match (min, max) {
        (Ok(min), Ok(max)) if min <= max => (min, max),
        _ => {
            warn!(env_var = name, value = %raw, "Invalid range values, using default");
            default
        }
    }
}

/// Parse a comma-separated list of strings.
fn parse_csv(name: &str) -> Option<Vec<String>> {
    env::var(name).ok().map(|raw| {
        raw.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}
