//! Profile-level dispatch: send now, or queue for the worker.

use tracing::{info, warn};

use crate::config::QueueProfile;
use crate::error::{MailError, Result};
use crate::message::{is_valid_email, Message, Receivers};
use crate::queue::{QueueRegistry, QueueStore};
use crate::transport::Transport;

/// Outcome of a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Delivered immediately; carries the transport's verdict.
    Sent(bool),
    /// Written to the queue.
    Queued { bytes: usize },
}

impl Dispatch {
    /// Whether the message was handed off successfully.
    pub fn is_ok(&self) -> bool {
        match self {
            Dispatch::Sent(sent) => *sent,
            Dispatch::Queued { .. } => true,
        }
    }
}

/// Sends messages according to one queue profile.
pub struct Mailer<T: Transport> {
    profile: QueueProfile,
    queue: Option<QueueStore>,
    transport: T,
}

impl<T: Transport> Mailer<T> {
    /// Build a mailer for `profile`.
    ///
    /// In async mode the queue is opened here, so a bad queue folder or a
    /// missing salt fails at startup with [`MailError::Configuration`].
    pub fn new(profile: QueueProfile, transport: T) -> Result<Self> {
        let queue = if profile.async_delivery {
            Some(QueueStore::open(&profile)?)
        } else {
            None
        };

        info!(
            profile = %profile.name,
            async_delivery = profile.async_delivery,
            transport = %profile.transport,
            "mailer_ready"
        );

        Ok(Self {
            profile,
            queue,
            transport,
        })
    }

    /// Build a mailer for the registry's profile `name`.
    pub fn from_registry(registry: &QueueRegistry, name: &str, transport: T) -> Result<Self> {
        let profile = registry
            .profile(name)
            .cloned()
            .ok_or_else(|| MailError::Configuration(format!("unknown mail profile: {name}")))?;
        Self::new(profile, transport)
    }

    pub fn profile(&self) -> &QueueProfile {
        &self.profile
    }

    /// The queue, when the profile is asynchronous.
    pub fn queue(&self) -> Option<&QueueStore> {
        self.queue.as_ref()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Dispatch `message` to a single address.
    ///
    /// The address must be a bare valid email. A message without a
    /// `Subject` gets the profile's default subject.
    pub fn send_to_one(&self, address: &str, mut message: Message) -> Result<Dispatch> {
        if !is_valid_email(address) {
            warn!(address = %address, "mailer_invalid_address");
            return Err(MailError::Validation(address.to_string()));
        }

        if message.subject().is_none() {
            if let Some(subject) = &self.profile.default_subject {
                message.set_subject(subject);
            }
        }

        match &self.queue {
            Some(queue) => {
                message.set_recipients(Receivers::from(address));
                let bytes = queue.push(&message)?;
                Ok(Dispatch::Queued { bytes })
            }
            None => Ok(Dispatch::Sent(message.send(address, &self.transport))),
        }
    }

    /// Dispatch a copy of `message` to each address.
    ///
    /// Every address is validated before anything is dispatched. Returns
    /// `true` only if every dispatch succeeded.
    pub fn send_to_many<'a, I>(&self, addresses: I, message: &Message) -> Result<bool>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let addresses: Vec<&str> = addresses.into_iter().collect();
        if let Some(invalid) = addresses.iter().find(|a| !is_valid_email(a)) {
            return Err(MailError::Validation(invalid.to_string()));
        }

        let mut all_ok = true;
        for address in addresses {
            let dispatch = self.send_to_one(address, message.clone())?;
            all_ok &= dispatch.is_ok();
        }

        info!(profile = %self.profile.name, all_ok = all_ok, "mailer_batch_complete");
        Ok(all_ok)
    }
}
