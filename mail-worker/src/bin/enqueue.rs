//! Mailqueue Enqueue - compose one message and dispatch it.
//!
//! Usage:
//!
//! ```text
//! mailqueue-enqueue [--profile NAME] [--subject TEXT] [--header Name=Value]...
//!                   [--param name=value]... ADDRESS... < body.txt
//! ```
//!
//! The body is read from stdin. Depending on the profile the message is
//! sent immediately or written to the queue for `mailqueue-worker`.

use std::io::Read;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mailqueue::config::DEFAULT_PROFILE;
use mailqueue::{Backend, Config, Mailer, Message, QueueRegistry};

/// Compose one message from stdin and send or queue it.
#[derive(Debug, Parser)]
#[command(name = "mailqueue-enqueue", about = "Send or queue one message read from stdin")]
struct Args {
    /// Mail profile to dispatch through
    #[arg(long)]
    profile: Option<String>,

    #[arg(long)]
    subject: Option<String>,

    /// Extra header, as Name=Value
    #[arg(long = "header", value_name = "NAME=VALUE", value_parser = split_pair)]
    headers: Vec<(String, String)>,

    /// Substitution param, as name=value
    #[arg(long = "param", value_name = "NAME=VALUE", value_parser = split_pair)]
    params: Vec<(String, String)>,

    #[arg(value_name = "ADDRESS", required = true)]
    addresses: Vec<String>,
}

/// Split on the first `=`; the value may contain more.
fn split_pair(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected name=value, got {raw:?}")),
    }
}

fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    let args = Args::parse();

    let config = Config::from_env();
    let registry = QueueRegistry::from_config(&config);
    let name = args.profile.as_deref().unwrap_or(DEFAULT_PROFILE);
    let profile = registry
        .profile(name)
        .with_context(|| format!("Unknown mail profile {name}"))?;

    let transport = Backend::from_kind(profile.transport, profile.transport_command.as_deref());
    let mailer = Mailer::from_registry(&registry, name, transport)
        .context("Failed to initialize mailer")?;

    let mut body = String::new();
    std::io::stdin()
        .read_to_string(&mut body)
        .context("Failed to read body from stdin")?;

    let mut message = Message::new();
    for (header, value) in &args.headers {
        message.set_header(header, value);
    }
    if let Some(subject) = &args.subject {
        message.set_subject(subject);
    }
    for (param, value) in &args.params {
        message.bind_param(param, value);
    }
    message.set_body(body);

    let ok = mailer
        .send_to_many(args.addresses.iter().map(String::as_str), &message)
        .context("Failed to dispatch message")?;

    info!(
        profile = name,
        recipients = args.addresses.len(),
        ok = ok,
        "enqueue_complete"
    );

    if !ok {
        bail!("delivery failed for at least one recipient");
    }
    Ok(())
}
