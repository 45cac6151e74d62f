//! Local MTA backends fed through a child process.
//!
//! The rendered message is written to the program's stdin and the bare
//! recipient addresses are passed as arguments.

use std::io::Write;
use std::process::{Command, Stdio};

use tracing::{error, info};

use super::Transport;
use crate::message::{render, Message};

const SENDMAIL: &str = "/usr/sbin/sendmail";
const QMAIL_INJECT: &str = "/var/qmail/bin/qmail-inject";

/// Pipes messages into a sendmail-compatible program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipeTransport {
    program: String,
    args: Vec<String>,
}

impl PipeTransport {
    /// Run `program` with `args` followed by the recipient addresses.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn sendmail() -> Self {
        Self::sendmail_at(SENDMAIL)
    }

    pub fn sendmail_at(program: impl Into<String>) -> Self {
        // -oi: a lone dot does not end the message
        Self::new(program, vec!["-oi".to_string(), "--".to_string()])
    }

    pub fn qmail() -> Self {
        Self::qmail_at(QMAIL_INJECT)
    }

    pub fn qmail_at(program: impl Into<String>) -> Self {
        // -a: deliver to the argument addresses only
        Self::new(program, vec!["-a".to_string(), "--".to_string()])
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn run(&self, addresses: &[&str], raw: &str) -> std::io::Result<std::process::ExitStatus> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .args(addresses)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .spawn()?;

        // stdin is closed before waiting; the child is reaped even when the
        // write fails
        let written = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(raw.as_bytes()),
            None => Ok(()),
        };

        let status = child.wait()?;
        written.map(|_| status)
    }
}

/// Strip a display name, keeping the address inside `<...>`.
fn bare_address(recipient: &str) -> &str {
    match (recipient.rfind('<'), recipient.rfind('>')) {
        (Some(start), Some(end)) if start < end => &recipient[start + 1..end],
        _ => recipient.trim(),
    }
}

impl Transport for PipeTransport {
    fn deliver(&self, to: &[String], message: &Message) -> bool {
        let addresses: Vec<&str> = to.iter().map(|r| bare_address(r)).collect();
        let raw = render(to, message);

        match self.run(&addresses, &raw) {
            Ok(status) if status.success() => {
                info!(
                    program = %self.program,
                    recipients = addresses.len(),
                    bytes = raw.len(),
                    "pipe_transport_delivered"
                );
                true
            }
            Ok(status) => {
                error!(
                    program = %self.program,
                    status = ?status.code(),
                    "pipe_transport_exit_failure"
                );
                false
            }
            Err(e) => {
                error!(program = %self.program, error = %e, "pipe_transport_spawn_failed");
                false
            }
        }
    }
}
