//! Operator notifications over the local mail transport.

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::io::process::{CommandRunner, CommandSpec};

/// Sink for operator-facing messages.
pub trait Notifier {
    fn notify(&self, subject: &str, body: &str) -> Result<()>;
}

/// Sends one plain-text email per call through `sendmail -t -oi`.
///
/// The operator address is both sender and recipient; every subject carries
/// the configured prefix so mail filters can route the messages.
pub struct SendmailNotifier<R: CommandRunner> {
    runner: R,
    sendmail: String,
    address: String,
    subject_prefix: String,
}

impl<R: CommandRunner> SendmailNotifier<R> {
    pub fn new(
        runner: R,
        sendmail: impl Into<String>,
        address: impl Into<String>,
        subject_prefix: impl Into<String>,
    ) -> Self {
        Self {
            runner,
            sendmail: sendmail.into(),
            address: address.into(),
            subject_prefix: subject_prefix.into(),
        }
    }

    /// Render the RFC 5322 message handed to sendmail.
    pub fn render(&self, subject: &str, body: &str) -> String {
        let subject = format!("{} {}", self.subject_prefix, subject);
        // Header values must stay on one line.
        let subject = subject.replace(['\r', '\n'], " ");
        let date = chrono::Local::now().to_rfc2822();
        format!(
            "From: {addr}\nTo: {addr}\nSubject: {subject}\nDate: {date}\nContent-Type: text/plain; charset=utf-8\n\n{body}\n",
            addr = self.address,
        )
    }
}

impl<R: CommandRunner> Notifier for SendmailNotifier<R> {
    #[instrument(skip(self, body))]
    fn notify(&self, subject: &str, body: &str) -> Result<()> {
        let message = self.render(subject, body);
        let spec = CommandSpec::new(&self.sendmail, Duration::from_secs(60))
            .args(["-t", "-oi"])
            .stdin(message);
        self.runner
            .run(&spec)
            .with_context(|| format!("send email '{subject}' via {}", self.sendmail))?;
        debug!("email handed to sendmail");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedRunner;

    #[test]
    fn render_prefixes_subject_and_addresses_operator() {
        let notifier = SendmailNotifier::new(
            ScriptedRunner::new(),
            "/usr/sbin/sendmail",
            "ops@example.org",
            "BIC_PIPELINE_LAUNCH",
        );
        let message = notifier.render("Run path exists", "details here");
        assert!(message.contains("From: ops@example.org\n"));
        assert!(message.contains("To: ops@example.org\n"));
        assert!(message.contains("Subject: BIC_PIPELINE_LAUNCH Run path exists\n"));
        assert!(message.ends_with("\n\ndetails here\n"));
    }

    #[test]
    fn notify_pipes_message_to_sendmail() {
        let runner = ScriptedRunner::new();
        let notifier = SendmailNotifier::new(
            runner.clone(),
            "/usr/sbin/sendmail",
            "ops@example.org",
            "BIC_PIPELINE_LAUNCH",
        );
        notifier.notify("subject\nwith newline", "body").expect("notify");

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, "/usr/sbin/sendmail");
        assert_eq!(calls[0].args, vec!["-t", "-oi"]);
        let stdin = String::from_utf8(calls[0].stdin.clone().expect("stdin")).expect("utf8");
        assert!(stdin.contains("Subject: BIC_PIPELINE_LAUNCH subject with newline\n"));
    }
}
