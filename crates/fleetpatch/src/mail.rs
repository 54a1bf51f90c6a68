//! Report delivery through the local sendmail binary

use std::fmt::Write as _;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{info, instrument};

use fleetpatch_core::{Notification, Notifier, NotifyError, Recipients};

const BASE64_LINE: usize = 76;

/// Pipes a multipart MIME message to `sendmail -t`
#[derive(Debug, Clone)]
pub struct SendmailNotifier {
    sendmail_path: PathBuf,
    use_sudo: bool,
    from: String,
}

impl SendmailNotifier {
    pub fn new(sendmail_path: impl Into<PathBuf>, use_sudo: bool, from: impl Into<String>) -> Self {
        Self {
            sendmail_path: sendmail_path.into(),
            use_sudo,
            from: from.into(),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = if self.use_sudo {
            let mut cmd = Command::new("sudo");
            cmd.arg(&self.sendmail_path);
            cmd
        } else {
            Command::new(&self.sendmail_path)
        };
        cmd.arg("-t");
        cmd
    }
}

#[async_trait]
impl Notifier for SendmailNotifier {
    #[instrument(skip(self, recipients, notification), fields(subject = %notification.subject))]
    async fn deliver(
        &self,
        recipients: &Recipients,
        notification: &Notification,
    ) -> Result<(), NotifyError> {
        if recipients.to.is_empty() {
            return Err(NotifyError::Recipients("no [TO] recipients".to_string()));
        }

        let boundary = format!("fleetpatch-{}", Utc::now().format("%Y%m%d%H%M%S%f"));
        let message = compose_message(&self.from, recipients, notification, &boundary);

        let mut child = self
            .command()
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| NotifyError::Delivery(format!("cannot start sendmail: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(message.as_bytes())
                .await
                .map_err(|e| NotifyError::Delivery(format!("cannot write message: {e}")))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;

        if !output.status.success() {
            return Err(NotifyError::Delivery(format!(
                "sendmail exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        info!(to = ?recipients.to, cc = ?recipients.cc, "report mailed");
        Ok(())
    }
}

/// Build the full RFC 5322 message with an HTML body and one attachment
#[must_use]
pub fn compose_message(
    from: &str,
    recipients: &Recipients,
    notification: &Notification,
    boundary: &str,
) -> String {
    let mut msg = String::new();

    let _ = writeln!(msg, "From: {from}\r");
    let _ = writeln!(msg, "To: {}\r", recipients.to.join(", "));
    if !recipients.cc.is_empty() {
        let _ = writeln!(msg, "Cc: {}\r", recipients.cc.join(", "));
    }
    let _ = writeln!(msg, "Subject: {}\r", notification.subject);
    let _ = writeln!(msg, "MIME-Version: 1.0\r");
    let _ = writeln!(msg, "Content-Type: multipart/mixed; boundary=\"{boundary}\"\r");
    let _ = writeln!(msg, "\r");

    let _ = writeln!(msg, "--{boundary}\r");
    let _ = writeln!(msg, "Content-Type: text/html; charset=utf-8\r");
    let _ = writeln!(msg, "Content-Transfer-Encoding: 8bit\r");
    let _ = writeln!(msg, "\r");
    msg.push_str(&render_html(notification));
    let _ = writeln!(msg, "\r");

    let _ = writeln!(msg, "--{boundary}\r");
    let _ = writeln!(msg, "Content-Type: application/json\r");
    let _ = writeln!(msg, "Content-Transfer-Encoding: base64\r");
    let _ = writeln!(
        msg,
        "Content-Disposition: attachment; filename=\"{}\"\r",
        notification.attachment_name
    );
    let _ = writeln!(msg, "\r");
    let encoded = STANDARD.encode(&notification.attachment);
    for line in encoded.as_bytes().chunks(BASE64_LINE) {
        let _ = writeln!(msg, "{}\r", String::from_utf8_lossy(line));
    }
    let _ = writeln!(msg, "--{boundary}--\r");

    msg
}

/// Summary table followed by the per-host result table
#[must_use]
pub fn render_html(notification: &Notification) -> String {
    let report = &notification.report;
    let mut html = String::new();

    html.push_str("<html><body>\r\n");
    let _ = writeln!(
        html,
        "<p>Patching completed for '{}' servers.</p>\r",
        escape(&report.group_id)
    );
    html.push_str("<table border=\"1\" cellpadding=\"5\" cellspacing=\"0\">\r\n");
    for (label, value) in [
        ("Group", escape(&report.group_id)),
        ("No of Servers", report.host_count.to_string()),
        ("Successful Patches", report.successful_count.to_string()),
        (
            "Already Patched Servers",
            report.already_patched_unique_count.to_string(),
        ),
        ("Total completed Servers", report.cumulative_total.to_string()),
        (
            "Compliance Percentage",
            format!("{:.2}%", report.compliance_percent),
        ),
    ] {
        let _ = writeln!(html, "<tr><th>{label}</th><td>{value}</td></tr>\r");
    }
    html.push_str("</table>\r\n<br>\r\n");

    html.push_str("<table border=\"1\" cellpadding=\"5\" cellspacing=\"0\">\r\n");
    html.push_str(
        "<tr><th>Server</th><th>Status</th><th>Updated</th>\
         <th>Installed</th><th>Removed</th></tr>\r\n",
    );
    for result in &notification.results {
        let _ = writeln!(
            html,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\r",
            escape(&result.host),
            escape(&result.status.to_string()),
            result.updated_count,
            result.installed_count,
            result.removed_count
        );
    }
    html.push_str("</table>\r\n</body></html>\r\n");

    html
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
