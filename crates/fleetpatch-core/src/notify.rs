//! Notification and recipient ports
//!
//! Transport lives outside the core; delivery failures are logged by the
//! driver and never undo a recorded group.

use async_trait::async_trait;
use tracing::info;

use crate::error::NotifyError;
use crate::report::ComplianceReport;
use crate::types::HostResult;

/// Addressees split by delivery role
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recipients {
    pub to: Vec<String>,
    pub cc: Vec<String>,
}

impl Recipients {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to.is_empty() && self.cc.is_empty()
    }
}

/// Everything a notifier needs to report one group
#[derive(Debug, Clone)]
pub struct Notification {
    pub subject: String,
    pub report: ComplianceReport,
    pub results: Vec<HostResult>,
    /// Serialized copy of `results`
    pub attachment: Vec<u8>,
    pub attachment_name: String,
}

/// Source of the two recipient lists
pub trait RecipientSource: Send + Sync {
    /// # Errors
    /// Returns `NotifyError::Recipients` if the list cannot be loaded.
    fn recipients(&self) -> Result<Recipients, NotifyError>;
}

/// Fixed recipient lists
#[derive(Debug, Clone, Default)]
pub struct StaticRecipients(pub Recipients);

impl RecipientSource for StaticRecipients {
    fn recipients(&self) -> Result<Recipients, NotifyError> {
        Ok(self.0.clone())
    }
}

/// Delivers a group report
#[async_trait]
pub trait Notifier: Send + Sync {
    /// # Errors
    /// Returns `NotifyError::Delivery` if the transport refuses the message.
    async fn deliver(
        &self,
        recipients: &Recipients,
        notification: &Notification,
    ) -> Result<(), NotifyError>;
}

/// Writes the report to the log instead of sending it
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(
        &self,
        recipients: &Recipients,
        notification: &Notification,
    ) -> Result<(), NotifyError> {
        let report = &notification.report;
        info!(
            subject = %notification.subject,
            to = ?recipients.to,
            cc = ?recipients.cc,
            hosts = report.host_count,
            successful = report.successful_count,
            already_patched = report.already_patched_unique_count,
            cumulative = report.cumulative_total,
            compliance = %format!("{:.2}%", report.compliance_percent),
            attachment = %notification.attachment_name,
            "group report"
        );
        Ok(())
    }
}
