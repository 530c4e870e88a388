// SPDX-License-Identifier: EUPL-1.2

//! Admin mail delivery.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::IncomingReport;
use crate::normalize::format_report;

pub const SUBJECT: &str = "CSP Violation Report";

/// Delivers a message to the site administrators.
#[async_trait]
pub trait AdminMailer: Send + Sync {
    async fn mail_admins(&self, subject: &str, body: &str) -> Result<()>;
}

/// Mail body for a report: user agent followed by the formatted payload.
pub fn report_message(report: &IncomingReport) -> String {
    format!(
        "User agent: {}\n\n{}",
        report.user_agent.as_deref().unwrap_or(""),
        format_report(&report.body_text()),
    )
}

/// Writes messages to the log instead of sending them.
///
/// Stands in for an SMTP relay the same way a console mail backend does.
pub struct TracingMailer {
    admins: Vec<String>,
}

impl TracingMailer {
    pub fn new(admins: Vec<String>) -> Self {
        Self { admins }
    }
}

#[async_trait]
impl AdminMailer for TracingMailer {
    async fn mail_admins(&self, subject: &str, body: &str) -> Result<()> {
        if self.admins.is_empty() {
            tracing::debug!("No admins configured, dropping mail: {subject}");
            return Ok(());
        }
        tracing::info!(to = %self.admins.join(", "), "Mail: {subject}\n{body}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_contains_agent_and_formatted_report() {
        let body = r#"{"document-uri": "http://example.com/"}"#;
        let report = IncomingReport::new(body, Some("Agent007".into()));
        let message = report_message(&report);
        assert!(message.contains("Agent007"));
        assert!(message.contains(&format_report(body)));
    }

    #[tokio::test]
    async fn tracing_mailer_never_fails() {
        let mailer = TracingMailer::new(vec!["ops@example.com".into()]);
        mailer.mail_admins(SUBJECT, "body").await.unwrap();
        TracingMailer::new(Vec::new()).mail_admins(SUBJECT, "body").await.unwrap();
    }
}
