// SPDX-License-Identifier: EUPL-1.2

//! Ingestion pipeline for incoming CSP reports.
//!
//! Stages, in order, each switched by [`PipelineConfig`]:
//! 1. Filter - configured gate; rejection ends processing quietly
//! 2. Email admins
//! 3. Log
//! 4. Persist - normalize and store
//! 5. Additional handlers - in configured order, regardless of `save`
//!
//! Mail and handler failures are logged and never stop later stages. A
//! storage failure is returned once the handlers have run.

use std::sync::Arc;

use crate::{
    config::{LogLevel, PipelineConfig},
    db::ReportRepository,
    error::Result,
    hooks::{HookRegistry, ReportFilter, ReportHandler},
    mail::{report_message, AdminMailer, SUBJECT},
    models::{IncomingReport, StoredReport},
    normalize::{format_report, normalize},
};

/// What happened to a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The filter rejected the report; no stage ran.
    Filtered,
    /// All enabled stages ran. `stored` is set when the persist stage is on.
    Processed { stored: Option<StoredReport> },
}

pub struct ReportPipeline {
    config: PipelineConfig,
    filter: Option<Arc<dyn ReportFilter>>,
    handlers: Vec<Arc<dyn ReportHandler>>,
    repository: Arc<dyn ReportRepository>,
    mailer: Arc<dyn AdminMailer>,
}

impl ReportPipeline {
    /// Build a pipeline, resolving the configured hooks against `hooks`.
    pub fn new(
        config: PipelineConfig,
        hooks: &HookRegistry,
        repository: Arc<dyn ReportRepository>,
        mailer: Arc<dyn AdminMailer>,
    ) -> Result<Self> {
        let filter = config
            .filter_function
            .as_deref()
            .map(|name| hooks.filter(name))
            .transpose()?;
        let handlers = hooks.handlers(&config.additional_handlers)?;

        tracing::debug!(
            filter = ?config.filter_function,
            handlers = handlers.len(),
            "Report pipeline configured"
        );

        Ok(Self {
            config,
            filter,
            handlers,
            repository,
            mailer,
        })
    }

    /// Same collaborators, new configuration. Hooks are resolved afresh.
    pub fn reconfigure(&self, config: PipelineConfig, hooks: &HookRegistry) -> Result<Self> {
        Self::new(config, hooks, self.repository.clone(), self.mailer.clone())
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every enabled stage for one report.
    pub async fn process(&self, report: &IncomingReport) -> Result<Outcome> {
        if let Some(filter) = &self.filter {
            if !filter.accept(report) {
                tracing::debug!("CSP report rejected by filter");
                return Ok(Outcome::Filtered);
            }
        }

        if self.config.email_admins {
            self.email_admins(report).await;
        }
        if self.config.log {
            self.log_report(report);
        }

        let saved = if self.config.save {
            Some(self.save_report(report).await)
        } else {
            None
        };

        self.run_additional_handlers(report);

        let stored = saved.transpose()?;
        Ok(Outcome::Processed { stored })
    }

    async fn email_admins(&self, report: &IncomingReport) {
        if let Err(e) = self.mailer.mail_admins(SUBJECT, &report_message(report)).await {
            tracing::error!("Failed to mail CSP report to admins: {e}");
        }
    }

    fn log_report(&self, report: &IncomingReport) {
        let logger = self.config.logger_name.as_str();
        let formatted = format_report(&report.body_text());
        match self.config.log_level {
            LogLevel::Debug => {
                tracing::debug!(logger, "Content Security Policy violation: {formatted}")
            }
            LogLevel::Info => {
                tracing::info!(logger, "Content Security Policy violation: {formatted}")
            }
            LogLevel::Warning => {
                tracing::warn!(logger, "Content Security Policy violation: {formatted}")
            }
            LogLevel::Error => {
                tracing::error!(logger, "Content Security Policy violation: {formatted}")
            }
            LogLevel::Critical => tracing::error!(
                logger,
                critical = true,
                "Content Security Policy violation: {formatted}"
            ),
        }
    }

    async fn save_report(&self, report: &IncomingReport) -> Result<StoredReport> {
        let normalized = normalize(&report.body, report.user_agent.as_deref());
        let stored = self.repository.create(normalized).await?;
        tracing::debug!(id = %stored.id, valid = stored.report.is_valid, "Stored CSP report");
        Ok(stored)
    }

    fn run_additional_handlers(&self, report: &IncomingReport) {
        for (idx, handler) in self.handlers.iter().enumerate() {
            if let Err(e) = handler.handle(report) {
                let name = self
                    .config
                    .additional_handlers
                    .get(idx)
                    .map(String::as_str)
                    .unwrap_or("?");
                tracing::error!(handler = name, "CSP report handler failed: {e:#}");
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
