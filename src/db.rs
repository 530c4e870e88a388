// SPDX-License-Identifier: EUPL-1.2

//! Report storage and application state.
//!
//! The core only talks to [`ReportRepository`]. [`PgReportRepository`] is the
//! production backend; [`MemoryReportRepository`] serves local development and
//! tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    config::{Config, StorageBackend},
    error::Result,
    fields::REPORT_FIELDS,
    hooks::HookRegistry,
    mail::{AdminMailer, TracingMailer},
    models::{StoredReport, ViolationReport},
    pipeline::ReportPipeline,
};

/// Storage operations the core needs.
#[async_trait]
pub trait ReportRepository: Send + Sync {
    /// Insert a new report, setting `created` and `modified` to now.
    async fn create(&self, report: ViolationReport) -> Result<StoredReport>;

    /// Delete every report created strictly before `cutoff`. Returns the count.
    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Reports with `since <= created < to`, newest first.
    async fn list_created_between(
        &self,
        since: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StoredReport>>;
}

// ── Postgres ──────────────────────────────────────────────────────────────────

/// `csp_reports` table backed by PostgreSQL.
#[derive(Clone)]
pub struct PgReportRepository {
    pub pool: PgPool,
}

impl PgReportRepository {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn report_columns() -> String {
    REPORT_FIELDS
        .iter()
        .map(|f| f.field.column())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Columns read back into a [`StoredReport`].
fn stored_columns() -> String {
    format!("id, created, modified, json, user_agent, is_valid, {}", report_columns())
}

#[async_trait]
impl ReportRepository for PgReportRepository {
    async fn create(&self, report: ViolationReport) -> Result<StoredReport> {
        let sql = format!(
            "INSERT INTO csp_reports (json, user_agent, is_valid, {columns})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
             RETURNING {stored}",
            columns = report_columns(),
            stored = stored_columns(),
        );
        let stored = sqlx::query_as::<_, StoredReport>(&sql)
            .bind(&report.raw_json)
            .bind(&report.user_agent)
            .bind(report.is_valid)
            .bind(&report.document_uri)
            .bind(&report.referrer)
            .bind(&report.blocked_uri)
            .bind(&report.violated_directive)
            .bind(&report.original_policy)
            .bind(&report.effective_directive)
            .bind(&report.source_file)
            .bind(report.status_code)
            .bind(report.line_number)
            .bind(report.column_number)
            .bind(report.disposition)
            .fetch_one(&self.pool)
            .await?;

        Ok(stored)
    }

    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM csp_reports WHERE created < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn list_created_between(
        &self,
        since: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StoredReport>> {
        let sql = format!(
            "SELECT {stored}
             FROM csp_reports
             WHERE created >= $1 AND created < $2
             ORDER BY created DESC, id DESC",
            stored = stored_columns(),
        );
        let reports = sqlx::query_as::<_, StoredReport>(&sql)
            .bind(since)
            .bind(to)
            .fetch_all(&self.pool)
            .await?;

        Ok(reports)
    }
}

// ── In-memory ─────────────────────────────────────────────────────────────────

/// Process-local storage. Contents are lost on exit.
#[derive(Default)]
pub struct MemoryReportRepository {
    rows: RwLock<Vec<StoredReport>>,
}

impl MemoryReportRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert with an explicit creation time.
    pub async fn create_at(&self, report: ViolationReport, created: DateTime<Utc>) -> StoredReport {
        let stored = StoredReport {
            id: Uuid::new_v4(),
            created,
            modified: created,
            report,
        };
        self.rows.write().await.push(stored.clone());
        stored
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn all(&self) -> Vec<StoredReport> {
        self.rows.read().await.clone()
    }
}

#[async_trait]
impl ReportRepository for MemoryReportRepository {
    async fn create(&self, report: ViolationReport) -> Result<StoredReport> {
        Ok(self.create_at(report, Utc::now()).await)
    }

    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|r| r.created >= cutoff);
        Ok((before - rows.len()) as u64)
    }

    async fn list_created_between(
        &self,
        since: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StoredReport>> {
        let mut found: Vec<StoredReport> = self
            .rows
            .read()
            .await
            .iter()
            .rev()
            .filter(|r| r.created >= since && r.created < to)
            .cloned()
            .collect();
        // Stable: equal timestamps stay newest-inserted first.
        found.sort_by(|a, b| b.created.cmp(&a.created));
        Ok(found)
    }
}

// ── Application state ─────────────────────────────────────────────────────────

/// Shared application state injected into every Axum handler.
pub struct AppState {
    pub repository: Arc<dyn ReportRepository>,
    pub pipeline: ReportPipeline,
}

impl AppState {
    /// Open the configured storage backend, running migrations for Postgres.
    pub async fn open_repository(config: &Config) -> Result<Arc<dyn ReportRepository>> {
        match config.storage {
            StorageBackend::Postgres => {
                let repo = PgReportRepository::connect(&config.database_url).await?;
                tracing::info!("CSP Reports connected to database");
                repo.migrate().await?;
                tracing::info!("Migrations applied");
                Ok(Arc::new(repo))
            }
            StorageBackend::Memory => {
                tracing::warn!("CSP_REPORTS_STORAGE=memory, reports are not persisted");
                Ok(Arc::new(MemoryReportRepository::new()))
            }
        }
    }

    /// Connect storage and build the ingestion pipeline.
    pub async fn connect(config: &Config, hooks: &HookRegistry) -> Result<Self> {
        let repository = Self::open_repository(config).await?;
        let mailer: Arc<dyn AdminMailer> = Arc::new(TracingMailer::new(config.admins.clone()));
        let pipeline =
            ReportPipeline::new(config.pipeline.clone(), hooks, repository.clone(), mailer)?;
        Ok(Self { repository, pipeline })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2016, 4, 20, h, 0, 0).unwrap()
    }

    #[test]
    fn column_list_follows_field_table() {
        assert_eq!(
            report_columns(),
            "document_uri, referrer, blocked_uri, violated_directive, original_policy, \
             effective_directive, source_file, status_code, line_number, column_number, disposition"
        );
    }

    #[test]
    fn row_columns_match_model_fields() {
        assert_eq!(
            stored_columns(),
            format!("id, created, modified, json, user_agent, is_valid, {}", report_columns())
        );
        // `FromRow` maps columns by field name; only `json` is renamed.
        let fields = serde_json::to_value(ViolationReport::default()).unwrap();
        for spec in REPORT_FIELDS {
            assert!(fields.get(spec.field.column()).is_some(), "{}", spec.field.column());
        }
    }

    #[tokio::test]
    async fn memory_create_sets_timestamps() {
        let repo = MemoryReportRepository::new();
        let stored = repo.create(ViolationReport::unparsed("x")).await.unwrap();
        assert_eq!(stored.created, stored.modified);
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn memory_range_is_half_open_and_newest_first() {
        let repo = MemoryReportRepository::new();
        repo.create_at(ViolationReport::unparsed("a"), at(1)).await;
        repo.create_at(ViolationReport::unparsed("b"), at(2)).await;
        repo.create_at(ViolationReport::unparsed("c"), at(3)).await;

        let found = repo.list_created_between(at(1), at(3)).await.unwrap();
        let raw: Vec<_> = found.iter().map(|r| r.report.raw_json.as_str()).collect();
        assert_eq!(raw, ["b", "a"]);
    }

    #[tokio::test]
    async fn memory_delete_is_strict() {
        let repo = MemoryReportRepository::new();
        repo.create_at(ViolationReport::unparsed("old"), at(1)).await;
        repo.create_at(ViolationReport::unparsed("edge"), at(2)).await;

        assert_eq!(repo.delete_created_before(at(2)).await.unwrap(), 1);
        let left = repo.all().await;
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].report.raw_json, "edge");
    }
}
