// SPDX-License-Identifier: EUPL-1.2

//! Ranked summary of stored reports over a time window.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use url::Url;

use crate::db::ReportRepository;
use crate::error::Result;
use crate::models::StoredReport;

pub const DEFAULT_TOP: usize = 10;

/// Strip query and fragment from a URI.
///
/// Absolute and scheme-relative URIs are parsed; anything else (`self`,
/// `inline`, an empty string) is its own root.
pub fn root_uri(uri: &str) -> String {
    if let Some(rest) = uri.strip_prefix("//") {
        return match Url::parse(&format!("http://{rest}")) {
            Ok(url) => format!("//{}", &strip(url)["http://".len()..]),
            Err(_) => uri.to_string(),
        };
    }
    match Url::parse(uri) {
        Ok(url) => strip(url),
        Err(_) => uri.to_string(),
    }
}

fn strip(mut url: Url) -> String {
    url.set_query(None);
    url.set_fragment(None);
    url.into()
}

/// Reports sharing one root URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViolationGroup {
    pub root_uri: String,
    /// Number of reports, including those past the example limit
    pub count: usize,
    /// First `top` reports in scan order
    pub examples: Vec<StoredReport>,
    pub top: usize,
}

impl ViolationGroup {
    pub fn new(root_uri: impl Into<String>, top: usize) -> Self {
        Self {
            root_uri: root_uri.into(),
            count: 0,
            examples: Vec::new(),
            top,
        }
    }

    pub fn append(&mut self, report: &StoredReport) {
        self.count += 1;
        if self.examples.len() < self.top {
            self.examples.push(report.clone());
        }
    }
}

/// Groups in first-seen order.
struct Grouping {
    top: usize,
    index: HashMap<String, usize>,
    groups: Vec<ViolationGroup>,
}

impl Grouping {
    fn new(top: usize) -> Self {
        Self {
            top,
            index: HashMap::new(),
            groups: Vec::new(),
        }
    }

    fn add(&mut self, uri: &str, report: &StoredReport) {
        let key = root_uri(uri);
        let idx = match self.index.get(&key) {
            Some(&idx) => idx,
            None => {
                self.groups.push(ViolationGroup::new(key.clone(), self.top));
                self.index.insert(key, self.groups.len() - 1);
                self.groups.len() - 1
            }
        };
        self.groups[idx].append(report);
    }

    /// Highest counts first; ties keep first-seen order.
    fn ranked(mut self) -> Vec<ViolationGroup> {
        self.groups.sort_by(|a, b| b.count.cmp(&a.count));
        self.groups.truncate(self.top);
        self.groups
    }
}

/// CSP report summary for `[since, to)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub since: DateTime<Utc>,
    pub to: DateTime<Utc>,
    /// Size of each section
    pub top: usize,

    pub total_count: usize,
    pub valid_count: usize,
    pub invalid_count: usize,

    /// Top sources of violations by document URI
    pub sources: Vec<ViolationGroup>,
    /// Top blocked URIs
    pub blocks: Vec<ViolationGroup>,
    /// First invalid reports in scan order
    pub invalid_reports: Vec<StoredReport>,
}

impl Summary {
    pub fn empty(since: DateTime<Utc>, to: DateTime<Utc>, top: usize) -> Self {
        Self {
            since,
            to,
            top,
            total_count: 0,
            valid_count: 0,
            invalid_count: 0,
            sources: Vec::new(),
            blocks: Vec::new(),
            invalid_reports: Vec::new(),
        }
    }

    /// Aggregate already fetched reports, in the given scan order.
    ///
    /// Reports outside `[since, to)` are skipped.
    pub fn from_reports<'a>(
        since: DateTime<Utc>,
        to: DateTime<Utc>,
        top: usize,
        reports: impl IntoIterator<Item = &'a StoredReport>,
    ) -> Self {
        let mut summary = Self::empty(since, to, top);
        let mut sources = Grouping::new(top);
        let mut blocks = Grouping::new(top);

        for report in reports {
            if report.created < since || report.created >= to {
                continue;
            }
            summary.total_count += 1;

            if !report.report.is_valid {
                summary.invalid_count += 1;
                if summary.invalid_reports.len() < top {
                    summary.invalid_reports.push(report.clone());
                }
                continue;
            }

            summary.valid_count += 1;
            sources.add(report.report.document_uri.as_deref().unwrap_or_default(), report);
            blocks.add(report.report.blocked_uri.as_deref().unwrap_or_default(), report);
        }

        summary.sources = sources.ranked();
        summary.blocks = blocks.ranked();
        summary
    }

    /// Render the summary as plain text.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

/// Fetch the window from storage and aggregate it.
pub async fn collect(
    repository: &dyn ReportRepository,
    since: DateTime<Utc>,
    to: DateTime<Utc>,
    top: usize,
) -> Result<Summary> {
    let reports = repository.list_created_between(since, to).await?;
    let summary = Summary::from_reports(since, to, top, &reports);
    tracing::debug!(
        total = summary.total_count,
        valid = summary.valid_count,
        invalid = summary.invalid_count,
        "Collected CSP report summary"
    );
    Ok(summary)
}

// ── Rendering ─────────────────────────────────────────────────────────────────

fn heading(f: &mut fmt::Formatter<'_>, title: &str) -> fmt::Result {
    writeln!(f)?;
    writeln!(f, "{title}")?;
    writeln!(f, "{}", "-".repeat(title.chars().count()))
}

fn write_groups(f: &mut fmt::Formatter<'_>, groups: &[ViolationGroup]) -> fmt::Result {
    if groups.is_empty() {
        return writeln!(f, "No violations.");
    }
    for (rank, group) in groups.iter().enumerate() {
        writeln!(f, "{:>3}. {} ({})", rank + 1, group.root_uri, group.count)?;
        for example in &group.examples {
            let r = &example.report;
            writeln!(
                f,
                "       {} {} <- {} [{}]",
                example.created.format("%Y-%m-%d %H:%M:%S"),
                r.document_uri.as_deref().unwrap_or(""),
                r.blocked_uri.as_deref().unwrap_or(""),
                r.violated_directive.as_deref().unwrap_or(""),
            )?;
        }
    }
    Ok(())
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let title = "CSP report summary";
        writeln!(f, "{title}")?;
        writeln!(f, "{}", "=".repeat(title.len()))?;
        writeln!(f)?;
        writeln!(f, "Period: {} - {}", self.since.to_rfc3339(), self.to.to_rfc3339())?;
        writeln!(f, "Total reports: {}", self.total_count)?;
        writeln!(f, "Valid reports: {}", self.valid_count)?;
        writeln!(f, "Invalid reports: {}", self.invalid_count)?;

        heading(f, "Violation sources")?;
        write_groups(f, &self.sources)?;

        heading(f, "Blocked URIs")?;
        write_groups(f, &self.blocks)?;

        heading(f, "Invalid reports")?;
        if self.invalid_reports.is_empty() {
            writeln!(f, "No invalid reports.")?;
        }
        for report in &self.invalid_reports {
            writeln!(
                f,
                "  {} {}",
                report.created.format("%Y-%m-%d %H:%M:%S"),
                report.report.raw_json
            )?;
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
