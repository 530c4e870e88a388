// SPDX-License-Identifier: EUPL-1.2

//! Pluggable report filters and handlers.
//!
//! Configuration refers to hooks by identifier. The [`HookRegistry`] is filled
//! at startup and the pipeline resolves identifiers against it once, when it
//! is built.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ReportsError, Result};
use crate::models::IncomingReport;
use crate::normalize::REPORT_KEY;

/// Gate run before any other stage. `false` drops the report silently.
pub trait ReportFilter: Send + Sync {
    fn accept(&self, report: &IncomingReport) -> bool;
}

impl<F> ReportFilter for F
where
    F: Fn(&IncomingReport) -> bool + Send + Sync,
{
    fn accept(&self, report: &IncomingReport) -> bool {
        self(report)
    }
}

/// Custom action run after the built-in stages.
pub trait ReportHandler: Send + Sync {
    fn handle(&self, report: &IncomingReport) -> anyhow::Result<()>;
}

impl<F> ReportHandler for F
where
    F: Fn(&IncomingReport) -> anyhow::Result<()> + Send + Sync,
{
    fn handle(&self, report: &IncomingReport) -> anyhow::Result<()> {
        self(report)
    }
}

// ── Built-in filters ──────────────────────────────────────────────────────────

/// Schemes used by browser extensions injecting resources into pages.
pub const EXTENSION_PREFIXES: &[&str] = &[
    "safari-extension://",
    "safari-web-extension://",
    "moz-extension://",
    "chrome-extension://",
];

/// Drops violations caused by browser extensions, and bodies that are not JSON.
pub struct BrowserExtensionFilter;

impl ReportFilter for BrowserExtensionFilter {
    fn accept(&self, report: &IncomingReport) -> bool {
        let Ok(data) = serde_json::from_slice::<Value>(&report.body) else {
            return false;
        };
        let source_file = data
            .get(REPORT_KEY)
            .and_then(|r| r.get("source-file"))
            .and_then(Value::as_str)
            .unwrap_or("");
        !EXTENSION_PREFIXES.iter().any(|p| source_file.starts_with(p))
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// Identifier → hook map.
#[derive(Clone, Default)]
pub struct HookRegistry {
    filters: HashMap<String, Arc<dyn ReportFilter>>,
    handlers: HashMap<String, Arc<dyn ReportHandler>>,
}

impl HookRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in hooks.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_filter("browser_extensions", BrowserExtensionFilter);
        registry
    }

    pub fn register_filter(&mut self, name: impl Into<String>, filter: impl ReportFilter + 'static) {
        self.filters.insert(name.into(), Arc::new(filter));
    }

    pub fn register_handler(
        &mut self,
        name: impl Into<String>,
        handler: impl ReportHandler + 'static,
    ) {
        self.handlers.insert(name.into(), Arc::new(handler));
    }

    pub fn filter(&self, name: &str) -> Result<Arc<dyn ReportFilter>> {
        self.filters
            .get(name)
            .cloned()
            .ok_or_else(|| ReportsError::UnknownHook {
                kind: "filter",
                name: name.to_string(),
            })
    }

    pub fn handler(&self, name: &str) -> Result<Arc<dyn ReportHandler>> {
        self.handlers
            .get(name)
            .cloned()
            .ok_or_else(|| ReportsError::UnknownHook {
                kind: "handler",
                name: name.to_string(),
            })
    }

    /// Resolve handlers in the given order. Fails on the first unknown name.
    pub fn handlers<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<Arc<dyn ReportHandler>>> {
        names.iter().map(|n| self.handler(n.as_ref())).collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn with_source(source_file: &str) -> IncomingReport {
        let body = json!({"csp-report": {"source-file": source_file}}).to_string();
        IncomingReport::new(body, None)
    }

    #[test]
    fn extension_reports_are_dropped() {
        let filter = BrowserExtensionFilter;
        for prefix in EXTENSION_PREFIXES {
            assert!(!filter.accept(&with_source(&format!("{prefix}abcdef/inject.js"))), "{prefix}");
        }
    }

    #[test]
    fn page_reports_are_kept() {
        let filter = BrowserExtensionFilter;
        assert!(filter.accept(&with_source("https://example.com/app.js")));
        assert!(filter.accept(&IncomingReport::new(r#"{"csp-report": {}}"#, None)));
        assert!(filter.accept(&IncomingReport::new("{}", None)));
    }

    #[test]
    fn non_json_is_dropped() {
        assert!(!BrowserExtensionFilter.accept(&IncomingReport::new("NOT_A_JSON", None)));
    }

    #[test]
    fn registry_resolves_in_order() {
        let mut registry = HookRegistry::with_builtins();
        registry.register_handler("a", |_: &IncomingReport| -> anyhow::Result<()> { Ok(()) });
        registry.register_handler("b", |_: &IncomingReport| -> anyhow::Result<()> {
            anyhow::bail!("boom")
        });

        let resolved = registry.handlers(&["b", "a"]).unwrap();
        let report = IncomingReport::default();
        assert!(resolved[0].handle(&report).is_err());
        assert!(resolved[1].handle(&report).is_ok());
        assert!(registry.filter("browser_extensions").is_ok());
    }

    #[test]
    fn unknown_identifiers_are_errors() {
        let registry = HookRegistry::with_builtins();
        assert!(matches!(
            registry.handlers(&["missing"]),
            Err(ReportsError::UnknownHook { kind: "handler", .. })
        ));
        assert!(matches!(
            registry.filter("missing"),
            Err(ReportsError::UnknownHook { kind: "filter", .. })
        ));
    }
}
