// SPDX-License-Identifier: EUPL-1.2

//! Wire ↔ column mapping for CSP report fields.
//!
//! [`REPORT_FIELDS`] is the only place that knows which `csp-report` key
//! feeds which column and how its value is coerced. The normalizer walks it
//! to extract fields and the Postgres repository uses [`ReportField::column`]
//! for its column list, so the two cannot drift apart.
//!
//! ## Tiers
//!
//! - CSP 1.0 fields ([`FieldKind::Text`]) - all five must be present for a
//!   report to be valid. An empty string counts as present.
//! - CSP 2.0 text fields ([`FieldKind::OptionalText`]).
//! - Integer fields ([`FieldKind::SmallInt`], [`FieldKind::Integer`]) - dropped
//!   when they are negative or do not fit the column type.
//! - CSP 3.0 `disposition` ([`FieldKind::Choice`]).

use serde_json::Value;

use crate::models::Disposition;

/// Accepted values of the `disposition` field.
pub const DISPOSITIONS: &[&str] = &[Disposition::Enforce.as_str(), Disposition::Report.as_str()];

/// An extracted column of a violation report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportField {
    DocumentUri,
    Referrer,
    BlockedUri,
    ViolatedDirective,
    OriginalPolicy,
    EffectiveDirective,
    SourceFile,
    StatusCode,
    LineNumber,
    ColumnNumber,
    Disposition,
}

impl ReportField {
    /// Storage column name.
    pub fn column(self) -> &'static str {
        match self {
            ReportField::DocumentUri => "document_uri",
            ReportField::Referrer => "referrer",
            ReportField::BlockedUri => "blocked_uri",
            ReportField::ViolatedDirective => "violated_directive",
            ReportField::OriginalPolicy => "original_policy",
            ReportField::EffectiveDirective => "effective_directive",
            ReportField::SourceFile => "source_file",
            ReportField::StatusCode => "status_code",
            ReportField::LineNumber => "line_number",
            ReportField::ColumnNumber => "column_number",
            ReportField::Disposition => "disposition",
        }
    }
}

/// How a raw JSON value becomes a column value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Required for validity. Any non-null value is accepted.
    Text,
    /// Same coercion as [`FieldKind::Text`], no effect on validity.
    OptionalText,
    /// Non-negative `SMALLINT`, from a JSON number or a numeric string.
    SmallInt,
    /// Non-negative `INTEGER`, from a JSON number or a numeric string.
    Integer,
    /// Exact string member of a closed set.
    Choice(&'static [&'static str]),
}

/// A successfully coerced value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    SmallInt(i16),
    Integer(i32),
}

impl FieldKind {
    /// Coerce `value` according to this kind. `None` means the field stays null.
    pub fn coerce(self, value: &Value) -> Option<FieldValue> {
        match self {
            FieldKind::Text | FieldKind::OptionalText => coerce_text(value).map(FieldValue::Text),
            FieldKind::SmallInt => non_negative(value).map(FieldValue::SmallInt),
            FieldKind::Integer => non_negative(value).map(FieldValue::Integer),
            FieldKind::Choice(choices) => value
                .as_str()
                .filter(|s| choices.contains(s))
                .map(|s| FieldValue::Text(s.to_string())),
        }
    }

    /// Whether a missing value makes the whole report invalid.
    pub fn is_required(self) -> bool {
        matches!(self, FieldKind::Text)
    }
}

fn coerce_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        // Keep whatever the browser sent rather than losing the field.
        other => Some(other.to_string()),
    }
}

fn non_negative<T>(value: &Value) -> Option<T>
where
    T: TryFrom<i64> + Default + PartialOrd,
{
    let n = match value {
        Value::Number(n) => n.as_i64()?,
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    T::try_from(n).ok().filter(|n| *n >= T::default())
}

/// One row of the coercion table.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// Key inside the `csp-report` object.
    pub wire_name: &'static str,
    pub field: ReportField,
    pub kind: FieldKind,
}

const fn spec(wire_name: &'static str, field: ReportField, kind: FieldKind) -> FieldSpec {
    FieldSpec { wire_name, field, kind }
}

/// Every extracted field, in column order.
pub const REPORT_FIELDS: &[FieldSpec] = &[
    // CSP 1.0
    spec("document-uri", ReportField::DocumentUri, FieldKind::Text),
    spec("referrer", ReportField::Referrer, FieldKind::Text),
    spec("blocked-uri", ReportField::BlockedUri, FieldKind::Text),
    spec("violated-directive", ReportField::ViolatedDirective, FieldKind::Text),
    spec("original-policy", ReportField::OriginalPolicy, FieldKind::Text),
    // CSP 2.0
    spec("effective-directive", ReportField::EffectiveDirective, FieldKind::OptionalText),
    spec("source-file", ReportField::SourceFile, FieldKind::OptionalText),
    spec("status-code", ReportField::StatusCode, FieldKind::SmallInt),
    spec("line-number", ReportField::LineNumber, FieldKind::Integer),
    spec("column-number", ReportField::ColumnNumber, FieldKind::Integer),
    // CSP 3.0
    spec("disposition", ReportField::Disposition, FieldKind::Choice(DISPOSITIONS)),
];

/// Table rows whose presence decides validity.
pub fn required_fields() -> impl Iterator<Item = &'static FieldSpec> {
    REPORT_FIELDS.iter().filter(|f| f.kind.is_required())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
