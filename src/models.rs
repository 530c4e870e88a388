// SPDX-License-Identifier: EUPL-1.2

//! Domain models for CSP Reports.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{
    encode::IsNull,
    error::BoxDynError,
    postgres::{PgArgumentBuffer, PgTypeInfo, PgValueRef},
    Decode, Encode, Postgres, Type,
};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::fields::{FieldValue, ReportField};

/// CSP 3.0 disposition of the violated policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    Enforce,
    Report,
}

impl Disposition {
    pub const ALL: [Disposition; 2] = [Disposition::Enforce, Disposition::Report];

    pub const fn as_str(self) -> &'static str {
        match self {
            Disposition::Enforce => "enforce",
            Disposition::Report => "report",
        }
    }
}

impl FromStr for Disposition {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Disposition::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or(())
    }
}

// Stored as its `as_str` text in a `TEXT` column.
impl Type<Postgres> for Disposition {
    fn type_info() -> PgTypeInfo {
        <&str as Type<Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        <&str as Type<Postgres>>::compatible(ty)
    }
}

impl<'q> Encode<'q, Postgres> for Disposition {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> IsNull {
        <&str as Encode<Postgres>>::encode(self.as_str(), buf)
    }
}

impl<'r> Decode<'r, Postgres> for Disposition {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let text = <&str as Decode<Postgres>>::decode(value)?;
        text.parse()
            .map_err(|_| format!("unknown disposition in storage: {text}").into())
    }
}

/// A CSP violation report as produced by the normalizer.
///
/// `raw_json` is the payload exactly as received. Every other field is
/// derived from it and exists for querying and summaries only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct ViolationReport {
    /// Raw report body
    #[sqlx(rename = "json")]
    pub raw_json: String,
    /// `User-Agent` of the reporting browser, empty when absent
    pub user_agent: String,
    /// Whether all CSP 1.0 fields were present at creation time
    pub is_valid: bool,

    // CSP 1.0
    pub document_uri: Option<String>,
    pub referrer: Option<String>,
    pub blocked_uri: Option<String>,
    pub violated_directive: Option<String>,
    pub original_policy: Option<String>,

    // CSP 2.0
    pub effective_directive: Option<String>,
    pub source_file: Option<String>,
    pub status_code: Option<i16>,
    pub line_number: Option<i32>,
    pub column_number: Option<i32>,

    // CSP 3.0
    pub disposition: Option<Disposition>,
}

impl ViolationReport {
    /// A report holding nothing but its raw payload.
    pub fn unparsed(raw_json: impl Into<String>) -> Self {
        Self {
            raw_json: raw_json.into(),
            ..Self::default()
        }
    }

    /// Whether `field` holds a value.
    pub fn has(&self, field: ReportField) -> bool {
        match field {
            ReportField::DocumentUri => self.document_uri.is_some(),
            ReportField::Referrer => self.referrer.is_some(),
            ReportField::BlockedUri => self.blocked_uri.is_some(),
            ReportField::ViolatedDirective => self.violated_directive.is_some(),
            ReportField::OriginalPolicy => self.original_policy.is_some(),
            ReportField::EffectiveDirective => self.effective_directive.is_some(),
            ReportField::SourceFile => self.source_file.is_some(),
            ReportField::StatusCode => self.status_code.is_some(),
            ReportField::LineNumber => self.line_number.is_some(),
            ReportField::ColumnNumber => self.column_number.is_some(),
            ReportField::Disposition => self.disposition.is_some(),
        }
    }

    /// Store a coerced value. A value of the wrong shape for `field` is ignored.
    pub fn assign(&mut self, field: ReportField, value: FieldValue) {
        match (field, value) {
            (ReportField::DocumentUri, FieldValue::Text(s)) => self.document_uri = Some(s),
            (ReportField::Referrer, FieldValue::Text(s)) => self.referrer = Some(s),
            (ReportField::BlockedUri, FieldValue::Text(s)) => self.blocked_uri = Some(s),
            (ReportField::ViolatedDirective, FieldValue::Text(s)) => {
                self.violated_directive = Some(s)
            }
            (ReportField::OriginalPolicy, FieldValue::Text(s)) => self.original_policy = Some(s),
            (ReportField::EffectiveDirective, FieldValue::Text(s)) => {
                self.effective_directive = Some(s)
            }
            (ReportField::SourceFile, FieldValue::Text(s)) => self.source_file = Some(s),
            (ReportField::StatusCode, FieldValue::SmallInt(n)) => self.status_code = Some(n),
            (ReportField::LineNumber, FieldValue::Integer(n)) => self.line_number = Some(n),
            (ReportField::ColumnNumber, FieldValue::Integer(n)) => self.column_number = Some(n),
            (ReportField::Disposition, FieldValue::Text(s)) => self.disposition = s.parse().ok(),
            _ => {}
        }
    }
}

impl fmt::Display for ViolationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.nice_report())
    }
}

/// A persisted report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct StoredReport {
    pub id: Uuid,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub report: ViolationReport,
}

/// A report request as it arrived at the endpoint.
#[derive(Debug, Clone, Default)]
pub struct IncomingReport {
    pub body: Vec<u8>,
    pub user_agent: Option<String>,
}

impl IncomingReport {
    pub fn new(body: impl Into<Vec<u8>>, user_agent: Option<String>) -> Self {
        Self {
            body: body.into(),
            user_agent,
        }
    }

    /// Body as text, replacing invalid UTF-8 sequences.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
