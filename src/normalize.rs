// SPDX-License-Identifier: EUPL-1.2

//! Turns untrusted report payloads into [`ViolationReport`] records.
//!
//! Nothing here fails. Bad UTF-8, bad JSON, a missing `csp-report` object or
//! a field of the wrong type all produce a report with fewer fields set and,
//! where a CSP 1.0 field is missing, `is_valid = false`. The raw payload is
//! always kept.

use serde::Serialize;
use serde_json::{ser::PrettyFormatter, Map, Value};

use crate::fields::{required_fields, REPORT_FIELDS};
use crate::models::ViolationReport;

/// Top-level key holding the report fields.
pub const REPORT_KEY: &str = "csp-report";

/// Decode a request body as UTF-8.
///
/// Invalid bytes are replaced; the `Err` side carries that lossy text so the
/// caller can still keep it.
pub fn decode_payload(payload: &[u8]) -> Result<&str, String> {
    std::str::from_utf8(payload).map_err(|e| {
        tracing::debug!("CSP report is not valid UTF-8: {e}");
        String::from_utf8_lossy(payload).into_owned()
    })
}

/// Normalize a raw request body.
pub fn normalize(payload: &[u8], user_agent: Option<&str>) -> ViolationReport {
    let user_agent = user_agent.unwrap_or_default().to_string();

    let mut report = match decode_payload(payload) {
        Ok(text) => ViolationReport::from_message(text),
        Err(lossy) => ViolationReport::unparsed(lossy),
    };
    report.user_agent = user_agent;
    report
}

impl ViolationReport {
    /// Build a report from a JSON encoded CSP report message.
    ///
    /// An invalid message still yields as many fields as could be read.
    pub fn from_message(message: &str) -> Self {
        let mut report = Self::unparsed(message);

        let data: Value = match serde_json::from_str(message) {
            Ok(data) => data,
            Err(e) => {
                tracing::debug!("CSP report is not JSON: {e}");
                return report;
            }
        };
        let Some(fields) = data.get(REPORT_KEY).and_then(Value::as_object) else {
            tracing::debug!("JSON payload has no '{REPORT_KEY}' object");
            return report;
        };

        for spec in REPORT_FIELDS {
            if let Some(value) = fields.get(spec.wire_name).and_then(|v| spec.kind.coerce(v)) {
                report.assign(spec.field, value);
            }
        }
        report.is_valid = required_fields().all(|spec| report.has(spec.field));
        report
    }

    /// Human readable form of the original report.
    pub fn nice_report(&self) -> String {
        if self.raw_json.is_empty() {
            return "[no CSP report data]".into();
        }
        match serde_json::from_str::<Value>(&self.raw_json) {
            Err(_) => format!("Invalid CSP report: '{}'", self.raw_json),
            Ok(data) => match data.get(REPORT_KEY) {
                Some(fields) => pretty(fields),
                None => format!("Invalid CSP report: {}", pretty(&data)),
            },
        }
    }
}

/// Pretty print a report body for logs and mail.
///
/// Always returns: text that is not JSON is embedded verbatim in the result.
pub fn format_report(text: &str) -> String {
    match serde_json::from_str::<Value>(text) {
        Ok(data) => pretty(&data),
        Err(_) => format!("Invalid CSP report: '{text}'"),
    }
}

/// Sorted keys, four space indent.
fn pretty(value: &Value) -> String {
    let value = sort_keys(value.clone());
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    match value.serialize(&mut ser) {
        Ok(()) => String::from_utf8_lossy(&buf).into_owned(),
        Err(_) => value.to_string(),
    }
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let sorted: Map<String, Value> =
                entries.into_iter().map(|(k, v)| (k, sort_keys(v))).collect();
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Disposition;
    use serde_json::json;

    fn full_report(extra: Value) -> String {
        let mut fields = json!({
            "document-uri": "http://protected.example.cz/",
            "referrer": "http://referrer.example.cz/",
            "blocked-uri": "http://dangerous.example.cz/",
            "violated-directive": "Very protective directive.",
            "original-policy": "Nothing is allowed.",
        });
        if let (Some(target), Value::Object(extra)) = (fields.as_object_mut(), extra) {
            target.extend(extra);
        }
        json!({ "csp-report": fields }).to_string()
    }

    fn assert_no_fields(report: &ViolationReport) {
        assert_eq!(
            report,
            &ViolationReport {
                raw_json: report.raw_json.clone(),
                user_agent: report.user_agent.clone(),
                ..ViolationReport::default()
            }
        );
    }

    #[test]
    fn not_json() {
        let report = ViolationReport::from_message("NOT_A_JSON");
        assert!(!report.is_valid);
        assert_eq!(report.raw_json, "NOT_A_JSON");
        assert!(report.document_uri.is_none());
        assert_no_fields(&report);
    }

    #[test]
    fn json_without_report_object() {
        for message in ["{}", r#"{"document-uri": "http://example.com/"}"#, r#"{"csp-report": 1}"#, "[]"] {
            let report = ViolationReport::from_message(message);
            assert!(!report.is_valid, "{message}");
            assert_eq!(report.raw_json, message);
            assert_no_fields(&report);
        }
    }

    #[test]
    fn python_style_quotes_are_not_json() {
        let report = ViolationReport::from_message("{'csp-report': {}}");
        assert!(!report.is_valid);
        assert_eq!(report.raw_json, "{'csp-report': {}}");
    }

    #[test]
    fn empty_report_object() {
        let report = ViolationReport::from_message(r#"{"csp-report": {}}"#);
        assert!(!report.is_valid);
        assert_no_fields(&report);
    }

    #[test]
    fn partial_report_keeps_fields() {
        let message = json!({"csp-report": {
            "blocked-uri": "self",
            "violated-directive": "inline script base restriction",
            "line-number": 7,
        }})
        .to_string();
        let report = ViolationReport::from_message(&message);

        assert!(!report.is_valid);
        assert_eq!(report.raw_json, message);
        assert!(report.document_uri.is_none());
        assert_eq!(report.blocked_uri.as_deref(), Some("self"));
        assert_eq!(report.violated_directive.as_deref(), Some("inline script base restriction"));
        assert_eq!(report.line_number, Some(7));
    }

    #[test]
    fn valid_csp_1() {
        let message = full_report(json!({}));
        let report = ViolationReport::from_message(&message);

        assert!(report.is_valid);
        assert_eq!(report.raw_json, message);
        assert_eq!(report.document_uri.as_deref(), Some("http://protected.example.cz/"));
        assert_eq!(report.referrer.as_deref(), Some("http://referrer.example.cz/"));
        assert_eq!(report.blocked_uri.as_deref(), Some("http://dangerous.example.cz/"));
        assert_eq!(report.violated_directive.as_deref(), Some("Very protective directive."));
        assert_eq!(report.original_policy.as_deref(), Some("Nothing is allowed."));
        assert!(report.effective_directive.is_none());
    }

    #[test]
    fn valid_csp_2_plus() {
        let message = full_report(json!({
            "source-file": "nasty-script.js",
            "effective-directive": "script-src",
            "status-code": 200,
            "column-number": 12,
        }));
        let report = ViolationReport::from_message(&message);

        assert!(report.is_valid);
        assert_eq!(report.source_file.as_deref(), Some("nasty-script.js"));
        assert_eq!(report.effective_directive.as_deref(), Some("script-src"));
        assert_eq!(report.status_code, Some(200));
        assert_eq!(report.column_number, Some(12));
    }

    #[test]
    fn empty_strings_count_as_present() {
        let message = r#"{"csp-report":{"document-uri":"http://a/","referrer":"","blocked-uri":"","violated-directive":"d","original-policy":"p"}}"#;
        let report = ViolationReport::from_message(message);

        assert!(report.is_valid);
        assert_eq!(report.referrer.as_deref(), Some(""));
        assert_eq!(report.blocked_uri.as_deref(), Some(""));
    }

    #[test]
    fn null_required_field_is_missing() {
        let message = full_report(json!({ "referrer": null }));
        let report = ViolationReport::from_message(&message);
        assert!(!report.is_valid);
        assert!(report.referrer.is_none());
        assert!(report.document_uri.is_some());
    }

    #[test]
    fn each_missing_required_field_invalidates() {
        for missing in ["document-uri", "referrer", "blocked-uri", "violated-directive", "original-policy"] {
            let mut data: Value = serde_json::from_str(&full_report(json!({"source-file": "x.js"}))).unwrap();
            data["csp-report"].as_object_mut().unwrap().remove(missing);
            let report = ViolationReport::from_message(&data.to_string());

            assert!(!report.is_valid, "{missing}");
            assert_eq!(report.source_file.as_deref(), Some("x.js"));
        }
    }

    #[test]
    fn valid_line_number() {
        let report = ViolationReport::from_message(&full_report(json!({ "line-number": 666 })));
        assert!(report.is_valid);
        assert_eq!(report.line_number, Some(666));
    }

    #[test]
    fn negative_line_number_is_dropped() {
        let report = ViolationReport::from_message(&full_report(json!({ "line-number": -666 })));
        assert!(report.is_valid);
        assert!(report.line_number.is_none());
    }

    #[test]
    fn oversized_status_code_is_dropped() {
        let report = ViolationReport::from_message(&full_report(json!({ "status-code": 70000 })));
        assert!(report.is_valid);
        assert!(report.status_code.is_none());
    }

    #[test]
    fn valid_disposition() {
        let report = ViolationReport::from_message(&full_report(json!({ "disposition": "report" })));
        assert!(report.is_valid);
        assert_eq!(report.disposition, Some(Disposition::Report));
    }

    #[test]
    fn unknown_disposition_is_dropped() {
        let report = ViolationReport::from_message(&full_report(json!({ "disposition": "INVALID" })));
        assert!(report.is_valid);
        assert!(report.disposition.is_none());
    }

    #[test]
    fn bad_utf8_is_kept_lossy() {
        let payload = b"{\"csp-report\": \xff}";
        let report = normalize(payload, Some("Agent007"));
        assert!(!report.is_valid);
        assert_eq!(report.raw_json, String::from_utf8_lossy(payload));
        assert_eq!(report.user_agent, "Agent007");
        assert!(report.document_uri.is_none());
    }

    #[test]
    fn bad_utf8_with_valid_fields_is_still_invalid() {
        let mut payload = full_report(json!({})).into_bytes();
        payload.push(0xff);
        let report = normalize(&payload, None);
        assert!(!report.is_valid);
        assert!(report.document_uri.is_none());
    }

    #[test]
    fn decode_payload_flags_lossy_text() {
        assert_eq!(decode_payload(b"{}"), Ok("{}"));
        assert_eq!(decode_payload(b"a\xffb"), Err("a\u{fffd}b".to_string()));
    }

    #[test]
    fn normalize_attaches_user_agent() {
        let message = full_report(json!({}));
        assert_eq!(normalize(message.as_bytes(), Some("Agent007")).user_agent, "Agent007");
        assert_eq!(normalize(message.as_bytes(), None).user_agent, "");
        assert!(normalize(message.as_bytes(), None).is_valid);
    }

    #[test]
    fn nice_report_forms() {
        assert_eq!(ViolationReport::unparsed("").nice_report(), "[no CSP report data]");
        assert_eq!(
            ViolationReport::unparsed("Not a JSON").nice_report(),
            "Invalid CSP report: 'Not a JSON'"
        );
        assert_eq!(ViolationReport::unparsed("{}").nice_report(), "Invalid CSP report: {}");
        assert_eq!(
            ViolationReport::unparsed(r#"{"key": "value"}"#).nice_report(),
            "Invalid CSP report: {\n    \"key\": \"value\"\n}"
        );
        assert_eq!(ViolationReport::unparsed(r#"{"csp-report": {}}"#).nice_report(), "{}");
        assert_eq!(
            ViolationReport::unparsed(r#"{"csp-report": {"key": "value"}}"#).to_string(),
            "{\n    \"key\": \"value\"\n}"
        );
    }

    #[test]
    fn format_report_sorts_keys() {
        let formatted = format_report(r#"{"b": 1, "a": {"d": 2, "c": 3}}"#);
        assert_eq!(
            formatted,
            "{\n    \"a\": {\n        \"c\": 3,\n        \"d\": 2\n    },\n    \"b\": 1\n}"
        );
    }

    #[test]
    fn format_report_keeps_invalid_json_verbatim() {
        let invalid = r#"{"key": undefined_variable, nonsense here}"#;
        let formatted = format_report(invalid);
        assert!(formatted.contains(invalid));
        assert!(format_report("").contains("Invalid CSP report"));
    }
}
