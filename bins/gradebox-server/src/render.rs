// Result document -> HTML report

use serde_json::Value;
use std::collections::BTreeMap;

use crate::templates::{escape_html, REPORT_STYLE};
use gradebox_common::types::{parse_object, WireError, REPORT_KEY, SUBMISSION_ID_KEY};

/// Render a stored result as a standalone HTML page.
///
/// Every top-level member that is an object with a string `report` is one
/// part; parts appear sorted by key, each under its own header. The report
/// fragments are trusted HTML produced by the grader and inserted as-is.
pub fn render_report(id: &str, result: &[u8]) -> Result<String, WireError> {
    let doc = parse_object(result)?;

    let parts: BTreeMap<&str, &str> = doc
        .iter()
        .filter(|(key, _)| key.as_str() != SUBMISSION_ID_KEY)
        .filter_map(|(key, value)| {
            value
                .get(REPORT_KEY)
                .and_then(Value::as_str)
                .map(|report| (key.as_str(), report))
        })
        .collect();

    let mut page = String::with_capacity(result.len() + 512);
    page.push_str("<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\">\n");
    page.push_str(&format!("<title>Report {}</title>\n", escape_html(id)));
    page.push_str(REPORT_STYLE);
    page.push_str("</head><body>\n");

    if parts.is_empty() {
        page.push_str(&format!(
            "<p>No checks were found in report {}.</p>\n",
            escape_html(id)
        ));
    }
    for (part, report) in parts {
        page.push_str(&format!("<h2>{}</h2>\n", escape_html(part)));
        page.push_str(report);
        page.push('\n');
    }

    page.push_str("</body></html>\n");
    Ok(page)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parts_are_sorted_with_headers() {
        let result = br#"{
            "submission_id": "S1",
            "ex2": {"report": "<p>second</p>"},
            "ex1": {"report": "<p>first</p>"}
        }"#;
        let page = render_report("S1", result).unwrap();

        let first = page.find("<p>first</p>").unwrap();
        let second = page.find("<p>second</p>").unwrap();
        assert!(first < second);
        assert!(page.contains("<h2>ex1</h2>"));
        assert!(page.contains("<h2>ex2</h2>"));
        assert!(!page.contains("<h2>submission_id</h2>"));
    }

    #[test]
    fn test_members_without_report_are_skipped() {
        let result = br#"{
            "submission_id": "S1",
            "ex1": {"report": "<p>ok</p>"},
            "ex2": {"score": 3},
            "ex3": {"report": 42},
            "ex4": "just a string"
        }"#;
        let page = render_report("S1", result).unwrap();
        assert!(page.contains("<p>ok</p>"));
        for skipped in ["ex2", "ex3", "ex4"] {
            assert!(!page.contains(&format!("<h2>{}</h2>", skipped)));
        }
    }

    #[test]
    fn test_no_parts_renders_message() {
        let page = render_report("S1", br#"{"submission_id":"S1"}"#).unwrap();
        assert!(page.contains("No checks were found in report S1"));
        assert!(!page.contains("<h2>"));
    }

    #[test]
    fn test_part_names_are_escaped() {
        let page = render_report("S1", br#"{"<b>":{"report":"x"}}"#).unwrap();
        assert!(page.contains("<h2>&lt;b&gt;</h2>"));
    }

    #[test]
    fn test_invalid_document() {
        assert!(render_report("S1", b"not json").is_err());
        assert!(render_report("S1", b"[1,2]").is_err());
    }
}
