//! Audit prompt and strict parsing of the model's answer.

use serde::Deserialize;

use super::{AuditError, AuditReport, Finding, FindingStatus, PageSnapshot};

/// Number of findings the model must return.
pub const FINDINGS_PER_REPORT: usize = 5;

pub fn build_prompt(page: &PageSnapshot) -> String {
    format!(
        r#"You are an expert digital agency auditor. Analyze the following website content and provide a professional audit.
Website Title: {title}
Website Content Snippet: {text}

Return ONLY a JSON object in this format:
{{
  "score": 0-100,
  "findings": [
    {{ "category": "SEO", "status": "success|warning|error", "title": "Brief title", "detail": "1-2 sentence explanation" }},
    {{ "category": "Conversion", "status": "success|warning|error", "title": "Brief title", "detail": "1-2 sentence explanation" }},
    {{ "category": "UX", "status": "success|warning|error", "title": "Brief title", "detail": "1-2 sentence explanation" }}
  ]
}}
Include exactly {count} high-value findings. Do not use markdown."#,
        title = page.title,
        text = page.text,
        count = FINDINGS_PER_REPORT,
    )
}

/// Remove markdown code fences the model tends to add despite being told not to.
pub fn strip_code_fences(text: &str) -> String {
    text.replace("```json", "").replace("```", "").trim().to_string()
}

#[derive(Debug, Deserialize)]
struct RawReport {
    score: i64,
    findings: Vec<RawFinding>,
}

#[derive(Debug, Deserialize)]
struct RawFinding {
    category: String,
    status: String,
    title: String,
    detail: String,
}

/// Parse and validate the model's answer.
///
/// Malformed JSON is [`AuditError::MalformedResponse`]; well-formed JSON that
/// breaks the report shape is [`AuditError::SchemaViolation`].
pub fn parse_report(answer: &str) -> Result<AuditReport, AuditError> {
    let cleaned = strip_code_fences(answer);
    let raw: RawReport = serde_json::from_str(&cleaned)
        .map_err(|e| AuditError::MalformedResponse(e.to_string()))?;

    if !(0..=100).contains(&raw.score) {
        return Err(AuditError::SchemaViolation(format!(
            "score {} is outside 0-100",
            raw.score
        )));
    }
    if raw.findings.len() != FINDINGS_PER_REPORT {
        return Err(AuditError::SchemaViolation(format!(
            "expected {} findings, got {}",
            FINDINGS_PER_REPORT,
            raw.findings.len()
        )));
    }

    let findings = raw
        .findings
        .into_iter()
        .enumerate()
        .map(|(i, f)| {
            let status = FindingStatus::parse(&f.status).ok_or_else(|| {
                AuditError::SchemaViolation(format!("finding {} has status `{}`", i, f.status))
            })?;
            if f.category.trim().is_empty() || f.title.trim().is_empty() {
                return Err(AuditError::SchemaViolation(format!(
                    "finding {} is missing a category or title",
                    i
                )));
            }
            Ok(Finding {
                category: f.category,
                status,
                title: f.title,
                detail: f.detail,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(AuditReport {
        score: raw.score as u8,
        findings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(score: i64, statuses: &[&str]) -> String {
        let findings: Vec<serde_json::Value> = statuses
            .iter()
            .enumerate()
            .map(|(i, s)| {
                serde_json::json!({
                    "category": "SEO",
                    "status": s,
                    "title": format!("Finding {}", i),
                    "detail": "Meta description is missing."
                })
            })
            .collect();
        serde_json::json!({ "score": score, "findings": findings }).to_string()
    }

    const FIVE: [&str; 5] = ["success", "warning", "error", "success", "warning"];

    #[test]
    fn test_prompt_embeds_page() {
        let page = PageSnapshot {
            title: "Acme Studio".to_string(),
            text: "We build brands".to_string(),
        };
        let prompt = build_prompt(&page);
        assert!(prompt.contains("Website Title: Acme Studio"));
        assert!(prompt.contains("Website Content Snippet: We build brands"));
        assert!(prompt.contains("exactly 5 high-value findings"));
        assert!(prompt.contains(r#""score": 0-100"#));
    }

    #[test]
    fn test_fenced_answer_parses() {
        let fenced = format!("```json\n{}\n```", answer(72, &FIVE));
        let report = parse_report(&fenced).unwrap();
        assert_eq!(report.score, 72);
        assert_eq!(report.findings.len(), 5);
        assert_eq!(report.findings[2].status, FindingStatus::Error);
    }

    #[test]
    fn test_not_json_is_malformed() {
        assert!(matches!(
            parse_report("Sure! Here is your audit."),
            Err(AuditError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_schema_violations() {
        assert!(matches!(
            parse_report(&answer(101, &FIVE)),
            Err(AuditError::SchemaViolation(_))
        ));
        assert!(matches!(
            parse_report(&answer(50, &FIVE[..3])),
            Err(AuditError::SchemaViolation(_))
        ));
        assert!(matches!(
            parse_report(&answer(50, &["success", "warning", "error", "success", "critical"])),
            Err(AuditError::SchemaViolation(_))
        ));
    }
}
