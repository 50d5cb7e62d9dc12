//! Fetching a page and reducing it to plain text for the audit prompt.

use regex::Regex;
use std::sync::OnceLock;
use url::Url;

use super::AuditError;

/// Title and visible text of a fetched page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSnapshot {
    pub title: String,
    pub text: String,
}

fn title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<title>(.*?)</title>").expect("valid title regex"))
}

fn script_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script>").expect("valid script regex"))
}

fn style_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<style\b[^>]*>.*?</style>").expect("valid style regex"))
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("valid tag regex"))
}

/// Turn user input into a fetchable URL. Bare hosts get `https://`.
pub fn normalize_url(raw: &str) -> Result<Url, AuditError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(AuditError::InvalidUrl(raw.to_string()));
    }
    let candidate = if raw.starts_with("http") {
        raw.to_string()
    } else {
        format!("https://{}", raw)
    };

    let url = Url::parse(&candidate).map_err(|_| AuditError::InvalidUrl(raw.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(AuditError::InvalidUrl(raw.to_string()));
    }
    Ok(url)
}

/// Extract the `<title>` (falling back to `fallback_title`) and the page text,
/// cut to `max_chars` characters.
///
/// Markup is replaced by spaces, not collapsed; the model copes with the noise.
pub fn extract_page(html: &str, fallback_title: &str, max_chars: usize) -> PageSnapshot {
    let title = title_re()
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .filter(|t| !t.is_empty())
        .unwrap_or(fallback_title)
        .to_string();

    let without_scripts = script_re().replace_all(html, "");
    let without_styles = style_re().replace_all(&without_scripts, "");
    let text = tag_re().replace_all(&without_styles, " ");

    PageSnapshot {
        title,
        text: text.chars().take(max_chars).collect(),
    }
}

/// Fetch `url` and return its body as text. The status code is not checked;
/// error pages are audited like any other page.
pub async fn fetch_html(client: &reqwest::Client, url: &Url) -> Result<String, AuditError> {
    let response = client.get(url.clone()).send().await?;
    let status = response.status();
    if !status.is_success() {
        tracing::debug!(url = %url, status = %status, "Audited page returned non-success status");
    }
    Ok(response.text().await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_url_adds_scheme() {
        assert_eq!(normalize_url("example.com").unwrap().as_str(), "https://example.com/");
        assert_eq!(
            normalize_url(" http://example.com/about ").unwrap().as_str(),
            "http://example.com/about"
        );
    }

    #[test]
    fn test_normalize_url_rejects_garbage() {
        assert!(matches!(normalize_url(""), Err(AuditError::InvalidUrl(_))));
        assert!(matches!(normalize_url("https://"), Err(AuditError::InvalidUrl(_))));
        assert!(matches!(normalize_url("not a url"), Err(AuditError::InvalidUrl(_))));
    }

    #[test]
    fn test_extract_page_strips_markup() {
        let html = r#"<html><head><TITLE>Acme Studio</TITLE>
            <style type="text/css">body { color: red; }</style>
            <script>var tracking = "<b>not text</b>";</script></head>
            <body><h1>We build brands</h1><p>Call us</p></body></html>"#;
        let page = extract_page(html, "acme.io", 10_000);
        assert_eq!(page.title, "Acme Studio");
        assert!(page.text.contains("We build brands"));
        assert!(page.text.contains("Call us"));
        assert!(!page.text.contains("tracking"));
        assert!(!page.text.contains("color: red"));
        assert!(!page.text.contains('<'));
    }

    #[test]
    fn test_extract_page_title_fallback() {
        let page = extract_page("<p>No head here</p>", "acme.io", 100);
        assert_eq!(page.title, "acme.io");

        // Titles spanning lines do not match, as with a single-line pattern.
        let page = extract_page("<title>Acme\nStudio</title>", "acme.io", 100);
        assert_eq!(page.title, "acme.io");
    }

    #[test]
    fn test_extract_page_truncates_by_chars() {
        let html = "é".repeat(50);
        let page = extract_page(&html, "x", 10);
        assert_eq!(page.text.chars().count(), 10);
    }
}
