use url::Url;

/// Schemes that never point at an article page
const SKIPPED_PREFIXES: &[&str] = &["javascript:", "mailto:", "tel:", "data:"];

/// Resolves an href found on `base` to an absolute http(s) URL
///
/// Returns None if the link should be excluded:
/// - empty hrefs and same-page anchors
/// - javascript:, mailto:, tel: and data: links
/// - hrefs that do not join onto the base
/// - non-HTTP(S) URLs after resolution
pub fn resolve_link(href: &str, base: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if SKIPPED_PREFIXES.iter().any(|p| lower.starts_with(p)) {
        return None;
    }

    let absolute = base.join(href).ok()?;
    match absolute.scheme() {
        "http" | "https" => Some(absolute),
        _ => None,
    }
}
