use crate::UrlError;
use url::Url;

/// Query parameters that never change which article a URL points at
const TRACKING_PARAMS: &[&str] = &[
    "fbclid",
    "gclid",
    "mc_eid",
    "ref",
    "source",
];

/// Normalizes an item URL so that the same article always yields the same id
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed or not http(s)
/// 2. Lowercase the host
/// 3. Collapse repeated slashes and dot segments in the path
/// 4. Remove the fragment
/// 5. Remove tracking query parameters (`utm_*` and friends)
/// 6. Sort remaining query parameters, dropping an empty query
///
/// The scheme and any `www.` prefix are kept: archive hosts are fetched
/// exactly as linked.
///
/// # Examples
///
/// ```
/// use archive_harvester::url::normalize_url;
///
/// let url = normalize_url("https://News.Example/a//b/?utm_source=x#top").unwrap();
/// assert_eq!(url.as_str(), "https://news.example/a/b/");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or(UrlError::MissingDomain)?
        .to_lowercase();
    url.set_host(Some(&host))
        .map_err(|e| UrlError::Malformed(format!("Failed to set host: {}", e)))?;

    let normalized_path = normalize_path(url.path());
    url.set_path(&normalized_path);

    url.set_fragment(None);

    if url.query().is_some() {
        let params = filter_and_sort_query_params(&url);
        if params.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut()
                .clear()
                .extend_pairs(params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }
    }

    Ok(url)
}

/// Removes empty and dot segments, keeping a trailing slash when present
fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    if segments.is_empty() {
        return "/".to_string();
    }

    let mut result = format!("/{}", segments.join("/"));
    if path.ends_with('/') {
        result.push('/');
    }
    result
}

fn filter_and_sort_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    // Stable sort keeps repeated keys in their original order
    params.sort_by(|a, b| a.0.cmp(&b.0));
    params
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}
