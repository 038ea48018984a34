use crate::UrlError;
use url::{form_urlencoded, Url};

/// List of tracking query parameters to remove during normalization
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_eid"];

/// Normalizes a URL into the form used as its crawl identity
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Reject anything that is not HTTP or HTTPS
/// 3. Lowercase the host (the default port is dropped by the parser)
/// 4. Normalize path:
///    - Remove dot segments (. and ..) and empty segments
///    - Remove trailing slash (except for root /)
///    - Empty path becomes /
/// 5. Remove fragment (everything after #)
/// 6. Remove tracking query parameters
/// 7. Sort remaining query parameters by key; repeated keys keep their order
/// 8. Remove empty query string (trailing ?)
///
/// Query parameters are moved as written: their encoding is never changed,
/// so `?flag` stays `?flag` and `%20` is not rewritten to `+`.
///
/// Unlike some crawlers, the scheme and a `www.` prefix are preserved: they
/// are part of the origin that link filtering compares against.
///
/// # Examples
///
/// ```
/// use ripple_queue::url::normalize_url;
///
/// let url = normalize_url("http://EXAMPLE.COM:80/page/#top").unwrap();
/// assert_eq!(url.as_str(), "http://example.com/page");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;
    normalize_parsed(url)
}

/// Normalizes an already-parsed URL
pub fn normalize_parsed(mut url: Url) -> Result<Url, UrlError> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => {
            let lowered = host.to_lowercase();
            if lowered != host {
                url.set_host(Some(&lowered))
                    .map_err(|e| UrlError::Malformed(format!("Failed to set host: {}", e)))?;
            }
        }
        _ => return Err(UrlError::MissingHost),
    }

    let normalized_path = normalize_path(url.path());
    url.set_path(&normalized_path);

    url.set_fragment(None);

    if let Some(query) = url.query() {
        let query = filter_and_sort_query_params(query).join("&");

        if query.is_empty() {
            url.set_query(None);
        } else {
            url.set_query(Some(&query));
        }
    }

    Ok(url)
}

/// Normalizes a URL path by removing dot segments and trailing slashes
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

    format!("/{}", segments.join("/"))
}

/// Filters out tracking parameters and sorts the rest by raw key
///
/// Works on the raw `key=value` segments; the sort is stable, so values of a
/// repeated key stay in their original order.
fn filter_and_sort_query_params(query: &str) -> Vec<&str> {
    let mut params: Vec<&str> = query
        .split('&')
        .filter(|param| !param.is_empty())
        .filter(|param| !is_tracking_param(&decoded_key(param)))
        .collect();

    params.sort_by(|a, b| raw_key(a).cmp(raw_key(b)));
    params
}

fn raw_key(param: &str) -> &str {
    param.split_once('=').map_or(param, |(key, _)| key)
}

fn decoded_key(param: &str) -> String {
    form_urlencoded::parse(raw_key(param).as_bytes())
        .next()
        .map(|(key, _)| key.into_owned())
        .unwrap_or_default()
}

/// Checks if a query parameter is a tracking parameter
fn is_tracking_param(key: &str) -> bool {
    TRACKING_PARAMS.contains(&key) || key.starts_with("utm_")
}
