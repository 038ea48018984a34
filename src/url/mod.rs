//! URL handling module for Ripple-Queue
//!
//! This module provides URL normalization (the identity used for
//! deduplication) and same-origin comparison.

mod normalize;

pub use normalize::{normalize_parsed, normalize_url};

use url::Url;

/// Returns true if two URLs share scheme, host, and port
///
/// Ports are compared after default-port resolution, so
/// `https://a.com` and `https://a.com:443` are the same origin.
///
/// # Examples
///
/// ```
/// use ripple_queue::url::same_origin;
/// use url::Url;
///
/// let base = Url::parse("https://a.com/page").unwrap();
/// assert!(same_origin(&base, &Url::parse("https://a.com:443/y").unwrap()));
/// assert!(!same_origin(&base, &Url::parse("http://a.com/y").unwrap()));
/// assert!(!same_origin(&base, &Url::parse("https://b.com/x").unwrap()));
/// ```
pub fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
        && a.host_str().map(str::to_ascii_lowercase) == b.host_str().map(str::to_ascii_lowercase)
        && a.port_or_known_default() == b.port_or_known_default()
}
