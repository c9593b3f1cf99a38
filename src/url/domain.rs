use crate::url::normalize::parse_lenient;

/// Extracts the domain from a URL
///
/// The domain is the lowercase host, followed by `:port` when the URL names a
/// non-default port. This is the key used for rate limiting, robots caching and
/// the allow/deny gate. Returns `None` for unparseable or host-less URLs.
///
/// # Examples
///
/// ```
/// use leasecrawl::url::extract_domain;
///
/// assert_eq!(extract_domain("https://EXAMPLE.COM/path"), Some("example.com".to_string()));
/// assert_eq!(extract_domain("http://127.0.0.1:8080/"), Some("127.0.0.1:8080".to_string()));
/// ```
pub fn extract_domain(url: &str) -> Option<String> {
    let parsed = parse_lenient(url).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    match parsed.port() {
        Some(port) => Some(format!("{}:{}", host, port)),
        None => Some(host),
    }
}
