use crate::{UrlError, UrlResult};
use sha2::{Digest, Sha256};
use url::form_urlencoded;
use url::Url;

/// Scheme assumed when the input carries none
const DEFAULT_SCHEME: &str = "https";

/// Normalizes a URL into its canonical comparison key
///
/// # Normalization Steps
///
/// 1. Trim surrounding whitespace
/// 2. Lowercase the scheme; default to `https` when absent
/// 3. Lowercase the host (a non-default port is kept)
/// 4. Path: empty becomes `/`; trailing slashes are stripped from non-root paths
/// 5. Query: parse key/value pairs (blank values kept), sort by `(key, value)`,
///    re-encode as `application/x-www-form-urlencoded`
/// 6. Drop the fragment
/// 7. Recompose as `scheme://host/path?query`, omitting `?` for an empty query
///
/// The output is a fixed point: `normalize_url(normalize_url(u)) == normalize_url(u)`.
///
/// # Examples
///
/// ```
/// use leasecrawl::url::normalize_url;
///
/// let url = normalize_url("HTTPS://Example.com/path/?b=2&a=1#frag").unwrap();
/// assert_eq!(url, "https://example.com/path?a=1&b=2");
/// ```
pub fn normalize_url(url_str: &str) -> UrlResult<String> {
    let url = parse_lenient(url_str)?;

    let host = url.host_str().ok_or(UrlError::MissingDomain)?;
    let mut authority = host.to_lowercase();
    if let Some(port) = url.port() {
        authority.push(':');
        authority.push_str(&port.to_string());
    }

    let path = normalize_path(url.path());

    let mut normalized = format!("{}://{}{}", url.scheme(), authority, path);

    if let Some(query) = url.query() {
        let sorted = sort_query(query);
        if !sorted.is_empty() {
            normalized.push('?');
            normalized.push_str(&sorted);
        }
    }

    Ok(normalized)
}

/// Computes the task identity hash of a URL
///
/// The URL is normalized first, so two spellings of the same resource share a hash.
pub fn url_hash(url_str: &str) -> UrlResult<String> {
    let normalized = normalize_url(url_str)?;
    Ok(hash_normalized(&normalized))
}

/// Hex-encoded SHA-256 of an already normalized URL
pub fn hash_normalized(normalized: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

/// Parses a URL, assuming `https` when no scheme is present
///
/// Only `http` and `https` are accepted.
pub(crate) fn parse_lenient(url_str: &str) -> UrlResult<Url> {
    let trimmed = url_str.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Parse("empty URL".to_string()));
    }

    let url = if trimmed.contains("://") {
        Url::parse(trimmed)
    } else {
        Url::parse(&format!("{}://{}", DEFAULT_SCHEME, trimmed.trim_start_matches('/')))
    }
    .map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    Ok(url)
}

/// Empty path becomes `/`; a non-root path loses its trailing slashes
fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Sorts query pairs by `(key, value)` and re-encodes them
fn sort_query(query: &str) -> String {
    let mut pairs: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    pairs.sort();

    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs.iter())
        .finish()
}
