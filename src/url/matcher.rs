/// Checks if a domain matches a wildcard pattern
///
/// This function supports two types of patterns:
/// 1. Exact match: "example.com" matches only "example.com"
/// 2. Wildcard match: "*.example.com" matches:
///    - "example.com" (the bare domain)
///    - "blog.example.com" (single subdomain)
///    - "api.v2.example.com" (nested subdomains)
///
/// Patterns are compared case-insensitively.
///
/// # Examples
///
/// ```
/// use leasecrawl::url::matches_wildcard;
///
/// assert!(matches_wildcard("example.com", "example.com"));
/// assert!(!matches_wildcard("example.com", "other.com"));
/// assert!(matches_wildcard("*.example.com", "blog.example.com"));
/// assert!(!matches_wildcard("*.example.com", "example.org"));
/// ```
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    let pattern = pattern.to_lowercase();
    if let Some(base) = pattern.strip_prefix("*.") {
        candidate == base || candidate.ends_with(&format!(".{}", base))
    } else {
        candidate == pattern
    }
}

/// Applies the allow/deny domain gate
///
/// A non-empty deny list containing the domain rejects it. Otherwise a
/// non-empty allow list that does not contain the domain rejects it.
/// Everything else is allowed.
///
/// # Examples
///
/// ```
/// use leasecrawl::url::is_domain_allowed;
///
/// let allow = vec!["example.com".to_string()];
/// let deny = vec!["bad.example.com".to_string()];
/// assert!(is_domain_allowed("example.com", &allow, &deny));
/// assert!(!is_domain_allowed("other.com", &allow, &deny));
/// assert!(is_domain_allowed("anything.org", &[], &[]));
/// ```
pub fn is_domain_allowed(domain: &str, allow: &[String], deny: &[String]) -> bool {
    if deny.iter().any(|pattern| matches_wildcard(pattern, domain)) {
        return false;
    }
    if !allow.is_empty() && !allow.iter().any(|pattern| matches_wildcard(pattern, domain)) {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_exact_match() {
        assert!(matches_wildcard("example.com", "example.com"));
        assert!(matches_wildcard("blog.example.com", "blog.example.com"));
    }

    #[test]
    fn test_exact_no_match() {
        assert!(!matches_wildcard("example.com", "other.com"));
        assert!(!matches_wildcard("example.com", "blog.example.com"));
        assert!(!matches_wildcard("blog.example.com", "example.com"));
    }

    #[test]
    fn test_wildcard_match() {
        assert!(matches_wildcard("*.example.com", "example.com"));
        assert!(matches_wildcard("*.example.com", "a.b.example.com"));
        assert!(!matches_wildcard("*.example.com", "notexample.com"));
    }

    #[test]
    fn test_pattern_case_insensitive() {
        assert!(matches_wildcard("Example.COM", "example.com"));
    }

    #[test]
    fn test_allow_and_deny_lists() {
        let allow = list(&["example.com", "foo.com"]);
        let deny = list(&["deny.com"]);

        assert!(is_domain_allowed("example.com", &allow, &deny));
        assert!(!is_domain_allowed("deny.com", &allow, &deny));
        assert!(!is_domain_allowed("bar.com", &allow, &deny));
    }

    #[test]
    fn test_deny_wins_over_allow() {
        let allow = list(&["example.com"]);
        let deny = list(&["example.com"]);
        assert!(!is_domain_allowed("example.com", &allow, &deny));
    }

    #[test]
    fn test_empty_lists_allow_everything() {
        assert!(is_domain_allowed("anything.net", &[], &[]));
    }

    #[test]
    fn test_deny_only() {
        let deny = list(&["*.tracker.io"]);
        assert!(!is_domain_allowed("cdn.tracker.io", &[], &deny));
        assert!(is_domain_allowed("example.com", &[], &deny));
    }
}
