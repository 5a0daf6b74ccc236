//! URL helpers relative to the server base.

/// Absolute URL of `url` against `base`. Absolute inputs are returned as is.
///
/// # Examples
///
/// ```
/// use cohort_client::resolve_url;
///
/// assert_eq!(resolve_url("https://example.org/fhir/", "Patient?_count=1"), "https://example.org/fhir/Patient?_count=1");
/// assert_eq!(resolve_url("https://example.org/fhir", "https://other.org/x"), "https://other.org/x");
/// ```
pub fn resolve_url(base: &str, url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        return url.to_string();
    }
    let base = base.trim_end_matches('/');
    let path = url.trim_start_matches('/');
    if path.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, path)
    }
}

/// `url` relative to `base`, as batch entries expect it.
///
/// URLs outside the base are returned unchanged.
pub fn relative_url<'a>(base: &str, url: &'a str) -> &'a str {
    let base = base.trim_end_matches('/');
    match url.strip_prefix(base) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') || rest.starts_with('?') => {
            rest.trim_start_matches('/')
        }
        _ => url,
    }
}

/// Append `name=value` to the query string of `url`.
///
/// # Examples
///
/// ```
/// use cohort_client::append_query;
///
/// assert_eq!(append_query("Patient", "_count", "50"), "Patient?_count=50");
/// assert_eq!(append_query("Patient?gender=female", "_count", "50"), "Patient?gender=female&_count=50");
/// ```
pub fn append_query(url: &str, name: &str, value: &str) -> String {
    let separator = match url.find('?') {
        None => '?',
        Some(index) if index + 1 == url.len() || url.ends_with('&') => {
            return format!("{}{}={}", url, name, value);
        }
        Some(_) => '&',
    };
    format!("{}{}{}={}", url, separator, name, value)
}
