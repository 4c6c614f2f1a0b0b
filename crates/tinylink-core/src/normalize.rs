//! URL validation and normalization.
//!
//! Every original URL passes through [`normalize_url`] before it is used as a
//! cache key or checked against the store, so that spellings a user would
//! consider identical share a single mapping.

use crate::error::{CoreError, Result};
use url::Url;

/// Maximum accepted length of an original URL, in characters.
pub const MAX_URL_LENGTH: usize = 2048;

/// Validates that `raw` is an absolute http(s) URL with a non-empty host.
pub fn validate_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CoreError::InvalidUrl("URL cannot be empty".to_string()));
    }

    if trimmed.chars().count() > MAX_URL_LENGTH {
        return Err(CoreError::InvalidUrl(format!(
            "URL exceeds maximum length of {MAX_URL_LENGTH}"
        )));
    }

    let url = Url::parse(trimmed)
        .map_err(|e| CoreError::InvalidUrl(format!("malformed URL '{trimmed}': {e}")))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(CoreError::InvalidUrl(format!(
            "URL scheme must be http or https: {}",
            url.scheme()
        )));
    }

    if url.host_str().is_none_or(|host| host.trim().is_empty()) {
        return Err(CoreError::InvalidUrl(format!(
            "URL must have a host: {trimmed}"
        )));
    }

    Ok(url)
}

/// Returns `true` if `raw` passes [`validate_url`].
pub fn is_valid_url(raw: &str) -> bool {
    validate_url(raw).is_ok()
}

/// Validates `raw` and returns its canonical form.
///
/// Scheme and host are lowercased and default ports dropped (by the parser),
/// the fragment is removed, trailing slashes are trimmed from the path, and a
/// bare origin is rendered without its trailing `/`. The canonical form is
/// percent-encoded, so it is checked against [`MAX_URL_LENGTH`] again.
pub fn normalize_url(raw: &str) -> Result<String> {
    let mut url = validate_url(raw)?;
    url.set_fragment(None);

    if url.path().len() > 1 && url.path().ends_with('/') {
        let path = url.path().trim_end_matches('/').to_owned();
        url.set_path(&path);
    }

    let is_bare_origin = url.path() == "/" && url.query().is_none();
    let mut normalized = String::from(url);
    if is_bare_origin && normalized.ends_with('/') {
        normalized.pop();
    }

    if normalized.len() > MAX_URL_LENGTH {
        return Err(CoreError::InvalidUrl(format!(
            "normalized URL exceeds maximum length of {MAX_URL_LENGTH}"
        )));
    }

    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_http_and_https() {
        assert!(is_valid_url("https://example.com/a"));
        assert!(is_valid_url("http://example.com"));
        assert!(is_valid_url("https://sub.example.co.uk:8443/path?q=1"));
    }

    #[test]
    fn rejects_empty_and_blank() {
        assert!(matches!(validate_url(""), Err(CoreError::InvalidUrl(_))));
        assert!(matches!(validate_url("   "), Err(CoreError::InvalidUrl(_))));
    }

    #[test]
    fn rejects_other_schemes() {
        assert!(!is_valid_url("ftp://example.com/file"));
        assert!(!is_valid_url("javascript:alert(1)"));
        assert!(!is_valid_url("mailto:someone@example.com"));
    }

    #[test]
    fn rejects_relative_and_garbage() {
        assert!(!is_valid_url("not-a-valid-url"));
        assert!(!is_valid_url("/just/a/path"));
        assert!(!is_valid_url("https://"));
    }

    #[test]
    fn rejects_overlong_urls() {
        let url = format!("https://example.com/{}", "a".repeat(MAX_URL_LENGTH));
        assert!(!is_valid_url(&url));
    }

    #[test]
    fn length_limit_counts_characters() {
        // 1120 characters, 2220 bytes.
        let url = format!("https://example.com/{}", "é".repeat(1100));
        assert!(is_valid_url(&url));
    }

    #[test]
    fn rejects_urls_that_grow_past_the_limit_when_encoded() {
        // Each 'é' becomes "%C3%A9".
        let url = format!("https://example.com/{}", "é".repeat(700));
        assert!(is_valid_url(&url));
        assert!(matches!(normalize_url(&url), Err(CoreError::InvalidUrl(_))));

        let fits = format!("https://example.com/{}", "é".repeat(300));
        let normalized = normalize_url(&fits).unwrap();
        assert!(normalized.len() <= MAX_URL_LENGTH);
        assert!(normalized.ends_with("%C3%A9"));
    }

    #[test]
    fn normalization_is_identity_for_canonical_urls() {
        assert_eq!(
            normalize_url("https://example.com/a").unwrap(),
            "https://example.com/a"
        );
        assert_eq!(
            normalize_url("https://example.com/a?x=1&y=2").unwrap(),
            "https://example.com/a?x=1&y=2"
        );
    }

    #[test]
    fn normalization_folds_case_and_default_port() {
        assert_eq!(
            normalize_url("HTTPS://Example.COM:443/Path").unwrap(),
            "https://example.com/Path"
        );
        assert_eq!(
            normalize_url("http://example.com:80/").unwrap(),
            "http://example.com"
        );
    }

    #[test]
    fn normalization_trims_slashes_and_fragment() {
        assert_eq!(
            normalize_url("  https://example.com/a/  ").unwrap(),
            "https://example.com/a"
        );
        assert_eq!(
            normalize_url("https://example.com/a//#section").unwrap(),
            "https://example.com/a"
        );
        assert_eq!(
            normalize_url("https://example.com/").unwrap(),
            normalize_url("https://example.com").unwrap()
        );
    }

    #[test]
    fn normalization_keeps_query_on_root() {
        assert_eq!(
            normalize_url("https://example.com/?q=1").unwrap(),
            "https://example.com/?q=1"
        );
    }
}
