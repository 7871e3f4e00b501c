//! Remote template URL normalization
//!
//! Stack events record where their templates came from. Sources are
//! normalized before storage: local `file://` URLs and non-http(s) schemes
//! are dropped silently, and raw GitHub content URLs are rewritten to
//! their browsable form.

use url::Url;

const RAW_GITHUB_HOST: &str = "raw.githubusercontent.com";
const GITHUB_HOST: &str = "github.com";

/// Normalize a list of remote template URLs
///
/// Order of the surviving entries is preserved.
pub fn normalize_remote_urls<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    raw.iter()
        .filter_map(|candidate| normalize_remote_url(candidate.as_ref()))
        .collect()
}

/// Normalize a single remote template URL, `None` when it is dropped
pub fn normalize_remote_url(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw).ok()?;
    match url.scheme() {
        "http" | "https" => {}
        _ => return None,
    }

    if url.host_str() == Some(RAW_GITHUB_HOST) {
        // raw.githubusercontent.com/<owner>/<repo>/<ref>/<path...>
        //   -> github.com/<owner>/<repo>/blob/<ref>/<path...>
        let segments: Vec<String> = url
            .path_segments()
            .map(|s| s.map(str::to_string).collect())
            .unwrap_or_default();
        if segments.len() >= 4 {
            let mut rewritten = vec![segments[0].clone(), segments[1].clone(), "blob".to_string(), segments[2].clone()];
            rewritten.extend_from_slice(&segments[3..]);
            url.set_host(Some(GITHUB_HOST)).ok()?;
            url.set_path(&rewritten.join("/"));
        }
    }

    Some(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_urls_are_dropped() {
        assert_eq!(normalize_remote_url("file:///tmp/template.yml"), None);
    }

    #[test]
    fn test_non_http_schemes_are_dropped() {
        assert_eq!(normalize_remote_url("ftp://example.com/t.yml"), None);
        assert_eq!(normalize_remote_url("not a url"), None);
    }

    #[test]
    fn test_raw_github_rewrites_to_blob_form() {
        let normalized = normalize_remote_url("https://raw.githubusercontent.com/o/r/main/f.yml");
        assert_eq!(
            normalized.as_deref(),
            Some("https://github.com/o/r/blob/main/f.yml")
        );
    }

    #[test]
    fn test_raw_github_with_nested_path() {
        let normalized =
            normalize_remote_url("https://raw.githubusercontent.com/owner/repo/v1.2/dir/sub/t.yml");
        assert_eq!(
            normalized.as_deref(),
            Some("https://github.com/owner/repo/blob/v1.2/dir/sub/t.yml")
        );
    }

    #[test]
    fn test_plain_https_is_preserved() {
        let normalized = normalize_remote_url("https://example.com/templates/t.yml");
        assert_eq!(normalized.as_deref(), Some("https://example.com/templates/t.yml"));
    }

    #[test]
    fn test_list_filtering_keeps_order() {
        let input = [
            "file:///x",
            "https://raw.githubusercontent.com/o/r/main/f.yml",
            "https://example.com/a.yml",
        ];
        assert_eq!(
            normalize_remote_urls(&input),
            vec![
                "https://github.com/o/r/blob/main/f.yml".to_string(),
                "https://example.com/a.yml".to_string(),
            ]
        );
    }
}
