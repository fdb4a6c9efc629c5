use std::time::Duration;
use url::Url;

/// Classify an input line as a URL. The target must contain a scheme
/// separator and parse as an absolute URI with a non-empty scheme;
/// everything else is treated as a host.
pub fn is_url(target: &str) -> bool {
    if !target.contains("://") {
        return false;
    }
    Url::parse(target).is_ok()
}

pub fn has_supported_scheme(target: &str) -> bool {
    match Url::parse(target) {
        Ok(u) => matches!(u.scheme(), "http" | "https"),
        Err(_) => false,
    }
}

/// Default port string for a scheme, used when the URL carries none.
pub fn default_port(scheme: &str) -> &'static str {
    if scheme == "https" {
        "443"
    } else {
        "80"
    }
}

/// Deterministic slug for per-page artifact files, derived from the URL as
/// `{protocol}__{host}__{port}` with non-alphanumerics replaced.
pub fn base_filename(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let scheme = parsed.scheme();
    let port = parsed
        .port()
        .map(|p| p.to_string())
        .unwrap_or_else(|| default_port(scheme).to_string());

    let slug = format!("{scheme}__{host}__{port}");
    Some(
        slug.chars()
            .map(|c| match c {
                c if c.is_ascii_alphanumeric() || c == '_' => c,
                _ => '_',
            })
            .collect(),
    )
}

pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    let millis = duration.subsec_millis();

    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else if seconds > 0 {
        format!("{}.{}s", seconds, millis / 100)
    } else {
        format!("{millis}ms")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/"));
        assert!(is_url("http://example.com:8080/admin"));
        assert!(is_url("gopher://example.com"));
        assert!(!is_url("example.com"));
        assert!(!is_url("example.com:8080"));
        assert!(!is_url("just some text"));
    }

    #[test]
    fn test_has_supported_scheme() {
        assert!(has_supported_scheme("http://example.com/"));
        assert!(has_supported_scheme("https://example.com/"));
        assert!(!has_supported_scheme("gopher://example.com/"));
        assert!(!has_supported_scheme("example.com"));
    }

    #[test]
    fn test_base_filename() {
        assert_eq!(
            base_filename("https://example.com/"),
            Some("https__example_com__443".to_string())
        );
        assert_eq!(
            base_filename("http://example.com:8080/admin?q=1"),
            Some("http__example_com__8080".to_string())
        );
        assert_eq!(
            base_filename("http://sub.example.com/"),
            Some("http__sub_example_com__80".to_string())
        );
        assert_eq!(base_filename("not a url"), None);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(500)), "500ms");
        assert_eq!(format_duration(Duration::from_secs(5)), "5.0s");
        assert_eq!(format_duration(Duration::from_secs(65)), "1m 5s");
        assert_eq!(format_duration(Duration::from_secs(3665)), "1h 1m 5s");
    }
}
