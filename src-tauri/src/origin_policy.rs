use std::net::IpAddr;
use url::Url;

fn same_origin(left: &Url, right: &Url) -> bool {
    left.scheme() == right.scheme()
        && left.host_str() == right.host_str()
        && left.port_or_known_default() == right.port_or_known_default()
}

fn is_loopback_host(host: Option<&str>) -> bool {
    match host {
        Some("localhost") => true,
        Some(raw) => raw
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<IpAddr>()
            .is_ok_and(|ip| ip.is_loopback()),
        None => false,
    }
}

/// Pages served from the app bundle itself (the loading page).
pub fn is_bundled_page(page_url: &Url) -> bool {
    match page_url.scheme() {
        "tauri" => true,
        "http" | "https" => page_url.host_str() == Some("tauri.localhost"),
        _ => false,
    }
}

/// Whether `page_url` is served by `trusted`: same origin, or both on
/// loopback over http(s) with the same port (`localhost` vs `127.0.0.1`).
pub fn shares_trusted_origin(trusted: &Url, page_url: &Url) -> bool {
    if same_origin(trusted, page_url) {
        return true;
    }
    if !matches!(trusted.scheme(), "http" | "https") || !matches!(page_url.scheme(), "http" | "https")
    {
        return false;
    }
    is_loopback_host(trusted.host_str())
        && is_loopback_host(page_url.host_str())
        && trusted.port_or_known_default() == page_url.port_or_known_default()
}

pub fn is_trusted_page(trusted_origins: &[Url], page_url: &Url) -> bool {
    is_bundled_page(page_url)
        || trusted_origins
            .iter()
            .any(|trusted| shares_trusted_origin(trusted, page_url))
}

const LOOPBACK_ALIASES: [&str; 3] = ["127.0.0.1", "localhost", "[::1]"];

/// Serialized origins (`scheme://host[:port]`) a page may report through
/// `location.origin` and still count as trusted. Loopback origins expand to
/// every loopback alias on the same port.
pub fn trusted_origin_strings(trusted_origins: &[Url]) -> Vec<String> {
    let mut origins: Vec<String> = Vec::new();
    let mut push = |candidate: &Url| {
        let serialized = candidate.origin().ascii_serialization();
        if serialized != "null" && !origins.contains(&serialized) {
            origins.push(serialized);
        }
    };
    for trusted in trusted_origins {
        push(trusted);
        if !matches!(trusted.scheme(), "http" | "https") || !is_loopback_host(trusted.host_str()) {
            continue;
        }
        for alias in LOOPBACK_ALIASES {
            let mut candidate = trusted.clone();
            if candidate.set_host(Some(alias)).is_ok() {
                push(&candidate);
            }
        }
    }
    origins
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(raw: &str) -> Url {
        Url::parse(raw).expect("parse url")
    }

    #[test]
    fn same_origin_page_is_trusted() {
        assert!(shares_trusted_origin(
            &url("http://127.0.0.1:8000/"),
            &url("http://127.0.0.1:8000/chat?id=1")
        ));
    }

    #[test]
    fn loopback_aliases_with_same_port_are_trusted() {
        assert!(shares_trusted_origin(
            &url("http://localhost:3000/"),
            &url("http://127.0.0.1:3000/index")
        ));
        assert!(shares_trusted_origin(
            &url("http://127.0.0.1:8000/"),
            &url("http://[::1]:8000/")
        ));
    }

    #[test]
    fn different_port_or_remote_host_is_untrusted() {
        let backend = url("http://127.0.0.1:8000/");
        assert!(!shares_trusted_origin(&backend, &url("http://localhost:3000/")));
        assert!(!shares_trusted_origin(&backend, &url("http://example.com:8000/")));
    }

    #[test]
    fn non_http_scheme_is_untrusted() {
        assert!(!shares_trusted_origin(
            &url("ws://127.0.0.1:8000"),
            &url("http://127.0.0.1:8000")
        ));
    }

    #[test]
    fn trusted_origin_strings_expand_loopback_only() {
        let origins = trusted_origin_strings(&[
            url("http://localhost:3000/app"),
            url("https://example.com/"),
        ]);
        assert_eq!(
            origins,
            vec![
                "http://localhost:3000",
                "http://127.0.0.1:3000",
                "http://[::1]:3000",
                "https://example.com",
            ]
        );
    }

    #[test]
    fn bundled_loading_page_is_trusted() {
        assert!(is_trusted_page(&[], &url("tauri://localhost/index.html")));
        assert!(is_trusted_page(&[], &url("http://tauri.localhost/index.html")));
        assert!(!is_trusted_page(&[], &url("https://example.com/")));
    }
}
