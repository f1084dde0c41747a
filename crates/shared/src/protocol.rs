//! Realtime protocol constants and URL helpers.

/// Close code for an intentional close. Never triggers a reconnect.
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code reported when the peer's close frame carried no status.
pub const CLOSE_NO_STATUS: u16 = 1005;

/// Close code reported when the socket dropped without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Close code the server uses when the handshake cookie is missing or invalid.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

/// Notification stream path.
pub const NOTIFICATIONS_WS_PATH: &str = "/notifications/ws";

/// Online/streak tracking stream path.
pub const ONLINE_WS_PATH: &str = "/online/ws";

/// Default prefix of the versioned REST routes.
pub const API_V1_PREFIX: &str = "/api/v1";

/// Cookie carrying the access token. Sent implicitly on the handshake.
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

/// Whether a close code means "stop, do not reconnect".
pub fn is_normal_closure(code: u16) -> bool {
    code == CLOSE_NORMAL
}

/// Join a base URL and a path with exactly one slash between them.
pub fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://")
        || path.starts_with("https://")
        || path.starts_with("ws://")
        || path.starts_with("wss://")
    {
        return path.to_string();
    }
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

/// Convert an HTTP/HTTPS URL to WS/WSS, mirroring the origin's security.
///
/// Returns `None` for anything that is not an absolute http(s) or ws(s) URL.
pub fn http_to_ws(url: &str) -> Option<String> {
    if let Some(rest) = url.strip_prefix("https://") {
        Some(format!("wss://{rest}"))
    } else if let Some(rest) = url.strip_prefix("http://") {
        Some(format!("ws://{rest}"))
    } else if url.starts_with("ws://") || url.starts_with("wss://") {
        Some(url.to_string())
    } else {
        None
    }
}

/// Inverse of [`http_to_ws`]. Cookie jars only release `HttpOnly` cookies
/// for http(s) URLs, so the handshake looks cookies up under this form.
pub fn ws_to_http(url: &str) -> Option<String> {
    if let Some(rest) = url.strip_prefix("wss://") {
        Some(format!("https://{rest}"))
    } else if let Some(rest) = url.strip_prefix("ws://") {
        Some(format!("http://{rest}"))
    } else if url.starts_with("http://") || url.starts_with("https://") {
        Some(url.to_string())
    } else {
        None
    }
}

/// Build the realtime endpoint URL for an API origin.
pub fn ws_url(base_url: &str, path: &str) -> Option<String> {
    http_to_ws(&join_url(base_url, path))
}

/// Check if a host is a local/development address.
pub fn is_local_address(host: &str) -> bool {
    let host_part = host.split(':').next().unwrap_or(host);
    host_part == "localhost"
        || host_part == "127.0.0.1"
        || host_part == "0.0.0.0"
        || host_part.starts_with("192.168.")
        || host_part.starts_with("10.")
}

/// Normalize a bare host into an origin URL: `http` for local addresses,
/// `https` otherwise. Values that already carry a scheme are kept.
pub fn origin_for_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.contains("://") {
        host.to_string()
    } else if is_local_address(host) {
        format!("http://{host}")
    } else {
        format!("https://{host}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_mirrors_origin() {
        assert_eq!(
            ws_url("https://api.aeiouly.com", NOTIFICATIONS_WS_PATH).as_deref(),
            Some("wss://api.aeiouly.com/notifications/ws")
        );
        assert_eq!(
            ws_url("http://localhost:8000/", "online/ws").as_deref(),
            Some("ws://localhost:8000/online/ws")
        );
    }

    #[test]
    fn test_ws_to_http() {
        assert_eq!(
            ws_to_http("wss://api.aeiouly.com/online/ws").as_deref(),
            Some("https://api.aeiouly.com/online/ws")
        );
        assert_eq!(
            ws_to_http("ws://localhost:8000/notifications/ws").as_deref(),
            Some("http://localhost:8000/notifications/ws")
        );
        assert_eq!(ws_to_http("localhost/ws"), None);
    }

    #[test]
    fn test_relative_base_is_rejected() {
        assert_eq!(ws_url("/api", NOTIFICATIONS_WS_PATH), None);
        assert_eq!(http_to_ws("ftp://host/ws"), None);
    }

    #[test]
    fn test_join_keeps_absolute_path() {
        assert_eq!(join_url("http://a", "wss://b/ws"), "wss://b/ws");
        assert_eq!(join_url("http://a/", "/api/v1/auth/me"), "http://a/api/v1/auth/me");
    }

    #[test]
    fn test_origin_for_host() {
        assert_eq!(origin_for_host("localhost:8000"), "http://localhost:8000");
        assert_eq!(origin_for_host("192.168.1.4"), "http://192.168.1.4");
        assert_eq!(origin_for_host("aeiouly.com/"), "https://aeiouly.com");
        assert_eq!(origin_for_host("https://x.dev"), "https://x.dev");
    }

    #[test]
    fn test_only_1000_is_normal() {
        assert!(is_normal_closure(CLOSE_NORMAL));
        assert!(!is_normal_closure(CLOSE_ABNORMAL));
        assert!(!is_normal_closure(CLOSE_POLICY_VIOLATION));
        assert!(!is_normal_closure(1001));
    }
}
