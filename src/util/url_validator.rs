use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Reasons a feed URL is refused at registration time.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    #[error("URL has no host")]
    MissingHost,
    /// The URL points to a private/internal IP address.
    #[error("Private IP address not allowed: {0}")]
    PrivateIp(String),
    #[error("Localhost not allowed")]
    Localhost,
}

/// Validates a URL before it is stored as a feed source.
///
/// The aggregation loop fetches every stored URL unattended, so anything that
/// could point it at internal services is rejected up front: non-HTTP(S)
/// schemes, `localhost`, loopback, private, link-local and unspecified
/// addresses (IPv4 and IPv6).
///
/// # Examples
///
/// ```
/// use gator::util::validate_feed_url;
///
/// assert!(validate_feed_url("https://blog.boot.dev/index.xml").is_ok());
/// assert!(validate_feed_url("http://localhost/feed").is_err());
/// assert!(validate_feed_url("file:///etc/passwd").is_err());
/// ```
pub fn validate_feed_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str.trim())?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    let host = url.host_str().ok_or(UrlValidationError::MissingHost)?;
    if host.eq_ignore_ascii_case("localhost") {
        return Err(UrlValidationError::Localhost);
    }

    // IPv6 hosts come back bracketed
    let bare = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    if let Ok(ip) = bare.parse::<IpAddr>() {
        if ip.is_loopback() {
            return Err(UrlValidationError::Localhost);
        }
        if is_private_ip(&ip) {
            return Err(UrlValidationError::PrivateIp(ip.to_string()));
        }
    }

    Ok(url)
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_link_local() || v4.is_unspecified(),
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            // fc00::/7 unique local, fe80::/10 link-local
            v6.is_unspecified() || (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
        }
    }
}
