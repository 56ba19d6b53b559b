use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Errors that can occur during URL validation.
///
/// Service endpoints carry credentials in their headers, so anything that
/// could leak them in clear text over the network is refused.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// Plain http to a host that is not the local machine.
    #[error("Insecure URL: HTTPS required for {0} (http is only allowed for localhost)")]
    InsecureScheme(String),
    /// The URL has no host component.
    #[error("URL has no host")]
    MissingHost,
}

/// Validates a request target.
///
/// Accepts:
/// - `https://` URLs for any host
/// - `http://` URLs only when the host is `localhost` or a loopback address
///   (local test servers)
///
/// # Errors
///
/// Returns [`UrlValidationError`] if:
/// - The URL cannot be parsed ([`UrlValidationError::InvalidUrl`])
/// - The scheme is not `http` or `https` ([`UrlValidationError::UnsupportedScheme`])
/// - The URL has no host ([`UrlValidationError::MissingHost`])
/// - The scheme is `http` and the host is remote ([`UrlValidationError::InsecureScheme`])
///
/// # Examples
///
/// ```
/// use gdata::util::validate_target_url;
///
/// assert!(validate_target_url("https://www.google.com/m8/feeds").is_ok());
/// assert!(validate_target_url("http://127.0.0.1:8080/feeds").is_ok());
/// assert!(validate_target_url("http://www.google.com/m8/feeds").is_err());
/// assert!(validate_target_url("file:///etc/passwd").is_err());
/// ```
pub fn validate_target_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str)?;

    let secure = match url.scheme() {
        "https" => true,
        "http" => false,
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    };

    let host = url.host_str().ok_or(UrlValidationError::MissingHost)?;

    if !secure && !is_loopback_host(host) {
        return Err(UrlValidationError::InsecureScheme(host.to_owned()));
    }

    Ok(url)
}

fn is_loopback_host(host: &str) -> bool {
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }

    // Strip brackets from IPv6 addresses for parsing
    let host_for_parse = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    host_for_parse
        .parse::<IpAddr>()
        .map(|ip| ip.is_loopback())
        .unwrap_or(false)
}
