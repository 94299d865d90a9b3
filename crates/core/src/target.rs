//! Cache URL parsing shared by enqueue and probing.

use crate::Error;

/// Error type for unusable cache URLs.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("missing host: {0}")]
    MissingHost(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Parse and normalize a cache URL.
///
/// The queue stores the normalized form, so invalidation keys and probe
/// targets always agree. There is no scheme defaulting. Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Require an `http`/`https` scheme and a host
/// 3. Lowercase the host
/// 4. Remove fragment (#...), which is never sent anyway
/// 5. Keep path and query string intact
pub fn parse_target(input: &str) -> Result<url::Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let mut parsed = url::Url::parse(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    let host = parsed
        .host_str()
        .map(str::to_lowercase)
        .ok_or_else(|| UrlError::MissingHost(trimmed.to_string()))?;
    parsed
        .set_host(Some(&host))
        .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    parsed.set_fragment(None);

    Ok(parsed)
}

impl From<UrlError> for Error {
    fn from(err: UrlError) -> Self {
        match err {
            UrlError::Empty => Error::InvalidInput("identifier cannot be empty".into()),
            other => Error::InvalidUrl(other.to_string()),
        }
    }
}
