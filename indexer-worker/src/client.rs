//! Plumbing shared by the clients of the source system and the search engine.
use std::time;

use reqwest::header;
use url::Url;

/// Build an HTTP client with a bounded timeout for every request, connect included.
pub fn build_client(request_timeout: time::Duration) -> reqwest::Result<reqwest::Client> {
    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        header::HeaderValue::from_static("application/json"),
    );

    reqwest::Client::builder()
        .default_headers(headers)
        .user_agent("talk-indexer-worker")
        .timeout(request_timeout)
        .build()
}

/// Append `segments` to the path of `base`, escaping each one.
/// Returns `None` if `base` cannot be a base URL (e.g. `mailto:` URLs).
pub fn endpoint(base: &Url, segments: &[&str]) -> Option<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .ok()?
        .pop_if_empty()
        .extend(segments);

    Some(url)
}

/// Basic credentials, only if both a username and a password are set to something.
pub fn basic_credentials<'a>(
    username: &'a Option<String>,
    password: &'a Option<String>,
) -> Option<(&'a str, &'a str)> {
    match (username.as_deref(), password.as_deref()) {
        (Some(username), Some(password)) if !username.is_empty() && !password.is_empty() => {
            Some((username, password))
        }
        _ => None,
    }
}

/// Attach basic auth to a request when credentials are configured.
pub fn with_credentials(
    request: reqwest::RequestBuilder,
    username: &Option<String>,
    password: &Option<String>,
) -> reqwest::RequestBuilder {
    match basic_credentials(username, password) {
        Some((username, password)) => request.basic_auth(username, Some(password)),
        None => request,
    }
}
