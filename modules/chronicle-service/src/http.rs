use reqwest::Client;
use std::time::Duration;

const USER_AGENT: &str = concat!("chronicle-service/", env!("CARGO_PKG_VERSION"));

/// Build the HTTP client shared by the Drive and GitHub clients.
///
/// `Client::clone()` is just an `Arc` increment, so both clients hold a clone
/// of the same connection pool. Every request is bounded by `timeout`.
pub fn build_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(USER_AGENT)
        .pool_max_idle_per_host(5)
        .pool_idle_timeout(Duration::from_secs(90))
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .timeout(timeout)
        .build()
}

/// Keep error bodies short enough for a log line or an error response
pub fn truncate_error(s: &str) -> &str {
    if s.len() <= 200 {
        return s;
    }
    let mut end = 200;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
