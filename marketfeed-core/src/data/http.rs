//! Shared blocking HTTP plumbing for the provider adapters.

use super::provider::DataError;
use reqwest::blocking::Client;
use serde_json::Value;
use std::time::Duration;

/// Default per-request timeout for upstream calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Build the client every adapter shares.
pub fn build_client(timeout: Duration) -> Result<Client, DataError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| DataError::NetworkUnreachable(format!("failed to build HTTP client: {e}")))
}

/// GET `url` with `query` and parse the body as JSON.
///
/// Non-2xx statuses are reported as a failure of `source_name`. The body is
/// parsed from text so providers that mislabel their content type still work.
pub fn get_json(
    client: &Client,
    source_name: &str,
    url: &str,
    query: &[(&str, String)],
) -> Result<Value, DataError> {
    let resp = client.get(url).query(query).send()?;
    let status = resp.status();
    if !status.is_success() {
        return Err(DataError::Source {
            source_name: source_name.to_string(),
            message: format!("HTTP {status}"),
        });
    }
    let body = resp.text()?;
    serde_json::from_str(&body).map_err(|e| {
        DataError::ResponseFormatChanged(format!("{source_name}: invalid JSON: {e}"))
    })
}
