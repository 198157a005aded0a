use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::blocking::Client;
use reqwest::header::USER_AGENT;
use serde_json::Value;

const USER_AGENT_VALUE: &str = concat!("fpl_sync/", env!("CARGO_PKG_VERSION"));

pub fn build_http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .context("failed to build http client")
}

/// Best-effort GET returning parsed JSON. Non-2xx statuses are errors.
pub fn fetch_json(client: &Client, url: &str) -> Result<Value> {
    let resp = client
        .get(url)
        .header(USER_AGENT, USER_AGENT_VALUE)
        .send()
        .with_context(|| format!("request failed: {url}"))?;
    let status = resp.status();
    let body = resp.text().context("failed reading body")?;
    if !status.is_success() {
        return Err(anyhow!("http {}: {}", status, truncate(&body, 200)));
    }
    serde_json::from_str::<Value>(body.trim()).with_context(|| format!("invalid json from {url}"))
}

fn truncate(raw: &str, max: usize) -> &str {
    match raw.char_indices().nth(max) {
        Some((idx, _)) => &raw[..idx],
        None => raw,
    }
}
