use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use rand::Rng;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{info, warn};

const MAX_RETRIES: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
];

/// Build the long-lived HTTP client shared by every fetch in the run.
///
/// The User-Agent is picked once at startup, not per request.
pub fn build_client() -> Result<Client> {
    let ua = USER_AGENTS[rand::rng().random_range(0..USER_AGENTS.len())];
    let client = Client::builder()
        .user_agent(ua)
        .timeout(REQUEST_TIMEOUT)
        .build()?;
    Ok(client)
}

/// Fetch a URL as JSON with bounded retry.
///
/// Any transport error, timeout, or non-200 status counts as a failed attempt.
/// Returns `None` once the retry ceiling is exhausted; the page is treated as
/// lost for this run and the caller moves on.
pub async fn fetch_json(client: &Client, url: &str) -> Option<Value> {
    info!("Fetching URL: {}", url);
    with_retry(MAX_RETRIES, RETRY_DELAY, |_attempt| {
        let client = client.clone();
        let url = url.to_string();
        async move { fetch_once(&client, &url).await }
    })
    .await
}

async fn fetch_once(client: &Client, url: &str) -> Option<Value> {
    match client.get(url).send().await {
        Ok(resp) if resp.status() == StatusCode::OK => match resp.json::<Value>().await {
            Ok(payload) => Some(payload),
            Err(e) => {
                warn!("Invalid JSON body from {}: {}", url, e);
                None
            }
        },
        Ok(resp) => {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            warn!("Error {}: {}", status.as_u16(), truncate(&body, 100));
            None
        }
        Err(e) => {
            warn!("Request error: {}", e);
            None
        }
    }
}

/// Run `attempt_fn` up to `max_retries` times, sleeping `base_delay * attempt`
/// between attempts (none after the last).
pub(crate) async fn with_retry<T, F, Fut>(
    max_retries: u32,
    base_delay: Duration,
    mut attempt_fn: F,
) -> Option<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Option<T>>,
{
    for attempt in 1..=max_retries {
        if let Some(value) = attempt_fn(attempt).await {
            return Some(value);
        }
        if attempt < max_retries {
            let delay = base_delay * attempt;
            info!("Waiting {}s before retry...", delay.as_secs());
            tokio::time::sleep(delay).await;
        }
    }
    None
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn retry_ceiling_and_backoff_schedule() {
        let attempts = AtomicU32::new(0);
        let start = Instant::now();

        let result: Option<()> = with_retry(3, Duration::from_secs(5), |_| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { None }
        })
        .await;

        assert!(result.is_none());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        // 5s * 1 + 5s * 2, and no delay after the final attempt.
        assert_eq!(start.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn stops_retrying_on_success() {
        let attempts = AtomicU32::new(0);

        let result = with_retry(3, Duration::from_secs(5), |attempt| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async move { (attempt == 2).then_some(attempt) }
        })
        .await;

        assert_eq!(result, Some(2));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn first_attempt_success_sleeps_nowhere() {
        let result = with_retry(3, Duration::from_secs(5), |_| async { Some(42) }).await;
        assert_eq!(result, Some(42));
    }

    #[test]
    fn truncate_caps_long_bodies() {
        let body = "x".repeat(500);
        assert_eq!(truncate(&body, 100).len(), 100);
        assert_eq!(truncate("short", 100), "short");
    }
}
