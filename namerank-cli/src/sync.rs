/// Delivery of final ratings to a remote endpoint.
///
/// Payloads that still fail after retries are appended to an outbox (JSONL,
/// one payload per line) and sent again, oldest first, before the next
/// delivery or on `namerank flush`.
use chrono::{DateTime, Utc};
use log::{debug, warn};
use namerank_core::FinalRating;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::output::export_ratings;

/// Where and how to deliver.
pub struct SyncConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub max_retries: usize,
    pub retry_delay: std::time::Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingsPayload {
    pub user_name: String,
    pub ratings: Vec<FinalRating>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl RatingsPayload {
    /// Build a payload with ratings clamped to the export range.
    pub fn new(user_name: &str, finals: &[FinalRating], completed_at: DateTime<Utc>) -> Self {
        RatingsPayload {
            user_name: user_name.to_string(),
            ratings: export_ratings(finals),
            completed_at: Some(completed_at),
        }
    }
}

/// What happened to a delivery.
#[derive(Debug, PartialEq, Eq)]
pub enum Delivery {
    Sent { retries_used: usize },
    Queued { error: String },
}

/// Send one HTTP request. Err only on network failures and non-2xx responses.
async fn send_ratings_request(client: &Client, config: &SyncConfig, payload: &RatingsPayload) -> Result<(), String> {
    let url = format!("{}/ratings", config.endpoint.trim_end_matches('/'));

    let mut req_builder = client.post(&url).json(payload);
    if let Some(ref key) = config.api_key {
        req_builder = req_builder.bearer_auth(key);
    }

    let resp = req_builder.send().await.map_err(|e| format!("HTTP request failed: {e}"))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        let snippet: String = body.chars().take(200).collect();
        return Err(format!("Ratings endpoint returned {status}: {snippet}"));
    }
    Ok(())
}

/// POST the payload, retrying up to `max_retries` times with a fixed delay.
pub async fn send_with_retries(client: &Client, config: &SyncConfig, payload: &RatingsPayload) -> Result<usize, String> {
    let mut last_err = String::new();
    for attempt in 0..=config.max_retries {
        match send_ratings_request(client, config, payload).await {
            Ok(()) => return Ok(attempt),
            Err(e) => {
                last_err = e;
                if attempt < config.max_retries {
                    warn!(
                        "Retry {}/{} delivering ratings for {}: {}",
                        attempt + 1,
                        config.max_retries,
                        payload.user_name,
                        last_err
                    );
                    tokio::time::sleep(config.retry_delay).await;
                }
            }
        }
    }
    Err(last_err)
}

/// Deliver `payload`, queueing it in `outbox` if every attempt fails.
pub async fn deliver_ratings(
    client: &Client,
    config: &SyncConfig,
    payload: &RatingsPayload,
    outbox: &Path,
) -> std::io::Result<Delivery> {
    match send_with_retries(client, config, payload).await {
        Ok(retries_used) => {
            debug!("Delivered {} ratings for {}", payload.ratings.len(), payload.user_name);
            Ok(Delivery::Sent { retries_used })
        }
        Err(error) => {
            warn!("Delivery failed, queueing in {}: {error}", outbox.display());
            enqueue(outbox, payload)?;
            Ok(Delivery::Queued { error })
        }
    }
}

/// Append a payload to the outbox.
pub fn enqueue(outbox: &Path, payload: &RatingsPayload) -> std::io::Result<()> {
    if let Some(parent) = outbox.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let line = serde_json::to_string(payload)?;
    let mut file = std::fs::OpenOptions::new().create(true).append(true).open(outbox)?;
    writeln!(file, "{line}")?;
    Ok(())
}

/// Contents of the outbox file.
#[derive(Debug, Default, PartialEq)]
pub struct Outbox {
    pub payloads: Vec<RatingsPayload>,
    /// Lines that no longer decode, kept verbatim.
    pub unreadable: Vec<String>,
}

/// Read queued payloads. Lines that do not decode are returned separately.
pub fn read_outbox(outbox: &Path) -> std::io::Result<Outbox> {
    let content = match std::fs::read_to_string(outbox) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Outbox::default()),
        Err(e) => return Err(e),
    };
    let mut queued = Outbox::default();
    for (i, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(p) => queued.payloads.push(p),
            Err(e) => {
                warn!("Unreadable outbox line {} in {}: {e}", i + 1, outbox.display());
                queued.unreadable.push(line.to_string());
            }
        }
    }
    Ok(queued)
}

/// Where unreadable outbox lines are moved: `<outbox>.rejected`.
pub fn rejected_path(outbox: &Path) -> PathBuf {
    let mut name = outbox.as_os_str().to_owned();
    name.push(".rejected");
    PathBuf::from(name)
}

/// Append `lines` to the rejected file next to the outbox.
fn set_aside(outbox: &Path, lines: &[String]) -> std::io::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(rejected_path(outbox))?;
    for line in lines {
        writeln!(file, "{line}")?;
    }
    file.flush()
}

/// Replace the outbox with `remaining`, removing the file when nothing is left.
fn rewrite_outbox(outbox: &Path, remaining: &[RatingsPayload]) -> std::io::Result<()> {
    if remaining.is_empty() {
        return match std::fs::remove_file(outbox) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        };
    }
    let mut body = String::new();
    for payload in remaining {
        body.push_str(&serde_json::to_string(payload)?);
        body.push('\n');
    }
    let tmp = outbox.with_extension("jsonl.tmp");
    std::fs::write(&tmp, body)?;
    std::fs::rename(&tmp, outbox)
}

/// Counts from one pass over the outbox.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub sent: usize,
    pub remaining: usize,
    /// Unreadable lines moved to the rejected file.
    pub rejected: usize,
}

/// Re-send every queued payload in order. Stops at the first failure so the
/// queue keeps its order; whatever was not sent stays queued. Unreadable
/// lines are moved to the rejected file before the outbox is rewritten.
pub async fn flush_outbox(client: &Client, config: &SyncConfig, outbox: &Path) -> std::io::Result<FlushReport> {
    let queued = read_outbox(outbox)?;
    if queued.payloads.is_empty() && queued.unreadable.is_empty() {
        return Ok(FlushReport::default());
    }

    if !queued.unreadable.is_empty() {
        set_aside(outbox, &queued.unreadable)?;
        warn!(
            "Moved {} unreadable outbox line(s) to {}",
            queued.unreadable.len(),
            rejected_path(outbox).display()
        );
    }

    let mut sent = 0;
    for payload in &queued.payloads {
        match send_with_retries(client, config, payload).await {
            Ok(_) => sent += 1,
            Err(e) => {
                warn!("Outbox flush stopped after {sent} sent: {e}");
                break;
            }
        }
    }

    let remaining = &queued.payloads[sent..];
    rewrite_outbox(outbox, remaining)?;
    Ok(FlushReport {
        sent,
        remaining: remaining.len(),
        rejected: queued.unreadable.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn scratch(name: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        std::env::temp_dir()
            .join(format!("namerank-sync-{}-{nanos}", std::process::id()))
            .join(name)
    }

    fn payload(user: &str) -> RatingsPayload {
        let finals = vec![
            FinalRating { name: "Luna".into(), rating: 2600.0, wins: 2, losses: 0 },
            FinalRating { name: "Oliver".into(), rating: 1468.0, wins: 0, losses: 2 },
        ];
        RatingsPayload::new(user, &finals, Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap())
    }

    /// Nothing listens on port 9 of localhost in the test environment.
    fn unreachable() -> SyncConfig {
        SyncConfig {
            endpoint: "http://127.0.0.1:9".into(),
            api_key: None,
            max_retries: 1,
            retry_delay: std::time::Duration::from_millis(1),
        }
    }

    #[test]
    fn test_payload_shape() {
        let json = serde_json::to_value(payload("ana")).unwrap();
        assert_eq!(json["userName"], "ana");
        assert_eq!(json["ratings"][0]["name"], "Luna");
        assert_eq!(json["ratings"][0]["rating"], 2400.0);
        assert_eq!(json["ratings"][1]["losses"], 2);
    }

    fn append_raw(path: &Path, line: &str) {
        std::fs::OpenOptions::new()
            .append(true)
            .open(path)
            .and_then(|mut f| writeln!(f, "{line}"))
            .unwrap();
    }

    #[test]
    fn test_outbox_keeps_order_and_separates_junk() {
        let path = scratch("outbox.jsonl");
        enqueue(&path, &payload("ana")).unwrap();
        append_raw(&path, "{ broken");
        enqueue(&path, &payload("bob")).unwrap();

        let queued = read_outbox(&path).unwrap();
        let users: Vec<&str> = queued.payloads.iter().map(|p| p.user_name.as_str()).collect();
        assert_eq!(users, vec!["ana", "bob"]);
        assert_eq!(queued.unreadable, vec!["{ broken".to_string()]);

        rewrite_outbox(&path, &queued.payloads[1..]).unwrap();
        assert_eq!(read_outbox(&path).unwrap().payloads.len(), 1);
        rewrite_outbox(&path, &[]).unwrap();
        assert!(!path.exists());
        assert_eq!(read_outbox(&path).unwrap(), Outbox::default());

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn test_flush_keeps_unreadable_lines() {
        let path = scratch("outbox.jsonl");
        enqueue(&path, &payload("ana")).unwrap();
        append_raw(&path, "{\"userName\": 7}");

        let report = flush_outbox(&Client::new(), &unreachable(), &path).await.unwrap();
        assert_eq!(report, FlushReport { sent: 0, remaining: 1, rejected: 1 });

        let rejected = std::fs::read_to_string(rejected_path(&path)).unwrap();
        assert_eq!(rejected, "{\"userName\": 7}\n");
        let queued = read_outbox(&path).unwrap();
        assert_eq!(queued.payloads, vec![payload("ana")]);
        assert!(queued.unreadable.is_empty());

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn test_failed_delivery_is_queued() {
        let path = scratch("outbox.jsonl");
        let client = Client::new();

        let result = deliver_ratings(&client, &unreachable(), &payload("ana"), &path).await.unwrap();
        assert!(matches!(result, Delivery::Queued { .. }));
        assert_eq!(read_outbox(&path).unwrap().payloads, vec![payload("ana")]);

        let report = flush_outbox(&client, &unreachable(), &path).await.unwrap();
        assert_eq!(report, FlushReport { sent: 0, remaining: 1, rejected: 0 });
        assert_eq!(read_outbox(&path).unwrap().payloads.len(), 1);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn test_flush_of_missing_outbox() {
        let report = flush_outbox(&Client::new(), &unreachable(), &scratch("none.jsonl")).await.unwrap();
        assert_eq!(report, FlushReport::default());
    }
}
