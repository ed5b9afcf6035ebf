//! Timing authority client
//!
//! Thin HTTP client over the external timing authority: a list of candidate
//! events and, per event, the entrant identities and the canonical start
//! time. The start time is the strongest anchor input; the entrant set is
//! what stream identities are validated against.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

fn default_streaming_required() -> bool {
    true
}

/// One candidate event from the listing endpoint.
///
/// `streaming_required` defaults to true when absent; only events whose
/// entrants were required to stream can be synchronized after the fact.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EventSummary {
    pub url: String,
    #[serde(default = "default_streaming_required")]
    pub streaming_required: bool,
}

#[derive(Debug, Deserialize)]
struct EventListResponse {
    events: Vec<EventSummary>,
}

#[derive(Debug, Deserialize)]
struct EntrantResponse {
    identity: String,
}

#[derive(Debug, Deserialize)]
struct EventDetailsResponse {
    entrants: Vec<EntrantResponse>,
    started_at: DateTime<Utc>,
}

/// Resolved event facts: the authoritative anchor input plus the expected
/// identity set.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDetails {
    pub id: String,
    pub entrants: Vec<String>,
    pub started_at_ms: i64,
}

/// Pick the first synchronizable candidate.
pub fn select_event(candidates: &[EventSummary]) -> Result<&EventSummary> {
    candidates
        .iter()
        .find(|c| c.streaming_required)
        .ok_or(Error::NoSuitableEvent)
}

/// Normalize an event URL to its id (the trailing path, slashes trimmed).
pub fn event_id_from_url(url: &str) -> String {
    let mut parts = url.trim_matches('/').rsplitn(3, '/');
    let slug = parts.next().unwrap_or_default();
    match parts.next() {
        Some(category) if !category.is_empty() => format!("{category}/{slug}"),
        _ => slug.to_string(),
    }
}

pub struct TimingAuthorityClient {
    client: reqwest::Client,
    base_url: Url,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl TimingAuthorityClient {
    pub fn new(base_url: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            retry_attempts: 3,
            retry_delay: Duration::from_secs(1),
        }
    }

    pub fn with_retries(mut self, attempts: u32, delay: Duration) -> Self {
        self.retry_attempts = attempts;
        self.retry_delay = delay;
        self
    }

    /// List the candidate events under a category.
    #[instrument(skip(self))]
    pub async fn list_events(&self, category: &str) -> Result<Vec<EventSummary>> {
        let url = self
            .base_url
            .join(&format!("{category}/events"))
            .map_err(Error::InvalidUrl)?;
        let response: EventListResponse = self.get_with_retry(url).await?;
        debug!(count = response.events.len(), "event candidates listed");
        Ok(response.events)
    }

    /// Fetch entrants and the canonical start time for one event.
    #[instrument(skip(self))]
    pub async fn event_details(&self, id: &str) -> Result<EventDetails> {
        let url = self
            .base_url
            .join(&format!("events/{id}"))
            .map_err(Error::InvalidUrl)?;
        let response: EventDetailsResponse = self.get_with_retry(url).await?;
        Ok(EventDetails {
            id: id.to_string(),
            entrants: response.entrants.into_iter().map(|e| e.identity).collect(),
            started_at_ms: response.started_at.timestamp_millis(),
        })
    }

    /// Resolve a category reference to the details of its first
    /// synchronizable event.
    pub async fn resolve(&self, category: &str) -> Result<EventDetails> {
        let candidates = self.list_events(category).await?;
        let chosen = select_event(&candidates)?;
        self.event_details(&event_id_from_url(&chosen.url)).await
    }

    async fn get_with_retry<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_get(url.clone()).await {
                Ok(value) => return Ok(value),
                Err(Error::Network(err))
                    if attempt < self.retry_attempts && is_transient(&err) =>
                {
                    warn!(%url, attempt, error = %err, "transient authority error, retrying");
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn try_get<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }
}

fn is_transient(err: &reqwest::Error) -> bool {
    err.is_timeout()
        || err.is_connect()
        || err.status().is_some_and(|s| s.is_server_error())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_streaming_flag_means_eligible() {
        let candidates: Vec<EventSummary> = serde_json::from_str(
            r#"[
                {"url": "/ootr/lucky-lagoon-1111", "streaming_required": false},
                {"url": "/ootr/wonderful-krossbones-7951"}
            ]"#,
        )
        .unwrap();
        let chosen = select_event(&candidates).unwrap();
        assert_eq!(chosen.url, "/ootr/wonderful-krossbones-7951");
    }

    #[test]
    fn all_non_streaming_candidates_yield_no_suitable_event() {
        let candidates: Vec<EventSummary> = serde_json::from_str(
            r#"[
                {"url": "/ootr/a-1", "streaming_required": false},
                {"url": "/ootr/b-2", "streaming_required": false}
            ]"#,
        )
        .unwrap();
        let err = select_event(&candidates).unwrap_err();
        assert_eq!(err.error_code(), "NO_SUITABLE_EVENT");
        assert!(select_event(&[]).is_err());
    }

    #[test]
    fn details_parse_entrants_and_start_time() {
        let response: EventDetailsResponse = serde_json::from_str(
            r#"{
                "entrants": [{"identity": "streamer0"}, {"identity": "streamer1"}],
                "started_at": "2025-04-28T10:44:58Z"
            }"#,
        )
        .unwrap();
        assert_eq!(response.entrants.len(), 2);
        assert_eq!(response.started_at.timestamp_millis(), 1_745_837_098_000);
    }

    #[test]
    fn event_id_keeps_the_last_two_path_segments() {
        assert_eq!(
            event_id_from_url("/ootr/wonderful-krossbones-7951"),
            "ootr/wonderful-krossbones-7951"
        );
        assert_eq!(
            event_id_from_url("https://example.gg/ootr/foo-bar-1/"),
            "ootr/foo-bar-1"
        );
    }
}
