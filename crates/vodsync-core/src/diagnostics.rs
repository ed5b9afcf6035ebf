//! Diagnostic event log
//!
//! An append-only, in-memory sequence of playback events, readable by
//! external observers for post-hoc assertions. Never cleared during a
//! session.

use crate::types::{PlayerId, PlayerState};
use chrono::DateTime;
use serde::{Deserialize, Serialize};

/// Current wall-clock time in epoch milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Diagnostic event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    // Raw media completions
    MetadataLoaded,
    SeekLanded,
    Played,
    Paused,
    Ended,
    CredentialsRejected,

    // Engine decisions
    SeekIssued,
    Synchronizing,
    StaleGenerationIgnored,
    BufferingHold,
    DriftDetected,
    Fault,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EventKind::MetadataLoaded => "metadata_loaded",
            EventKind::SeekLanded => "seek_landed",
            EventKind::Played => "played",
            EventKind::Paused => "paused",
            EventKind::Ended => "ended",
            EventKind::CredentialsRejected => "credentials_rejected",
            EventKind::SeekIssued => "seek_issued",
            EventKind::Synchronizing => "synchronizing",
            EventKind::StaleGenerationIgnored => "stale_generation_ignored",
            EventKind::BufferingHold => "buffering_hold",
            EventKind::DriftDetected => "drift_detected",
            EventKind::Fault => "fault",
        };
        write!(f, "{name}")
    }
}

/// One diagnostic record: what happened, to which player, in which state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub timestamp_ms: i64,
    pub player: PlayerId,
    pub kind: EventKind,
    pub state: PlayerState,
    pub detail: Option<String>,
}

/// Append-only diagnostic log
#[derive(Debug, Default)]
pub struct DiagnosticLog {
    records: Vec<EventRecord>,
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record stamped with the current wall-clock time
    pub fn record(
        &mut self,
        player: &PlayerId,
        kind: EventKind,
        state: PlayerState,
        detail: Option<String>,
    ) {
        self.records.push(EventRecord {
            timestamp_ms: now_ms(),
            player: player.clone(),
            kind,
            state,
            detail,
        });
    }

    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records of one kind, in order
    pub fn of_kind(&self, kind: EventKind) -> impl Iterator<Item = &EventRecord> {
        self.records.iter().filter(move |r| r.kind == kind)
    }

    /// Tab-separated rendering for log dumps
    pub fn render(&self) -> String {
        let mut out = String::new();
        for record in &self.records {
            let when = DateTime::from_timestamp_millis(record.timestamp_ms)
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| record.timestamp_ms.to_string());
            out.push_str(&format!(
                "{}\t{}\t{}\t{}",
                when, record.player, record.kind, record.state
            ));
            if let Some(detail) = &record.detail {
                out.push('\t');
                out.push_str(detail);
            }
            out.push('\n');
        }
        out
    }
}
