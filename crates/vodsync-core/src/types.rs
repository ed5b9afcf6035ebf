//! Core types for the synchronized playback engine

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The arbitrary epoch where caller-supplied offsets align streams.
/// A configured offset `o` gives a stream an effective wall-clock start of
/// `ALIGN_EPOCH_MS + o`; offsets may be negative.
pub const ALIGN_EPOCH_MS: i64 = 1_500_000_000_000;

/// Unique identifier for a playback session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable identifier for one player within a session (`player0`, `player1`, ...)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlayerId(String);

impl PlayerId {
    /// Identifier for the Nth player slot
    pub fn from_index(index: usize) -> Self {
        Self(format!("player{index}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PlayerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PlayerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Player lifecycle states.
///
/// Discriminant order is the wire encoding order; diagnostics consumers
/// depend on the state names, not the integer values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum PlayerState {
    /// Source attached, metadata not yet available
    Loading = 0,
    /// Metadata available, not yet aligned
    Ready = 1,
    /// Parked before the stream's own start (anchor not yet due)
    BeforeStart = 2,
    /// Initial alignment seek in flight
    SeekingStart = 3,
    /// Settled, paused at the anchor
    Paused = 4,
    /// Seek/resume toward playing in flight
    SeekingPlay = 5,
    /// Settled, playing
    Playing = 6,
    /// Seek/pause toward paused in flight
    SeekingPause = 7,
    /// Drifted beyond tolerance, awaiting corrective seek
    Async = 8,
    /// Parked past the stream's end
    AfterEnd = 9,
    /// Restart seek about to be issued
    Restarting = 10,
}

impl PlayerState {
    /// Check if a transition to the target state is valid.
    ///
    /// Covers the lifecycle table plus the coordinated-seek edges: a seek
    /// pass may be issued from any state that already has metadata, and its
    /// issue point may land the player directly in BeforeStart or AfterEnd
    /// when the target timestamp is outside the stream's range.
    pub fn can_transition_to(&self, target: PlayerState) -> bool {
        use PlayerState::*;
        matches!(
            (self, target),
            // From Loading
            (Loading, Ready) |
            // From Ready
            (Ready, BeforeStart) | (Ready, SeekingStart) | (Ready, SeekingPlay)
                | (Ready, SeekingPause) | (Ready, Playing) | (Ready, AfterEnd) |
            // From BeforeStart
            (BeforeStart, SeekingStart) | (BeforeStart, SeekingPlay)
                | (BeforeStart, SeekingPause) | (BeforeStart, Playing) | (BeforeStart, AfterEnd) |
            // From SeekingStart
            (SeekingStart, Paused) | (SeekingStart, BeforeStart) | (SeekingStart, AfterEnd)
                | (SeekingStart, SeekingPlay) | (SeekingStart, SeekingPause) |
            // From Paused
            (Paused, SeekingPlay) | (Paused, SeekingPause) | (Paused, Playing)
                | (Paused, BeforeStart) | (Paused, AfterEnd) |
            // From SeekingPlay
            (SeekingPlay, Playing) | (SeekingPlay, SeekingPause) | (SeekingPlay, SeekingStart)
                | (SeekingPlay, BeforeStart) | (SeekingPlay, AfterEnd) |
            // From Playing
            (Playing, SeekingPause) | (Playing, SeekingPlay) | (Playing, Async)
                | (Playing, BeforeStart) | (Playing, AfterEnd) |
            // From SeekingPause
            (SeekingPause, Paused) | (SeekingPause, SeekingPlay) | (SeekingPause, SeekingStart)
                | (SeekingPause, BeforeStart) | (SeekingPause, AfterEnd) |
            // From Async
            (Async, SeekingPlay) | (Async, SeekingPause) |
            // From AfterEnd
            (AfterEnd, Restarting) | (AfterEnd, SeekingPlay) | (AfterEnd, SeekingPause)
                | (AfterEnd, BeforeStart) |
            // From Restarting
            (Restarting, SeekingStart)
        )
    }

    /// True for the states observers may treat as settled
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            PlayerState::Playing
                | PlayerState::Paused
                | PlayerState::BeforeStart
                | PlayerState::AfterEnd
        )
    }

    /// True while a coordinated seek is in flight
    pub fn is_seeking(&self) -> bool {
        matches!(
            self,
            PlayerState::SeekingStart | PlayerState::SeekingPlay | PlayerState::SeekingPause
        )
    }

    /// The settled state a completed seek lands in, if this is a seeking state
    pub fn seek_target(&self) -> Option<PlayerState> {
        match self {
            PlayerState::SeekingStart | PlayerState::SeekingPause => Some(PlayerState::Paused),
            PlayerState::SeekingPlay => Some(PlayerState::Playing),
            _ => None,
        }
    }
}

impl std::fmt::Display for PlayerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PlayerState::Loading => "LOADING",
            PlayerState::Ready => "READY",
            PlayerState::BeforeStart => "BEFORE_START",
            PlayerState::SeekingStart => "SEEKING_START",
            PlayerState::Paused => "PAUSED",
            PlayerState::SeekingPlay => "SEEKING_PLAY",
            PlayerState::Playing => "PLAYING",
            PlayerState::SeekingPause => "SEEKING_PAUSE",
            PlayerState::Async => "ASYNC",
            PlayerState::AfterEnd => "AFTER_END",
            PlayerState::Restarting => "RESTARTING",
        };
        write!(f, "{name}")
    }
}

/// Monotonic tag distinguishing one coordinated alignment pass from the next
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Generation(u64);

impl Generation {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where an anchor value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorSource {
    /// Canonical start time from the timing authority
    Authority,
    /// Maximum caller-supplied offset
    Offsets,
    /// Natural load completion order
    LoadOrder,
    /// A user-initiated seek or play
    UserSeek,
    /// Drift correction
    DriftCorrection,
}

/// The wall-clock instant every player must represent once settled.
///
/// Replaced wholesale on every recompute so a reader can never observe a
/// timestamp paired with the wrong generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
    pub timestamp_ms: i64,
    pub generation: Generation,
    pub source: AnchorSource,
}

/// What a coordinated seek should leave the player doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekKind {
    /// Initial alignment; lands paused
    Start,
    /// Seek and resume playback
    Play,
    /// Seek and stay paused
    Pause,
}

/// Per-stream facts delivered when a source finishes loading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamMetadata {
    /// Identity of the stream's broadcaster, matched against the expected
    /// entrant set for event-bound sessions
    pub identity: String,
    /// Wall-clock start of the stream, epoch milliseconds
    pub started_at_ms: i64,
    /// Stream length in milliseconds
    pub duration_ms: i64,
}

impl StreamMetadata {
    pub fn ended_at_ms(&self) -> i64 {
        self.started_at_ms + self.duration_ms
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Convergence tolerance in milliseconds
    pub tolerance_ms: i64,
    /// Maximum number of players in a session
    pub max_players: usize,
    /// Default bound for state-wait operations (milliseconds)
    pub state_wait_timeout_ms: u64,
    /// Snapshot poll interval for state waits (milliseconds)
    pub poll_interval_ms: u64,
    /// Engine pump interval for the session loop (milliseconds)
    pub pump_interval_ms: u64,
    /// Restart a stream from its beginning once it is exhausted
    pub restart_on_end: bool,
    /// Alignment epoch for caller-supplied offsets
    pub align_epoch_ms: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tolerance_ms: 1000,
            max_players: 10,
            state_wait_timeout_ms: 30_000,
            poll_interval_ms: 10,
            pump_interval_ms: 20,
            restart_on_end: false,
            align_epoch_ms: ALIGN_EPOCH_MS,
        }
    }
}

/// Point-in-time view of one player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub id: PlayerId,
    pub state: PlayerState,
    pub buffering: bool,
    pub timestamp_ms: Option<i64>,
    pub generation: Generation,
}

/// Point-in-time view of the whole session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub players: Vec<PlayerSnapshot>,
    pub anchor: Option<Anchor>,
    pub synced: bool,
    pub fault: Option<String>,
}

impl SessionSnapshot {
    pub fn player(&self, id: &PlayerId) -> Option<&PlayerSnapshot> {
        self.players.iter().find(|p| &p.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_transitions_follow_the_lifecycle_table() {
        use PlayerState::*;

        assert!(Loading.can_transition_to(Ready));
        assert!(Ready.can_transition_to(BeforeStart));
        assert!(Ready.can_transition_to(SeekingStart));
        assert!(BeforeStart.can_transition_to(SeekingStart));
        assert!(SeekingStart.can_transition_to(Paused));
        assert!(Paused.can_transition_to(SeekingPlay));
        assert!(SeekingPlay.can_transition_to(Playing));
        assert!(Playing.can_transition_to(SeekingPause));
        assert!(SeekingPause.can_transition_to(Paused));
        assert!(Playing.can_transition_to(Async));
        assert!(Async.can_transition_to(SeekingPlay));
        assert!(Async.can_transition_to(SeekingPause));
        assert!(Playing.can_transition_to(AfterEnd));
        assert!(AfterEnd.can_transition_to(Restarting));
        assert!(Restarting.can_transition_to(SeekingStart));

        assert!(!Loading.can_transition_to(Playing));
        assert!(!Paused.can_transition_to(Ready));
        assert!(!Playing.can_transition_to(Loading));
        assert!(!Async.can_transition_to(Playing));
    }

    #[test]
    fn seeking_states_resolve_to_their_settled_targets() {
        assert_eq!(
            PlayerState::SeekingStart.seek_target(),
            Some(PlayerState::Paused)
        );
        assert_eq!(
            PlayerState::SeekingPause.seek_target(),
            Some(PlayerState::Paused)
        );
        assert_eq!(
            PlayerState::SeekingPlay.seek_target(),
            Some(PlayerState::Playing)
        );
        assert_eq!(PlayerState::Playing.seek_target(), None);
    }

    #[test]
    fn state_names_are_stable_for_diagnostics() {
        assert_eq!(PlayerState::SeekingPause.to_string(), "SEEKING_PAUSE");
        assert_eq!(PlayerState::BeforeStart.to_string(), "BEFORE_START");
        assert_eq!(
            serde_json::to_string(&PlayerState::AfterEnd).unwrap(),
            "\"AFTER_END\""
        );
    }

    #[test]
    fn generations_are_monotonic() {
        let g = Generation::default();
        assert!(g.next() > g);
        assert_eq!(g.next().next().value(), 2);
    }
}
