//! VodSync Core - Synchronized Multi-Stream Playback Engine
//!
//! This crate keeps several independently loaded video streams aligned to
//! one shared virtual timeline:
//! - Per-player lifecycle state machine with validated transitions
//! - Anchor resolution (timing authority, explicit offsets, load order)
//! - Generation-tagged coordinated seeks that discard stale completions
//! - Timing authority client for event start times and entrant identities
//! - Credential gate with configuration stash/restore
//! - Append-only diagnostic event log
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       VodSync Core                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐       │
//! │  │    Anchor    │  │    Player    │  │    Media     │       │
//! │  │   Resolver   │  │ State Machine│  │   Handles    │       │
//! │  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘       │
//! │         │                 │                 │               │
//! │         └─────────────────┼─────────────────┘               │
//! │                           │                                 │
//! │                    ┌──────┴──────┐                          │
//! │                    │    Sync     │                          │
//! │                    │   Engine    │                          │
//! │                    └──────┬──────┘                          │
//! │                           │                                 │
//! │  ┌──────────────┐  ┌──────┴──────┐  ┌──────────────┐        │
//! │  │    Timing    │  │   Session   │  │  Diagnostic  │        │
//! │  │  Authority   │  │    Loop     │  │     Log      │        │
//! │  └──────────────┘  └─────────────┘  └──────────────┘        │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod anchor;
pub mod auth;
pub mod authority;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod media;
pub mod player;
pub mod session;
pub mod types;

pub use anchor::resolve_anchor;
pub use auth::{AuthGate, AuthPhase};
pub use authority::{select_event, EventDetails, EventSummary, TimingAuthorityClient};
pub use config::{parse_event_ref, AuthPrefs, Credentials, PlayerSpec, SessionConfig};
pub use diagnostics::{DiagnosticLog, EventKind, EventRecord};
pub use engine::SyncEngine;
pub use error::{Error, Result};
pub use media::{MediaEventKind, MediaHandle, SimulatedMedia};
pub use player::Player;
pub use session::Session;
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the engine library with default configuration
pub fn init() {
    tracing::info!(version = VERSION, "VodSync Core initialized");
}
