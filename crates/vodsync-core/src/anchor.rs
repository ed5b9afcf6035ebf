//! Anchor resolution
//!
//! The anchor is the shared wall-clock instant every player aligns to. A
//! timing-authority start always wins; otherwise the anchor is the latest
//! effective start across the loaded players, so no player is asked to seek
//! before its own beginning.

use crate::player::Player;
use crate::types::AnchorSource;

/// Resolve the initial anchor timestamp and where it came from.
///
/// Returns `None` when any player still lacks an effective start; the
/// resolver only runs once every player has loaded.
pub fn resolve_anchor<'a, I>(authority_start_ms: Option<i64>, players: I) -> Option<(i64, AnchorSource)>
where
    I: IntoIterator<Item = &'a Player>,
{
    if let Some(start) = authority_start_ms {
        return Some((start, AnchorSource::Authority));
    }

    let mut latest: Option<i64> = None;
    let mut any_override = false;
    for player in players {
        let start = player.start_timestamp()?;
        any_override |= player.has_offset_override();
        latest = Some(latest.map_or(start, |l| l.max(start)));
    }

    let source = if any_override {
        AnchorSource::Offsets
    } else {
        AnchorSource::LoadOrder
    };
    latest.map(|ts| (ts, source))
}
