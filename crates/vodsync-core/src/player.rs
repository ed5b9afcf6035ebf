//! Per-stream player wrapper
//!
//! Owns one media handle, the player's lifecycle state, and the offset
//! arithmetic that maps the shared wall-clock timeline onto the stream's
//! local playhead.

use crate::error::{Error, Result};
use crate::media::{MediaEventKind, MediaHandle};
use crate::types::{Generation, PlayerId, PlayerState, SeekKind, StreamMetadata};
use std::time::Duration;
use tracing::{debug, warn};

/// Minimum local seek position; seeking to exactly zero misbehaves on some
/// underlying engines.
const SEEK_EPSILON: Duration = Duration::from_millis(1);

pub struct Player {
    id: PlayerId,
    state: PlayerState,
    handle: Box<dyn MediaHandle>,
    metadata: Option<StreamMetadata>,
    offset_ms: Option<i64>,
    align_epoch_ms: i64,
    last_seek_generation: Generation,
    /// A seek command is in flight for the current pass; play/pause
    /// confirmations must not finalize the transition early.
    awaiting_seek: bool,
    /// A completion landed while the engine was still buffering; finalized
    /// on a later pump once buffering clears.
    pending_landing: bool,
}

impl Player {
    pub fn new(
        id: PlayerId,
        handle: Box<dyn MediaHandle>,
        offset_ms: Option<i64>,
        align_epoch_ms: i64,
    ) -> Self {
        Self {
            id,
            state: PlayerState::Loading,
            handle,
            metadata: None,
            offset_ms,
            align_epoch_ms,
            last_seek_generation: Generation::default(),
            awaiting_seek: false,
            pending_landing: false,
        }
    }

    pub fn id(&self) -> &PlayerId {
        &self.id
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn metadata(&self) -> Option<&StreamMetadata> {
        self.metadata.as_ref()
    }

    pub fn identity(&self) -> Option<&str> {
        self.metadata.as_ref().map(|m| m.identity.as_str())
    }

    pub fn has_offset_override(&self) -> bool {
        self.offset_ms.is_some()
    }

    pub fn last_seek_generation(&self) -> Generation {
        self.last_seek_generation
    }

    pub fn is_buffering(&self) -> bool {
        self.handle.is_buffering()
    }

    pub(crate) fn awaiting_seek(&self) -> bool {
        self.awaiting_seek
    }

    pub(crate) fn attach_metadata(&mut self, metadata: StreamMetadata) {
        self.metadata = Some(metadata);
    }

    pub(crate) fn poll_events(&mut self) -> Vec<MediaEventKind> {
        self.handle.poll_events()
    }

    /// Effective wall-clock start of this stream: the alignment epoch plus
    /// the caller-supplied offset when one was given, otherwise the stream's
    /// own start time.
    pub fn start_timestamp(&self) -> Option<i64> {
        match self.offset_ms {
            Some(offset) => Some(self.align_epoch_ms + offset),
            None => self.metadata.as_ref().map(|m| m.started_at_ms),
        }
    }

    pub fn end_timestamp(&self) -> Option<i64> {
        let start = self.start_timestamp()?;
        Some(start + self.metadata.as_ref()?.duration_ms)
    }

    /// The wall-clock instant the local playhead currently represents
    pub fn current_timestamp(&self) -> Option<i64> {
        let start = self.start_timestamp()?;
        Some(start + self.handle.position().as_millis() as i64)
    }

    /// Issue a coordinated seek toward a wall-clock timestamp.
    ///
    /// Targets before the stream's start park the player in `BeforeStart`
    /// (paused at the beginning); targets at or past the end park it in
    /// `AfterEnd`. Returns the state entered at issue time.
    pub fn seek_to(
        &mut self,
        timestamp_ms: i64,
        kind: SeekKind,
        generation: Generation,
    ) -> Result<PlayerState> {
        let start = self
            .start_timestamp()
            .ok_or_else(|| Error::Internal(format!("{} has no start timestamp", self.id)))?;
        self.last_seek_generation = generation;
        self.pending_landing = false;

        if timestamp_ms < start {
            self.set_state(PlayerState::BeforeStart)?;
            self.handle.pause();
            self.handle.seek(SEEK_EPSILON, Some(generation));
            self.awaiting_seek = false;
            return Ok(self.state);
        }

        if let Some(end) = self.end_timestamp() {
            if timestamp_ms >= end {
                self.set_state(PlayerState::AfterEnd)?;
                self.handle.pause();
                self.awaiting_seek = false;
                return Ok(self.state);
            }
        }

        let local = Duration::from_millis((timestamp_ms - start) as u64).max(SEEK_EPSILON);
        match kind {
            SeekKind::Start => {
                self.set_state(PlayerState::SeekingStart)?;
                self.handle.pause();
                self.handle.seek(local, Some(generation));
            }
            SeekKind::Pause => {
                self.set_state(PlayerState::SeekingPause)?;
                self.handle.pause();
                self.handle.seek(local, Some(generation));
            }
            SeekKind::Play => {
                self.set_state(PlayerState::SeekingPlay)?;
                self.handle.seek(local, Some(generation));
                self.handle.play();
            }
        }
        self.awaiting_seek = true;
        Ok(self.state)
    }

    /// Issue a bare play command (no seek); completion finalizes the state.
    pub(crate) fn play(&mut self) {
        self.awaiting_seek = false;
        self.handle.play();
    }

    /// Issue a bare pause command (no seek); completion finalizes the state.
    pub(crate) fn pause(&mut self) {
        self.awaiting_seek = false;
        self.handle.pause();
    }

    /// Record that the in-flight transition's completion has arrived; the
    /// transition itself completes via [`try_finalize`] once the engine
    /// reports it is no longer buffering.
    pub(crate) fn note_landing(&mut self) {
        self.pending_landing = true;
    }

    pub(crate) fn has_pending_landing(&self) -> bool {
        self.pending_landing
    }

    /// Complete a landed `Seeking*` transition unless buffering still holds
    /// it. Returns the settled state entered, if any.
    pub(crate) fn try_finalize(&mut self) -> Result<Option<PlayerState>> {
        if !self.pending_landing {
            return Ok(None);
        }
        if self.handle.is_buffering() {
            debug!(player = %self.id, state = %self.state, "landed but still buffering");
            return Ok(None);
        }
        let Some(target) = self.state.seek_target() else {
            // A retarget moved the player out of its seeking state before
            // buffering cleared; nothing left to finalize.
            self.pending_landing = false;
            return Ok(None);
        };
        self.set_state(target)?;
        self.pending_landing = false;
        self.awaiting_seek = false;
        Ok(Some(target))
    }

    /// Validated state transition. Same-state assignments are no-ops.
    pub(crate) fn set_state(&mut self, to: PlayerState) -> Result<()> {
        if self.state == to {
            return Ok(());
        }
        if !self.state.can_transition_to(to) {
            warn!(player = %self.id, from = %self.state, to = %to, "invalid state transition");
            return Err(Error::InvalidStateTransition {
                player: self.id.clone(),
                from: self.state,
                to,
            });
        }
        debug!(player = %self.id, from = %self.state, to = %to, "state transition");
        self.state = to;
        Ok(())
    }
}
