//! Media layer seam
//!
//! The engine never talks to a real decoder; it issues commands through
//! [`MediaHandle`] and consumes completion events. Commands are
//! fire-and-forget; every coordinated seek carries the generation of the
//! alignment pass that issued it, and the completion echoes it back so the
//! engine can discard stale landings.

use crate::types::{Generation, StreamMetadata};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Completion events delivered by the underlying media engine.
///
/// `SeekLanded` carries the generation of the coordinated pass that issued
/// the seek; `None` marks a user-initiated seek.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEventKind {
    MetadataLoaded(StreamMetadata),
    SeekLanded {
        position: Duration,
        generation: Option<Generation>,
    },
    Played,
    Paused,
    Ended,
    /// The source refused to load because credentials are missing or were
    /// rejected by the provider.
    CredentialsRejected,
}

impl MediaEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            MediaEventKind::MetadataLoaded(_) => "metadata_loaded",
            MediaEventKind::SeekLanded { .. } => "seek_landed",
            MediaEventKind::Played => "played",
            MediaEventKind::Paused => "paused",
            MediaEventKind::Ended => "ended",
            MediaEventKind::CredentialsRejected => "credentials_rejected",
        }
    }
}

/// Command surface over one underlying playable stream.
///
/// `position` and `is_buffering` must be cheap; the engine polls them on
/// every pump.
pub trait MediaHandle: Send {
    fn play(&mut self);
    fn pause(&mut self);
    fn seek(&mut self, position: Duration, generation: Option<Generation>);
    fn position(&self) -> Duration;
    fn is_buffering(&self) -> bool;
    /// Drain completion events accumulated since the last poll, in order.
    fn poll_events(&mut self) -> Vec<MediaEventKind>;
}

#[derive(Debug)]
struct SimState {
    metadata: StreamMetadata,
    position: Duration,
    playing: bool,
    buffering: bool,
    ended: bool,
    pending: VecDeque<MediaEventKind>,
}

/// Deterministic in-memory media source.
///
/// Backs the simulator and the test suite: engine commands mutate the state
/// and queue the completion events a real media engine would fire, while the
/// driving side injects metadata delivery, user actions, buffering, and
/// playback progress.
#[derive(Debug, Clone)]
pub struct SimulatedMedia {
    inner: Arc<Mutex<SimState>>,
}

impl SimulatedMedia {
    pub fn new(metadata: StreamMetadata) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SimState {
                metadata,
                position: Duration::ZERO,
                playing: false,
                buffering: false,
                ended: false,
                pending: VecDeque::new(),
            })),
        }
    }

    /// A handle for the engine side. Handles share state with the source
    /// they were created from.
    pub fn handle(&self) -> Box<dyn MediaHandle> {
        Box::new(SimulatedHandle {
            inner: Arc::clone(&self.inner),
        })
    }

    /// Announce stream metadata, as a real source does once loading finishes.
    pub fn deliver_metadata(&self) {
        let mut state = self.inner.lock().unwrap();
        let metadata = state.metadata.clone();
        state
            .pending
            .push_back(MediaEventKind::MetadataLoaded(metadata));
    }

    /// A seek performed through the underlying player UI, outside any
    /// coordinated pass.
    pub fn user_seek(&self, position: Duration) {
        let mut state = self.inner.lock().unwrap();
        state.position = position;
        state.pending.push_back(MediaEventKind::SeekLanded {
            position,
            generation: None,
        });
    }

    pub fn user_play(&self) {
        let mut state = self.inner.lock().unwrap();
        state.playing = true;
        state.pending.push_back(MediaEventKind::Played);
    }

    pub fn user_pause(&self) {
        let mut state = self.inner.lock().unwrap();
        state.playing = false;
        state.pending.push_back(MediaEventKind::Paused);
    }

    pub fn set_buffering(&self, buffering: bool) {
        self.inner.lock().unwrap().buffering = buffering;
    }

    /// The provider refused the source for lack of valid credentials.
    pub fn reject_credentials(&self) {
        self.inner
            .lock()
            .unwrap()
            .pending
            .push_back(MediaEventKind::CredentialsRejected);
    }

    /// Advance playback by `dt` if playing; fires `Ended` once the position
    /// reaches the stream's duration.
    pub fn advance(&self, dt: Duration) {
        let mut state = self.inner.lock().unwrap();
        if !state.playing {
            return;
        }
        state.position += dt;
        let duration = Duration::from_millis(state.metadata.duration_ms.max(0) as u64);
        if state.position >= duration && !state.ended {
            state.position = duration;
            state.playing = false;
            state.ended = true;
            state.pending.push_back(MediaEventKind::Ended);
        }
    }

    pub fn position(&self) -> Duration {
        self.inner.lock().unwrap().position
    }

    pub fn is_playing(&self) -> bool {
        self.inner.lock().unwrap().playing
    }
}

struct SimulatedHandle {
    inner: Arc<Mutex<SimState>>,
}

impl MediaHandle for SimulatedHandle {
    fn play(&mut self) {
        let mut state = self.inner.lock().unwrap();
        state.playing = true;
        state.ended = false;
        state.pending.push_back(MediaEventKind::Played);
    }

    fn pause(&mut self) {
        let mut state = self.inner.lock().unwrap();
        state.playing = false;
        state.pending.push_back(MediaEventKind::Paused);
    }

    fn seek(&mut self, position: Duration, generation: Option<Generation>) {
        let mut state = self.inner.lock().unwrap();
        state.position = position;
        state.ended = false;
        state.pending.push_back(MediaEventKind::SeekLanded {
            position,
            generation,
        });
    }

    fn position(&self) -> Duration {
        self.inner.lock().unwrap().position
    }

    fn is_buffering(&self) -> bool {
        self.inner.lock().unwrap().buffering
    }

    fn poll_events(&mut self) -> Vec<MediaEventKind> {
        self.inner.lock().unwrap().pending.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> StreamMetadata {
        StreamMetadata {
            identity: "streamer0".into(),
            started_at_ms: 1_745_837_098_000,
            duration_ms: 3_600_000,
        }
    }

    #[test]
    fn commands_queue_matching_completions() {
        let media = SimulatedMedia::new(metadata());
        let mut handle = media.handle();

        handle.pause();
        handle.seek(Duration::from_secs(60), Some(Generation::default().next()));
        handle.play();

        let events = handle.poll_events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], MediaEventKind::Paused);
        assert!(matches!(
            events[1],
            MediaEventKind::SeekLanded {
                position,
                generation: Some(_)
            } if position == Duration::from_secs(60)
        ));
        assert_eq!(events[2], MediaEventKind::Played);
        assert!(handle.poll_events().is_empty());
    }

    #[test]
    fn user_seeks_are_untagged() {
        let media = SimulatedMedia::new(metadata());
        let mut handle = media.handle();
        media.user_seek(Duration::from_secs(20));

        let events = handle.poll_events();
        assert_eq!(
            events,
            vec![MediaEventKind::SeekLanded {
                position: Duration::from_secs(20),
                generation: None,
            }]
        );
    }

    #[test]
    fn advance_fires_ended_once_at_the_duration() {
        let media = SimulatedMedia::new(metadata());
        let mut handle = media.handle();
        handle.play();
        handle.poll_events();

        media.advance(Duration::from_secs(3599));
        assert!(handle.poll_events().is_empty());
        media.advance(Duration::from_secs(2));
        assert_eq!(handle.poll_events(), vec![MediaEventKind::Ended]);
        media.advance(Duration::from_secs(1));
        assert!(handle.poll_events().is_empty());
    }
}
