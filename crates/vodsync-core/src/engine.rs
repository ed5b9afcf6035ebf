//! Synchronization engine
//!
//! Single-threaded, event-driven coordinator for a group of players. Media
//! completions come in through [`handle_media_event`] or the periodic
//! [`pump`]; the engine reacts by issuing coordinated seeks, tracking the
//! shared anchor, and discarding completions from superseded alignment
//! passes.
//!
//! [`handle_media_event`]: SyncEngine::handle_media_event
//! [`pump`]: SyncEngine::pump

use crate::anchor::resolve_anchor;
use crate::auth::{AuthGate, AuthPhase};
use crate::authority::EventDetails;
use crate::config::SessionConfig;
use crate::diagnostics::{DiagnosticLog, EventKind};
use crate::error::{Error, Result};
use crate::media::{MediaEventKind, MediaHandle};
use crate::player::Player;
use crate::types::{
    Anchor, AnchorSource, EngineConfig, Generation, PlayerId, PlayerSnapshot, PlayerState,
    SeekKind, SessionSnapshot,
};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracing::info;

pub struct SyncEngine {
    config: EngineConfig,
    players: BTreeMap<PlayerId, Player>,
    anchor: Option<Anchor>,
    generation: Generation,
    authority_start_ms: Option<i64>,
    expected_identities: Option<BTreeSet<String>>,
    auth: AuthGate,
    session_config: Option<SessionConfig>,
    log: DiagnosticLog,
    /// Set on an unrecoverable condition; alignment stops for the rest of
    /// the session, raw completions are still logged.
    fault: Option<String>,
}

impl SyncEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            players: BTreeMap::new(),
            anchor: None,
            generation: Generation::default(),
            authority_start_ms: None,
            expected_identities: None,
            auth: AuthGate::new(None),
            session_config: None,
            log: DiagnosticLog::new(),
            fault: None,
        }
    }

    /// Bind the session configuration so a credential challenge can stash
    /// it for the round trip. Also adopts the configuration's auth
    /// preferences.
    pub fn bind_config(&mut self, config: SessionConfig) {
        self.auth = AuthGate::new(config.auth_prefs);
        self.session_config = Some(config);
    }

    /// Attach a player slot in the `Loading` state.
    pub fn attach(
        &mut self,
        id: PlayerId,
        handle: Box<dyn MediaHandle>,
        offset_ms: Option<i64>,
    ) -> Result<()> {
        if self.players.len() >= self.config.max_players {
            return Err(Error::InvalidConfig(format!(
                "session is limited to {} players",
                self.config.max_players
            )));
        }
        if self.players.contains_key(&id) {
            return Err(Error::InvalidConfig(format!("duplicate player id '{id}'")));
        }
        info!(player = %id, "player attached");
        self.players.insert(
            id.clone(),
            Player::new(id, handle, offset_ms, self.config.align_epoch_ms),
        );
        Ok(())
    }

    /// Bind the session to a timing-authority event: its start time becomes
    /// the anchor and its entrants the only acceptable stream identities.
    pub fn bind_event(&mut self, details: &EventDetails) {
        info!(event = %details.id, entrants = details.entrants.len(), "timing authority event bound");
        self.authority_start_ms = Some(details.started_at_ms);
        self.expected_identities = Some(details.entrants.iter().cloned().collect());
    }

    /// Feed one media completion into the dispatch.
    pub fn handle_media_event(&mut self, id: &PlayerId, event: MediaEventKind) -> Result<()> {
        let state = self
            .players
            .get(id)
            .ok_or_else(|| Error::UnknownPlayer(id.clone()))?
            .state();

        let (kind, detail) = match &event {
            MediaEventKind::MetadataLoaded(m) => {
                (EventKind::MetadataLoaded, Some(m.identity.clone()))
            }
            MediaEventKind::SeekLanded {
                position,
                generation,
            } => (
                EventKind::SeekLanded,
                Some(match generation {
                    Some(g) => format!("{}ms gen {g}", position.as_millis()),
                    None => format!("{}ms user", position.as_millis()),
                }),
            ),
            MediaEventKind::Played => (EventKind::Played, None),
            MediaEventKind::Paused => (EventKind::Paused, None),
            MediaEventKind::Ended => (EventKind::Ended, None),
            MediaEventKind::CredentialsRejected => (EventKind::CredentialsRejected, None),
        };
        self.log.record(id, kind, state, detail);

        if self.fault.is_some() {
            return Ok(());
        }
        match event {
            MediaEventKind::MetadataLoaded(m) => self.on_metadata(id, m),
            MediaEventKind::SeekLanded {
                position,
                generation,
            } => self.on_seek_landed(id, position, generation),
            MediaEventKind::Played => self.on_played(id),
            MediaEventKind::Paused => self.on_paused(id),
            MediaEventKind::Ended => self.on_ended(id),
            MediaEventKind::CredentialsRejected => self.on_credentials_rejected(id),
        }
    }

    /// Drain all queued completions, finalize landings held by buffering,
    /// unpark players whose start has come due, and correct drift.
    pub fn pump(&mut self) -> Result<()> {
        let ids: Vec<PlayerId> = self.players.keys().cloned().collect();
        for id in &ids {
            let events = match self.players.get_mut(id) {
                Some(player) => player.poll_events(),
                None => Vec::new(),
            };
            for event in events {
                self.handle_media_event(id, event)?;
            }
        }
        if self.fault.is_some() {
            return Ok(());
        }
        for id in &ids {
            if let Some(player) = self.players.get_mut(id) {
                if player.has_pending_landing() {
                    player.try_finalize()?;
                }
            }
        }
        self.check_before_start()?;
        self.check_drift()
    }

    /// Resume playback across the group from the current aligned positions.
    pub fn request_play(&mut self) -> Result<()> {
        if self.fault.is_some() {
            return Ok(());
        }
        for player in self.players.values_mut() {
            if player.state() != PlayerState::Paused {
                continue;
            }
            player.set_state(PlayerState::SeekingPlay)?;
            player.play();
        }
        Ok(())
    }

    /// Pause playback across the group.
    pub fn request_pause(&mut self) -> Result<()> {
        if self.fault.is_some() {
            return Ok(());
        }
        for player in self.players.values_mut() {
            if player.state() != PlayerState::Playing {
                continue;
            }
            player.set_state(PlayerState::SeekingPause)?;
            player.pause();
        }
        Ok(())
    }

    /// Seek the whole group to a wall-clock timestamp. The group resumes
    /// playing afterwards if any player was playing when the seek arrived.
    pub fn request_seek(&mut self, timestamp_ms: i64) -> Result<()> {
        if self.fault.is_some() {
            return Ok(());
        }
        let kind = if self.any_in_play() {
            SeekKind::Play
        } else {
            SeekKind::Pause
        };
        self.seek_all(timestamp_ms, kind, AnchorSource::UserSeek, None)
    }

    /// The wall-clock instant the group currently represents: the average
    /// over settled active players, falling back to the anchor.
    pub fn group_timestamp(&self) -> Option<i64> {
        let ts: Vec<i64> = self
            .players
            .values()
            .filter(|p| matches!(p.state(), PlayerState::Playing | PlayerState::Paused))
            .filter_map(|p| p.current_timestamp())
            .collect();
        if ts.is_empty() {
            self.anchor.map(|a| a.timestamp_ms)
        } else {
            Some(ts.iter().sum::<i64>() / ts.len() as i64)
        }
    }

    /// True once every player is settled and the active ones sit within the
    /// convergence tolerance of each other.
    pub fn is_synced(&self) -> bool {
        if self.fault.is_some() || self.players.is_empty() {
            return false;
        }
        if !self.players.values().all(|p| p.state().is_settled()) {
            return false;
        }
        let ts: Vec<i64> = self
            .players
            .values()
            .filter(|p| matches!(p.state(), PlayerState::Playing | PlayerState::Paused))
            .filter_map(|p| p.current_timestamp())
            .collect();
        match (ts.iter().min(), ts.iter().max()) {
            (Some(min), Some(max)) => max - min < self.config.tolerance_ms,
            _ => true,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            players: self
                .players
                .values()
                .map(|p| PlayerSnapshot {
                    id: p.id().clone(),
                    state: p.state(),
                    buffering: p.is_buffering(),
                    timestamp_ms: p.current_timestamp(),
                    generation: p.last_seek_generation(),
                })
                .collect(),
            anchor: self.anchor,
            synced: self.is_synced(),
            fault: self.fault.clone(),
        }
    }

    pub fn player_state(&self, id: &PlayerId) -> Option<PlayerState> {
        self.players.get(id).map(|p| p.state())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn anchor(&self) -> Option<Anchor> {
        self.anchor
    }

    pub fn fault(&self) -> Option<&str> {
        self.fault.as_deref()
    }

    pub fn auth_phase(&self) -> AuthPhase {
        self.auth.phase()
    }

    pub fn auth(&self) -> &AuthGate {
        &self.auth
    }

    /// Complete the credential round trip from the callback fragment and
    /// lift the credential fault so alignment can continue.
    pub fn resume_credentials(&mut self, fragment: &str) -> Result<SessionConfig> {
        let config = self.auth.resume(fragment)?;
        self.fault = None;
        Ok(config)
    }

    pub fn log(&self) -> &DiagnosticLog {
        &self.log
    }

    fn on_metadata(&mut self, id: &PlayerId, metadata: crate::types::StreamMetadata) -> Result<()> {
        if let Some(expected) = &self.expected_identities {
            if !expected.contains(&metadata.identity) {
                let message = format!(
                    "stream identity '{}' is not an expected entrant",
                    metadata.identity
                );
                self.fault = Some(message.clone());
                let state = self.players[id].state();
                self.log.record(id, EventKind::Fault, state, Some(message));
                return Err(Error::StreamIdentityMismatch {
                    identity: metadata.identity,
                    expected: expected.iter().cloned().collect(),
                });
            }
        }
        {
            let player = self
                .players
                .get_mut(id)
                .ok_or_else(|| Error::UnknownPlayer(id.clone()))?;
            player.attach_metadata(metadata);
            player.set_state(PlayerState::Ready)?;
        }
        self.on_player_ready(id)
    }

    /// A player just reached `Ready`. Either the rest of the group is
    /// already aligned (late joiner) or this was the last load and the
    /// initial alignment pass starts now.
    fn on_player_ready(&mut self, id: &PlayerId) -> Result<()> {
        let any_playing = self.any_in_play();
        let any_paused = self
            .players
            .values()
            .any(|p| p.state() == PlayerState::Paused);
        let any_loading = self
            .players
            .values()
            .any(|p| p.state() == PlayerState::Loading);

        if any_playing || any_paused {
            let Some(group) = self.group_timestamp() else {
                return Ok(());
            };
            if any_playing {
                let generation = self.generation;
                let entered = {
                    let player = self
                        .players
                        .get_mut(id)
                        .ok_or_else(|| Error::UnknownPlayer(id.clone()))?;
                    player.seek_to(group, SeekKind::Play, generation)?
                };
                self.log.record(
                    id,
                    EventKind::SeekIssued,
                    entered,
                    Some(format!("join at {group}ms gen {generation}")),
                );
            } else {
                // Paused group: re-anchor at a timestamp the newcomer can
                // actually reach.
                let start = self.players[id].start_timestamp().unwrap_or(group);
                self.seek_all(group.max(start), SeekKind::Pause, AnchorSource::LoadOrder, None)?;
            }
            return Ok(());
        }

        if any_loading {
            return Ok(());
        }

        let Some((target, source)) = resolve_anchor(self.authority_start_ms, self.players.values())
        else {
            return Ok(());
        };
        let state = self.players[id].state();
        self.log.record(
            id,
            EventKind::Synchronizing,
            state,
            Some(format!("all loaded, anchor {target}ms")),
        );
        self.seek_all(target, SeekKind::Start, source, None)
    }

    fn on_seek_landed(
        &mut self,
        id: &PlayerId,
        position: Duration,
        generation: Option<Generation>,
    ) -> Result<()> {
        let (state, last_generation) = {
            let player = &self.players[id];
            (player.state(), player.last_seek_generation())
        };
        match generation {
            Some(g) if state.is_seeking() => {
                if g != last_generation {
                    self.log.record(
                        id,
                        EventKind::StaleGenerationIgnored,
                        state,
                        Some(format!("landed gen {g}, current gen {last_generation}")),
                    );
                    return Ok(());
                }
                self.finalize(id)
            }
            // The landing of a park seek (BeforeStart) or of a pass that
            // already settled; nothing to do.
            Some(_) => Ok(()),
            None => {
                if state.is_seeking() {
                    // User seek racing a coordinated pass; the in-flight
                    // pass wins.
                    return Ok(());
                }
                if !state.is_settled() {
                    return Ok(());
                }
                let Some(start) = self.players[id].start_timestamp() else {
                    return Ok(());
                };
                let target = start + position.as_millis() as i64;
                let kind = if self.any_in_play() {
                    SeekKind::Play
                } else {
                    SeekKind::Pause
                };
                self.seek_all(target, kind, AnchorSource::UserSeek, None)
            }
        }
    }

    fn on_played(&mut self, id: &PlayerId) -> Result<()> {
        let (state, awaiting) = {
            let player = &self.players[id];
            (player.state(), player.awaiting_seek())
        };
        match state {
            PlayerState::SeekingPlay if !awaiting => self.finalize(id),
            // User pressed play on a settled group; resume everyone.
            PlayerState::Paused => self.resume_all(id),
            _ => Ok(()),
        }
    }

    fn on_paused(&mut self, id: &PlayerId) -> Result<()> {
        let (state, awaiting) = {
            let player = &self.players[id];
            (player.state(), player.awaiting_seek())
        };
        match state {
            (PlayerState::SeekingPause | PlayerState::SeekingStart) if !awaiting => {
                self.finalize(id)
            }
            // User paused a playing group; hold everyone.
            PlayerState::Playing => self.hold_all(id),
            _ => Ok(()),
        }
    }

    /// A source refused to load for lack of valid credentials. The session
    /// moves into the credential phase: configuration is stashed through
    /// the gate, the fault latch stops alignment, and the snapshot carries
    /// the condition until [`resume_credentials`] lifts it.
    ///
    /// [`resume_credentials`]: SyncEngine::resume_credentials
    fn on_credentials_rejected(&mut self, id: &PlayerId) -> Result<()> {
        if self.auth.phase() == AuthPhase::AwaitingCredentials {
            return Ok(());
        }
        let message = Error::CredentialsRequired.to_string();
        self.fault = Some(message.clone());
        let state = self.players[id].state();
        self.log.record(id, EventKind::Fault, state, Some(message));
        let config = self.session_config.clone().unwrap_or_default();
        self.auth.challenge(&config)?;
        Err(Error::CredentialsRequired)
    }

    fn on_ended(&mut self, id: &PlayerId) -> Result<()> {
        let restart = self.config.restart_on_end;
        let generation = self.generation;
        let restarted = {
            let player = self
                .players
                .get_mut(id)
                .ok_or_else(|| Error::UnknownPlayer(id.clone()))?;
            player.set_state(PlayerState::AfterEnd)?;
            match player.start_timestamp() {
                Some(start) if restart => {
                    player.set_state(PlayerState::Restarting)?;
                    player.seek_to(start + 1, SeekKind::Start, generation)?;
                    true
                }
                _ => false,
            }
        };
        if restarted {
            self.log.record(
                id,
                EventKind::SeekIssued,
                PlayerState::SeekingStart,
                Some("restart from beginning".into()),
            );
        }
        Ok(())
    }

    /// Resume every paused player. The originator's media is already
    /// playing, so its completion is the one that triggered this pass.
    fn resume_all(&mut self, origin: &PlayerId) -> Result<()> {
        let ids: Vec<PlayerId> = self.players.keys().cloned().collect();
        for pid in &ids {
            let Some(player) = self.players.get_mut(pid) else {
                continue;
            };
            if player.state() != PlayerState::Paused {
                continue;
            }
            player.set_state(PlayerState::SeekingPlay)?;
            if pid == origin {
                player.note_landing();
                player.try_finalize()?;
            } else {
                player.play();
            }
        }
        Ok(())
    }

    /// Pause every playing player. The originator's media is already
    /// paused, so it settles immediately instead of waiting for a
    /// completion that will never come.
    fn hold_all(&mut self, origin: &PlayerId) -> Result<()> {
        let ids: Vec<PlayerId> = self.players.keys().cloned().collect();
        for pid in &ids {
            let Some(player) = self.players.get_mut(pid) else {
                continue;
            };
            if player.state() != PlayerState::Playing {
                continue;
            }
            player.set_state(PlayerState::SeekingPause)?;
            if pid == origin {
                player.note_landing();
                player.try_finalize()?;
            } else {
                player.pause();
            }
        }
        Ok(())
    }

    /// Complete a landed transition, or log the hold if buffering blocks it.
    fn finalize(&mut self, id: &PlayerId) -> Result<()> {
        let (finalized, held, state) = {
            let player = self
                .players
                .get_mut(id)
                .ok_or_else(|| Error::UnknownPlayer(id.clone()))?;
            player.note_landing();
            let finalized = player.try_finalize()?;
            (finalized, player.has_pending_landing(), player.state())
        };
        if finalized.is_none() && held {
            self.log.record(id, EventKind::BufferingHold, state, None);
        }
        Ok(())
    }

    /// Bump the generation and replace the anchor wholesale.
    fn retarget(&mut self, timestamp_ms: i64, source: AnchorSource) -> Generation {
        self.generation = self.generation.next();
        self.anchor = Some(Anchor {
            timestamp_ms,
            generation: self.generation,
            source,
        });
        self.generation
    }

    /// One coordinated alignment pass over every loaded player.
    fn seek_all(
        &mut self,
        timestamp_ms: i64,
        kind: SeekKind,
        source: AnchorSource,
        except: Option<&PlayerId>,
    ) -> Result<()> {
        let generation = self.retarget(timestamp_ms, source);
        let ids: Vec<PlayerId> = self.players.keys().cloned().collect();
        for id in &ids {
            if Some(id) == except {
                continue;
            }
            let entered = {
                let Some(player) = self.players.get_mut(id) else {
                    continue;
                };
                if player.state() == PlayerState::Loading {
                    continue;
                }
                player.seek_to(timestamp_ms, kind, generation)?
            };
            self.log.record(
                id,
                EventKind::SeekIssued,
                entered,
                Some(format!("target {timestamp_ms}ms gen {generation}")),
            );
        }
        Ok(())
    }

    /// Unpark `BeforeStart` players whose start has come due.
    fn check_before_start(&mut self) -> Result<()> {
        let Some(group) = self.group_timestamp() else {
            return Ok(());
        };
        let any_playing = self.any_in_play();
        let generation = self.generation;
        let due: Vec<PlayerId> = self
            .players
            .iter()
            .filter(|(_, p)| p.state() == PlayerState::BeforeStart)
            .filter(|(_, p)| p.start_timestamp().is_some_and(|s| group >= s))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &due {
            let kind = if any_playing {
                SeekKind::Play
            } else {
                SeekKind::Pause
            };
            let entered = {
                let Some(player) = self.players.get_mut(id) else {
                    continue;
                };
                player.seek_to(group, kind, generation)?
            };
            self.log.record(
                id,
                EventKind::SeekIssued,
                entered,
                Some(format!("start due at {group}ms")),
            );
        }
        Ok(())
    }

    /// Flag players that drifted beyond tolerance from the playing average
    /// and issue them corrective seeks.
    fn check_drift(&mut self) -> Result<()> {
        let playing: Vec<(PlayerId, i64)> = self
            .players
            .iter()
            .filter(|(_, p)| p.state() == PlayerState::Playing)
            .filter_map(|(id, p)| p.current_timestamp().map(|t| (id.clone(), t)))
            .collect();
        if playing.len() < 2 {
            return Ok(());
        }
        let target = playing.iter().map(|(_, t)| t).sum::<i64>() / playing.len() as i64;
        let drifters: Vec<(PlayerId, i64)> = playing
            .into_iter()
            .filter(|(_, t)| (t - target).abs() > self.config.tolerance_ms)
            .collect();
        if drifters.is_empty() {
            return Ok(());
        }
        let generation = self.retarget(target, AnchorSource::DriftCorrection);
        for (id, at) in &drifters {
            let entered = {
                let Some(player) = self.players.get_mut(id) else {
                    continue;
                };
                player.set_state(PlayerState::Async)?;
                player.seek_to(target, SeekKind::Play, generation)?
            };
            self.log.record(
                id,
                EventKind::DriftDetected,
                entered,
                Some(format!("at {at}ms, target {target}ms")),
            );
        }
        Ok(())
    }

    fn any_in_play(&self) -> bool {
        self.players
            .values()
            .any(|p| matches!(p.state(), PlayerState::Playing | PlayerState::SeekingPlay))
    }
}
