//! Async session wrapper
//!
//! Runs the synchronous engine on one tokio task, fed by an `mpsc` command
//! channel and publishing [`SessionSnapshot`]s on a `watch` channel. The
//! pump ticks at the configured interval; every command and every tick
//! publishes a fresh snapshot.

use crate::authority::EventDetails;
use crate::diagnostics::EventRecord;
use crate::engine::SyncEngine;
use crate::error::{Error, Result};
use crate::media::MediaHandle;
use crate::types::{EngineConfig, PlayerId, PlayerState, SessionId, SessionSnapshot};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

enum Command {
    Attach {
        id: PlayerId,
        offset_ms: Option<i64>,
        handle: Box<dyn MediaHandle>,
    },
    Play,
    Pause,
    SeekTo(i64),
    BindEvent(EventDetails),
    EventLog(oneshot::Sender<Vec<EventRecord>>),
    RenderLog(oneshot::Sender<String>),
    Shutdown,
}

pub struct Session {
    id: SessionId,
    config: EngineConfig,
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<SessionSnapshot>,
    task: JoinHandle<()>,
}

impl Session {
    pub fn spawn(config: EngineConfig) -> Self {
        let id = SessionId::new();
        let (commands, mut command_rx) = mpsc::channel::<Command>(32);
        let mut engine = SyncEngine::new(config.clone());
        let (snapshot_tx, snapshots) = watch::channel(engine.snapshot());
        let pump_interval = Duration::from_millis(config.pump_interval_ms);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(pump_interval);
            loop {
                tokio::select! {
                    command = command_rx.recv() => {
                        match command {
                            Some(Command::Attach { id, offset_ms, handle }) => {
                                if let Err(err) = engine.attach(id, handle, offset_ms) {
                                    warn!(error = %err, "attach rejected");
                                }
                            }
                            Some(Command::Play) => {
                                if let Err(err) = engine.request_play() {
                                    warn!(error = %err, "play request failed");
                                }
                            }
                            Some(Command::Pause) => {
                                if let Err(err) = engine.request_pause() {
                                    warn!(error = %err, "pause request failed");
                                }
                            }
                            Some(Command::SeekTo(timestamp_ms)) => {
                                if let Err(err) = engine.request_seek(timestamp_ms) {
                                    warn!(error = %err, "seek request failed");
                                }
                            }
                            Some(Command::BindEvent(details)) => {
                                engine.bind_event(&details);
                            }
                            Some(Command::EventLog(reply)) => {
                                let _ = reply.send(engine.log().records().to_vec());
                            }
                            Some(Command::RenderLog(reply)) => {
                                let _ = reply.send(engine.log().render());
                            }
                            Some(Command::Shutdown) | None => break,
                        }
                        let _ = snapshot_tx.send(engine.snapshot());
                    }
                    _ = ticker.tick() => {
                        if let Err(err) = engine.pump() {
                            // The fault is carried in the snapshot; the loop
                            // keeps serving log and snapshot reads.
                            warn!(error = %err, code = err.error_code(), "pump error");
                        }
                        let _ = snapshot_tx.send(engine.snapshot());
                    }
                }
            }
            info!("session loop stopped");
        });

        info!(session = %id, "session spawned");
        Self {
            id,
            config,
            commands,
            snapshots,
            task,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Default bound for state-wait operations, from the engine config.
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.config.state_wait_timeout_ms)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    pub async fn attach(
        &self,
        id: PlayerId,
        handle: Box<dyn MediaHandle>,
        offset_ms: Option<i64>,
    ) -> Result<()> {
        self.send(Command::Attach {
            id,
            offset_ms,
            handle,
        })
        .await
    }

    pub async fn play(&self) -> Result<()> {
        self.send(Command::Play).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.send(Command::Pause).await
    }

    pub async fn seek_to(&self, timestamp_ms: i64) -> Result<()> {
        self.send(Command::SeekTo(timestamp_ms)).await
    }

    pub async fn bind_event(&self, details: EventDetails) -> Result<()> {
        self.send(Command::BindEvent(details)).await
    }

    /// Full diagnostic log so far.
    pub async fn event_log(&self) -> Result<Vec<EventRecord>> {
        let (reply, response) = oneshot::channel();
        self.send(Command::EventLog(reply)).await?;
        response
            .await
            .map_err(|_| Error::Internal("session task terminated".into()))
    }

    /// Tab-separated rendering of the diagnostic log.
    pub async fn render_log(&self) -> Result<String> {
        let (reply, response) = oneshot::channel();
        self.send(Command::RenderLog(reply)).await?;
        response
            .await
            .map_err(|_| Error::Internal("session task terminated".into()))
    }

    /// Wait until a player reaches a state, bounded by `timeout`.
    ///
    /// Refuses to report a match while the player's handle is buffering; on
    /// timeout the error carries the last observed state and buffering flag
    /// so a stall is distinguishable from a wrong state.
    #[instrument(skip(self), fields(session = %self.id))]
    pub async fn wait_for_state(
        &self,
        id: &PlayerId,
        expected: PlayerState,
        timeout: Duration,
    ) -> Result<()> {
        let poll = Duration::from_millis(self.config.poll_interval_ms);
        let deadline = tokio::time::Instant::now() + timeout;
        let mut actual = PlayerState::Loading;
        let mut buffering = false;
        loop {
            {
                let snapshot = self.snapshots.borrow();
                if let Some(player) = snapshot.player(id) {
                    actual = player.state;
                    buffering = player.buffering;
                    if player.state == expected && !player.buffering {
                        return Ok(());
                    }
                }
            }
            if tokio::time::Instant::now() >= deadline {
                if buffering && actual.is_seeking() {
                    return Err(Error::BufferingStall {
                        player: id.clone(),
                        state: actual,
                    });
                }
                return Err(Error::StateWaitTimeout {
                    player: id.clone(),
                    expected,
                    actual,
                    buffering,
                    waited_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// Wait until every player is settled within tolerance.
    #[instrument(skip(self), fields(session = %self.id))]
    pub async fn wait_until_synced(&self, timeout: Duration) -> Result<()> {
        let poll = Duration::from_millis(self.config.poll_interval_ms);
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.snapshots.borrow().synced {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                let snapshot = self.snapshot();
                return Err(Error::Internal(format!(
                    "session not synced after {}ms: {:?}",
                    timeout.as_millis(),
                    snapshot
                        .players
                        .iter()
                        .map(|p| (p.id.clone(), p.state))
                        .collect::<Vec<_>>()
                )));
            }
            tokio::time::sleep(poll).await;
        }
    }

    pub async fn shutdown(self) -> Result<()> {
        let _ = self.commands.send(Command::Shutdown).await;
        self.task
            .await
            .map_err(|_| Error::Internal("session task panicked".into()))
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| Error::Internal("session task terminated".into()))
    }
}
