//! Session-level scenarios: the async loop, bounded state waits, and the
//! buffering-aware wait semantics.

use std::time::Duration;
use vodsync_core::{
    EngineConfig, Error, EventKind, PlayerId, PlayerState, Session, SimulatedMedia,
    StreamMetadata,
};

const BASE_START_MS: i64 = 1_745_837_098_000;
const WAIT: Duration = Duration::from_secs(5);

fn metadata(index: usize, started_at_ms: i64) -> StreamMetadata {
    StreamMetadata {
        identity: format!("streamer{index}"),
        started_at_ms,
        duration_ms: 3_600_000,
    }
}

async fn aligned_session(starts: &[i64]) -> (Session, Vec<SimulatedMedia>) {
    let session = Session::spawn(EngineConfig::default());
    let mut media = Vec::new();
    for (index, &started_at_ms) in starts.iter().enumerate() {
        let m = SimulatedMedia::new(metadata(index, started_at_ms));
        session
            .attach(PlayerId::from_index(index), m.handle(), None)
            .await
            .unwrap();
        media.push(m);
    }
    for m in &media {
        m.deliver_metadata();
    }
    for index in 0..starts.len() {
        session
            .wait_for_state(&PlayerId::from_index(index), PlayerState::Paused, WAIT)
            .await
            .unwrap();
    }
    (session, media)
}

#[tokio::test]
async fn a_session_aligns_plays_and_pauses() {
    let (session, media) = aligned_session(&[BASE_START_MS, BASE_START_MS + 9_000]).await;
    assert!(session.snapshot().synced);

    session.play().await.unwrap();
    for index in 0..2 {
        session
            .wait_for_state(&PlayerId::from_index(index), PlayerState::Playing, WAIT)
            .await
            .unwrap();
    }
    for m in &media {
        m.advance(Duration::from_secs(10));
    }

    session.pause().await.unwrap();
    for index in 0..2 {
        session
            .wait_for_state(&PlayerId::from_index(index), PlayerState::Paused, WAIT)
            .await
            .unwrap();
    }
    session.wait_until_synced(WAIT).await.unwrap();
    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn a_session_seek_moves_every_player() {
    let (session, _media) = aligned_session(&[BASE_START_MS, BASE_START_MS + 3_000]).await;

    let target = BASE_START_MS + 240_000;
    session.seek_to(target).await.unwrap();
    session.wait_until_synced(WAIT).await.unwrap();

    let snapshot = session.snapshot();
    for player in &snapshot.players {
        assert_eq!(player.state, PlayerState::Paused);
        assert!((player.timestamp_ms.unwrap() - target).abs() < 1000);
    }
    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn wait_for_state_times_out_with_the_observed_state() {
    let (session, _media) = aligned_session(&[BASE_START_MS]).await;

    let err = session
        .wait_for_state(
            &PlayerId::from_index(0),
            PlayerState::Playing,
            Duration::from_millis(100),
        )
        .await
        .unwrap_err();
    match err {
        Error::StateWaitTimeout {
            expected, actual, ..
        } => {
            assert_eq!(expected, PlayerState::Playing);
            assert_eq!(actual, PlayerState::Paused);
        }
        other => panic!("expected StateWaitTimeout, got {other}"),
    }
    assert!(err.is_recoverable());
    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn buffering_holds_the_landing_and_surfaces_as_a_stall() {
    let (session, media) = aligned_session(&[BASE_START_MS]).await;
    let id = PlayerId::from_index(0);

    media[0].set_buffering(true);
    session.seek_to(BASE_START_MS + 120_000).await.unwrap();

    let err = session
        .wait_for_state(&id, PlayerState::Paused, Duration::from_millis(200))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::BufferingStall {
            state: PlayerState::SeekingPause,
            ..
        }
    ));

    media[0].set_buffering(false);
    session
        .wait_for_state(&id, PlayerState::Paused, WAIT)
        .await
        .unwrap();
    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn the_diagnostic_log_is_readable_through_the_session() {
    let (session, _media) = aligned_session(&[BASE_START_MS, BASE_START_MS + 2_000]).await;
    session.seek_to(BASE_START_MS + 60_000).await.unwrap();
    session.wait_until_synced(WAIT).await.unwrap();

    let records = session.event_log().await.unwrap();
    assert!(records.iter().any(|r| r.kind == EventKind::MetadataLoaded));
    assert!(records.iter().any(|r| r.kind == EventKind::SeekIssued));

    let rendered = session.render_log().await.unwrap();
    assert!(rendered.contains("seek_issued"));
    assert!(rendered.lines().count() >= records.len());
    session.shutdown().await.unwrap();
}
