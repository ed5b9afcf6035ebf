//! End-to-end engine scenarios against the simulated media source.

use std::time::Duration;
use vodsync_core::{
    AnchorSource, AuthGate, AuthPhase, Credentials, EngineConfig, EventDetails, EventKind,
    PlayerId, PlayerState, SessionConfig, SimulatedMedia, StreamMetadata, SyncEngine,
    ALIGN_EPOCH_MS,
};

const BASE_START_MS: i64 = 1_745_837_098_000;

fn metadata(index: usize, started_at_ms: i64) -> StreamMetadata {
    StreamMetadata {
        identity: format!("streamer{index}"),
        started_at_ms,
        duration_ms: 3_600_000,
    }
}

fn build(specs: &[(i64, Option<i64>)]) -> (SyncEngine, Vec<SimulatedMedia>) {
    build_with(EngineConfig::default(), specs)
}

fn build_with(
    config: EngineConfig,
    specs: &[(i64, Option<i64>)],
) -> (SyncEngine, Vec<SimulatedMedia>) {
    let mut engine = SyncEngine::new(config);
    let mut media = Vec::new();
    for (index, &(started_at_ms, offset_ms)) in specs.iter().enumerate() {
        let m = SimulatedMedia::new(metadata(index, started_at_ms));
        engine
            .attach(PlayerId::from_index(index), m.handle(), offset_ms)
            .unwrap();
        media.push(m);
    }
    (engine, media)
}

fn settle(engine: &mut SyncEngine) {
    for _ in 0..10 {
        engine.pump().unwrap();
    }
}

fn spread(engine: &SyncEngine) -> i64 {
    let ts: Vec<i64> = engine
        .snapshot()
        .players
        .iter()
        .filter(|p| matches!(p.state, PlayerState::Playing | PlayerState::Paused))
        .filter_map(|p| p.timestamp_ms)
        .collect();
    match (ts.iter().min(), ts.iter().max()) {
        (Some(min), Some(max)) => max - min,
        _ => 0,
    }
}

#[test]
fn uneven_loads_converge_within_tolerance() {
    let (mut engine, media) = build(&[
        (BASE_START_MS, None),
        (BASE_START_MS + 45_000, None),
        (BASE_START_MS + 12_000, None),
    ]);

    // Load completion order differs from slot order.
    media[2].deliver_metadata();
    settle(&mut engine);
    media[0].deliver_metadata();
    settle(&mut engine);
    assert!(engine.anchor().is_none());

    media[1].deliver_metadata();
    settle(&mut engine);

    let anchor = engine.anchor().unwrap();
    assert_eq!(anchor.timestamp_ms, BASE_START_MS + 45_000);
    assert_eq!(anchor.source, AnchorSource::LoadOrder);
    for index in 0..3 {
        assert_eq!(
            engine.player_state(&PlayerId::from_index(index)),
            Some(PlayerState::Paused)
        );
    }
    assert!(engine.is_synced());
    assert!(spread(&engine) < 1000);
}

#[test]
fn explicit_offsets_anchor_at_the_alignment_epoch() {
    let offset0: i64 = 245_837_252_000;
    let offset1: i64 = 245_837_312_000;
    let (mut engine, media) = build(&[
        (BASE_START_MS, Some(offset0)),
        (BASE_START_MS + 7_000, Some(offset1)),
    ]);

    media[0].deliver_metadata();
    media[1].deliver_metadata();
    settle(&mut engine);

    let anchor = engine.anchor().unwrap();
    assert_eq!(anchor.timestamp_ms, ALIGN_EPOCH_MS + offset1);
    assert_eq!(anchor.source, AnchorSource::Offsets);
    assert!(engine.is_synced());

    // The earlier-offset player has played (offset1 - offset0) further into
    // its own stream to reach the same wall-clock instant.
    assert_eq!(media[0].position(), Duration::from_millis(60_000));
    assert!(spread(&engine) < 1000);
}

#[test]
fn re_seeking_the_current_position_is_idempotent() {
    let (mut engine, media) = build(&[(BASE_START_MS, None), (BASE_START_MS + 5_000, None)]);
    media[0].deliver_metadata();
    media[1].deliver_metadata();
    settle(&mut engine);

    let before = engine.group_timestamp().unwrap();
    engine.request_seek(before).unwrap();
    settle(&mut engine);

    for index in 0..2 {
        assert_eq!(
            engine.player_state(&PlayerId::from_index(index)),
            Some(PlayerState::Paused)
        );
    }
    assert!(engine.is_synced());
    assert!((engine.group_timestamp().unwrap() - before).abs() < 1000);
}

#[test]
fn ten_player_seek_thrash_settles_on_the_last_target() {
    let specs: Vec<(i64, Option<i64>)> = (0..10)
        .map(|i| (BASE_START_MS + (i as i64) * 3_000, None))
        .collect();
    let (mut engine, media) = build(&specs);
    for m in &media {
        m.deliver_metadata();
    }
    settle(&mut engine);
    assert!(engine.is_synced());

    // Five rapid retargets with no pump in between; only the last pass may
    // settle anything.
    let final_target = BASE_START_MS + 500_000;
    for step in 1..=5 {
        engine
            .request_seek(BASE_START_MS + 100_000 * step)
            .unwrap();
    }
    assert_eq!(engine.anchor().unwrap().timestamp_ms, final_target);
    settle(&mut engine);

    for index in 0..10 {
        assert_eq!(
            engine.player_state(&PlayerId::from_index(index)),
            Some(PlayerState::Paused)
        );
    }
    assert!(engine.is_synced());
    assert!((engine.group_timestamp().unwrap() - final_target).abs() < 1000);
    assert!(
        engine
            .log()
            .of_kind(EventKind::StaleGenerationIgnored)
            .count()
            > 0
    );
}

#[test]
fn a_user_seek_on_one_player_realigns_the_group() {
    let (mut engine, media) = build(&[(BASE_START_MS, None), (BASE_START_MS + 5_000, None)]);
    media[0].deliver_metadata();
    media[1].deliver_metadata();
    settle(&mut engine);

    media[0].user_seek(Duration::from_secs(300));
    settle(&mut engine);

    let expected = BASE_START_MS + 300_000;
    assert!(engine.is_synced());
    assert!((engine.group_timestamp().unwrap() - expected).abs() < 1000);
    assert_eq!(engine.anchor().unwrap().source, AnchorSource::UserSeek);
}

#[test]
fn play_and_pause_commands_move_the_whole_group() {
    let (mut engine, media) = build(&[(BASE_START_MS, None), (BASE_START_MS + 5_000, None)]);
    media[0].deliver_metadata();
    media[1].deliver_metadata();
    settle(&mut engine);

    engine.request_play().unwrap();
    settle(&mut engine);
    for index in 0..2 {
        assert_eq!(
            engine.player_state(&PlayerId::from_index(index)),
            Some(PlayerState::Playing)
        );
    }

    for m in &media {
        m.advance(Duration::from_secs(30));
    }
    engine.request_pause().unwrap();
    settle(&mut engine);
    for index in 0..2 {
        assert_eq!(
            engine.player_state(&PlayerId::from_index(index)),
            Some(PlayerState::Paused)
        );
    }
    assert!(engine.is_synced());
}

#[test]
fn a_user_play_on_one_player_resumes_everyone() {
    let (mut engine, media) = build(&[(BASE_START_MS, None), (BASE_START_MS + 5_000, None)]);
    media[0].deliver_metadata();
    media[1].deliver_metadata();
    settle(&mut engine);

    media[1].user_play();
    settle(&mut engine);

    for index in 0..2 {
        assert_eq!(
            engine.player_state(&PlayerId::from_index(index)),
            Some(PlayerState::Playing)
        );
    }
    assert!(media[0].is_playing());
}

#[test]
fn drifted_players_are_pulled_back_to_the_group() {
    let (mut engine, media) = build(&[
        (BASE_START_MS, None),
        (BASE_START_MS + 1_000, None),
        (BASE_START_MS + 2_000, None),
    ]);
    for m in &media {
        m.deliver_metadata();
    }
    settle(&mut engine);
    engine.request_play().unwrap();
    settle(&mut engine);

    for m in &media {
        m.advance(Duration::from_secs(60));
    }
    // One player runs five seconds hot.
    media[0].advance(Duration::from_secs(5));
    settle(&mut engine);

    assert!(engine.log().of_kind(EventKind::DriftDetected).count() > 0);
    for index in 0..3 {
        assert_eq!(
            engine.player_state(&PlayerId::from_index(index)),
            Some(PlayerState::Playing)
        );
    }
    assert!(spread(&engine) < 1000);
}

#[test]
fn an_exhausted_stream_parks_after_its_end() {
    let (mut engine, media) = build(&[(BASE_START_MS, None)]);
    media[0].deliver_metadata();
    settle(&mut engine);
    engine.request_play().unwrap();
    settle(&mut engine);

    media[0].advance(Duration::from_secs(3601));
    settle(&mut engine);
    assert_eq!(
        engine.player_state(&PlayerId::from_index(0)),
        Some(PlayerState::AfterEnd)
    );
}

#[test]
fn restart_on_end_returns_to_the_beginning() {
    let config = EngineConfig {
        restart_on_end: true,
        ..EngineConfig::default()
    };
    let (mut engine, media) = build_with(config, &[(BASE_START_MS, None)]);
    media[0].deliver_metadata();
    settle(&mut engine);
    engine.request_play().unwrap();
    settle(&mut engine);

    media[0].advance(Duration::from_secs(3601));
    settle(&mut engine);

    assert_eq!(
        engine.player_state(&PlayerId::from_index(0)),
        Some(PlayerState::Paused)
    );
    assert!(media[0].position() < Duration::from_secs(1));
}

#[test]
fn a_late_starting_stream_waits_before_its_start() {
    let (mut engine, media) = build(&[(BASE_START_MS, None), (BASE_START_MS + 60_000, None)]);
    engine.bind_event(&EventDetails {
        id: "ootr/wonderful-krossbones-7951".into(),
        entrants: vec!["streamer0".into(), "streamer1".into()],
        started_at_ms: BASE_START_MS,
    });
    media[0].deliver_metadata();
    media[1].deliver_metadata();
    settle(&mut engine);

    assert_eq!(engine.anchor().unwrap().source, AnchorSource::Authority);
    assert_eq!(
        engine.player_state(&PlayerId::from_index(0)),
        Some(PlayerState::Paused)
    );
    assert_eq!(
        engine.player_state(&PlayerId::from_index(1)),
        Some(PlayerState::BeforeStart)
    );

    engine.request_play().unwrap();
    settle(&mut engine);
    media[0].advance(Duration::from_secs(61));
    settle(&mut engine);

    assert_eq!(
        engine.player_state(&PlayerId::from_index(1)),
        Some(PlayerState::Playing)
    );
    assert!(spread(&engine) < 1000);
}

#[test]
fn identity_mismatch_faults_and_stops_alignment() {
    let (mut engine, media) = build(&[(BASE_START_MS, None), (BASE_START_MS, None)]);
    engine.bind_event(&EventDetails {
        id: "ootr/wonderful-krossbones-7951".into(),
        entrants: vec!["streamer0".into(), "somebodyelse".into()],
        started_at_ms: BASE_START_MS,
    });

    media[0].deliver_metadata();
    settle(&mut engine);
    media[1].deliver_metadata();
    let err = engine.pump().unwrap_err();
    assert_eq!(err.error_code(), "IDENTITY_MISMATCH");
    assert!(err.is_fatal());

    assert!(engine.snapshot().fault.is_some());
    assert!(!engine.is_synced());
    engine.request_seek(BASE_START_MS + 60_000).unwrap();
    assert!(engine.anchor().is_none());
    assert!(engine.log().of_kind(EventKind::Fault).count() > 0);
}

#[test]
fn a_credentials_rejection_gates_the_session_until_resumed() {
    let (mut engine, media) = build(&[(BASE_START_MS, None), (BASE_START_MS + 5_000, None)]);
    let config = SessionConfig::from_query("player0=2444833212&player1=2444833835").unwrap();
    engine.bind_config(config.clone());

    media[0].deliver_metadata();
    settle(&mut engine);

    // The second source comes back unauthorized.
    media[1].reject_credentials();
    let err = engine.pump().unwrap_err();
    assert_eq!(err.error_code(), "CREDENTIALS_REQUIRED");
    assert_eq!(engine.auth_phase(), AuthPhase::AwaitingCredentials);
    assert!(engine
        .snapshot()
        .fault
        .unwrap()
        .contains("Credentials required"));
    assert!(
        engine
            .log()
            .of_kind(EventKind::CredentialsRejected)
            .count()
            > 0
    );

    // Alignment is held while the round trip is pending.
    engine.request_seek(BASE_START_MS + 60_000).unwrap();
    assert!(engine.anchor().is_none());

    let restored = engine
        .resume_credentials("scope=&access_token=tok123")
        .unwrap();
    assert_eq!(restored, config);
    assert_eq!(engine.auth_phase(), AuthPhase::Authenticated);
    assert!(engine.snapshot().fault.is_none());

    // With credentials in hand the source loads and the session aligns.
    media[1].deliver_metadata();
    settle(&mut engine);
    for index in 0..2 {
        assert_eq!(
            engine.player_state(&PlayerId::from_index(index)),
            Some(PlayerState::Paused)
        );
    }
    assert!(engine.is_synced());
}

#[test]
fn the_credential_round_trip_reproduces_the_session() {
    let offset0: i64 = 245_837_252_000;
    let offset1: i64 = 245_837_312_000;
    let original = SessionConfig::from_query(&format!(
        "player0=2444833212&offsetplayer0={offset0}&player1=2444833835&offsetplayer1={offset1}"
    ))
    .unwrap();

    let mut gate = AuthGate::new(None);
    gate.challenge(&original).unwrap();
    let restored = gate
        .resume("scope=&access_token=tok123&client_id=cid")
        .unwrap();
    assert_eq!(restored, original);
    assert_eq!(
        gate.credentials(),
        Some(&Credentials {
            access_token: "tok123".into(),
            client_id: Some("cid".into()),
        })
    );

    // The restored configuration drives a session all the way to Paused.
    let mut engine = SyncEngine::new(EngineConfig::default());
    let mut media = Vec::new();
    for (index, spec) in restored.players.iter().enumerate() {
        let m = SimulatedMedia::new(metadata(index, BASE_START_MS));
        engine
            .attach(spec.id.clone(), m.handle(), spec.offset_ms)
            .unwrap();
        media.push(m);
    }
    for m in &media {
        m.deliver_metadata();
    }
    settle(&mut engine);

    assert_eq!(
        engine.anchor().unwrap().timestamp_ms,
        ALIGN_EPOCH_MS + offset1
    );
    for spec in &restored.players {
        assert_eq!(engine.player_state(&spec.id), Some(PlayerState::Paused));
    }
    assert!(engine.is_synced());
}
