//! CLI command implementations

use crate::output::{format_ms, format_opt_ms, to_json, OutputFormat};
use anyhow::{bail, Context};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;
use url::Url;
use vodsync_core::{
    EngineConfig, EventDetails, PlayerState, Session, SessionConfig, SimulatedMedia,
    StreamMetadata, TimingAuthorityClient, ALIGN_EPOCH_MS,
};

#[derive(Serialize)]
struct PlanPlayer {
    id: String,
    source: String,
    offset_ms: Option<i64>,
    effective_start_ms: Option<i64>,
}

#[derive(Serialize)]
struct PlanReport {
    players: Vec<PlanPlayer>,
    event_ref: Option<String>,
    anchor_ms: Option<i64>,
    event: Option<EventReport>,
}

#[derive(Serialize)]
struct EventReport {
    id: String,
    entrants: Vec<String>,
    started_at_ms: i64,
}

impl From<EventDetails> for EventReport {
    fn from(details: EventDetails) -> Self {
        Self {
            id: details.id,
            entrants: details.entrants,
            started_at_ms: details.started_at_ms,
        }
    }
}

fn parse_session_input(input: &str) -> anyhow::Result<SessionConfig> {
    match Url::parse(input) {
        Ok(url) => {
            let (config, _credentials) = SessionConfig::from_url(&url)?;
            Ok(config)
        }
        Err(_) => Ok(SessionConfig::from_query(input)?),
    }
}

/// Parse a session URL and print the derived playback plan
pub async fn plan(
    input: &str,
    resolve: bool,
    authority: &str,
    format: &str,
) -> anyhow::Result<()> {
    let config = parse_session_input(input)?;
    debug!(players = config.players.len(), "parsed session configuration");
    if config.players.is_empty() {
        bail!("no players configured in '{input}'");
    }

    let event = if resolve {
        match &config.event_ref {
            Some(reference) => {
                let base = Url::parse(authority).context("invalid authority base URL")?;
                let client = TimingAuthorityClient::new(base);
                Some(EventReport::from(client.resolve(reference).await?))
            }
            None => bail!("--resolve given but the session has no event reference"),
        }
    } else {
        None
    };

    // Without an authority event the anchor is only predictable when every
    // player carries an explicit offset.
    let anchor_ms = match &event {
        Some(e) => Some(e.started_at_ms),
        None => config
            .players
            .iter()
            .map(|p| p.offset_ms.map(|o| ALIGN_EPOCH_MS + o))
            .collect::<Option<Vec<i64>>>()
            .and_then(|starts| starts.into_iter().max()),
    };

    let report = PlanReport {
        players: config
            .players
            .iter()
            .map(|p| PlanPlayer {
                id: p.id.to_string(),
                source: p.source.clone(),
                offset_ms: p.offset_ms,
                effective_start_ms: p.offset_ms.map(|o| ALIGN_EPOCH_MS + o),
            })
            .collect(),
        event_ref: config.event_ref.clone(),
        anchor_ms,
        event,
    };

    if let OutputFormat::Json = OutputFormat::from(format) {
        println!("{}", to_json(&report));
        return Ok(());
    }

    println!("Playback plan:");
    for player in &report.players {
        println!(
            "  {} source={} offset={} start={}",
            player.id,
            player.source,
            player
                .offset_ms
                .map(|o| format!("{o}ms"))
                .unwrap_or_else(|| "-".to_string()),
            format_opt_ms(player.effective_start_ms),
        );
    }
    if let Some(reference) = &report.event_ref {
        println!("  event: {reference}");
    }
    match report.anchor_ms {
        Some(anchor) => println!("  anchor: {}", format_ms(anchor)),
        None => println!("  anchor: resolved at load time (no offsets or event)"),
    }
    if let Some(event) = &report.event {
        println!("\nTiming authority event {}:", event.id);
        println!("  started: {}", format_ms(event.started_at_ms));
        println!("  entrants: {}", event.entrants.join(", "));
    }
    Ok(())
}

/// Query the timing authority for a synchronizable event
pub async fn resolve_event(reference: &str, authority: &str, format: &str) -> anyhow::Result<()> {
    let reference = vodsync_core::parse_event_ref(reference)?;
    let base = Url::parse(authority).context("invalid authority base URL")?;
    let client = TimingAuthorityClient::new(base);
    let details = EventReport::from(client.resolve(&reference).await?);

    if let OutputFormat::Json = OutputFormat::from(format) {
        println!("{}", to_json(&details));
        return Ok(());
    }

    println!("Event: {}", details.id);
    println!("  started: {}", format_ms(details.started_at_ms));
    println!("  entrants ({}):", details.entrants.len());
    for entrant in &details.entrants {
        println!("    {entrant}");
    }
    Ok(())
}

/// Run a simulated session from a query string and print the event log
pub async fn simulate(
    query: &str,
    play_seconds: u64,
    seek_to: Option<i64>,
    format: &str,
) -> anyhow::Result<()> {
    let config = SessionConfig::from_query(query)?;
    if config.players.is_empty() {
        bail!("no players configured in '{query}'");
    }

    let engine_config = EngineConfig::default();
    let session = Session::spawn(engine_config);
    let wait = session.default_timeout();

    // Synthetic streams: four hours long, staggered natural starts so the
    // load-order anchor path is exercised when no offsets are given.
    let mut media = Vec::new();
    for (index, spec) in config.players.iter().enumerate() {
        let metadata = StreamMetadata {
            identity: format!("streamer{index}"),
            started_at_ms: ALIGN_EPOCH_MS + (index as i64) * 5_000,
            duration_ms: 4 * 3_600_000,
        };
        let source = SimulatedMedia::new(metadata);
        session
            .attach(spec.id.clone(), source.handle(), spec.offset_ms)
            .await?;
        media.push(source);
    }

    for source in &media {
        source.deliver_metadata();
    }
    for spec in &config.players {
        session
            .wait_for_state(&spec.id, PlayerState::Paused, wait)
            .await?;
    }
    println!("Aligned {} players, playing {play_seconds}s...", media.len());

    session.play().await?;
    for spec in &config.players {
        session
            .wait_for_state(&spec.id, PlayerState::Playing, wait)
            .await?;
    }
    for second in 0..play_seconds {
        for source in &media {
            source.advance(Duration::from_secs(1));
        }
        if seek_to.is_some() && second == play_seconds / 2 {
            if let Some(target) = seek_to {
                session.seek_to(target).await?;
            }
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    session.pause().await?;
    session.wait_until_synced(wait).await?;

    let snapshot = session.snapshot();
    if let OutputFormat::Json = OutputFormat::from(format) {
        println!("{}", to_json(&snapshot));
    } else {
        println!("\nFinal player states:");
        for player in &snapshot.players {
            println!(
                "  {} {} at {}",
                player.id,
                player.state,
                format_opt_ms(player.timestamp_ms),
            );
        }
        if let Some(anchor) = snapshot.anchor {
            println!(
                "  anchor: {} (generation {})",
                format_ms(anchor.timestamp_ms),
                anchor.generation
            );
        }
        println!("\nEvent log:");
        print!("{}", session.render_log().await?);
    }

    session.shutdown().await?;
    Ok(())
}
