mod clock;

use crate::clock::ClockEngine;
use catmusic_core::time::{format_clock, format_clock_detailed, format_lrc_timestamp};
use catmusic_core::{
    lyric_tag, CoreError, DurationExt, EngineSignal, LoadId, NoFocus, PlaybackSession, PlayerConfig,
    SessionEvent, SessionState, SyncLoop, Timeline, TrackRef,
};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Extra time after the last lyric line when no duration is given
const TRAILING_SILENCE: Duration = Duration::from_secs(5);

const PREVIEW_URL: &str = "clock://preview";

struct PreviewArgs {
    lrc_path: PathBuf,
    duration: Option<Duration>,
}

fn main() {
    let config = load_config();
    init_tracing(config.logging.file_enabled);

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}");
            eprintln!("Usage: catmusic <lyrics.lrc> [duration-secs]");
            std::process::exit(2);
        }
    };

    let raw = match std::fs::read_to_string(&args.lrc_path) {
        Ok(raw) => raw,
        Err(e) => {
            error!("Failed to read {}: {e}", args.lrc_path.display());
            std::process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to create tokio runtime: {e}");
            std::process::exit(1);
        }
    };

    let cancel_token = CancellationToken::new();

    let ctrlc_token = cancel_token.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received Ctrl+C, shutting down gracefully...");
        ctrlc_token.cancel();
    }) {
        error!("Failed to set Ctrl+C handler: {}", e);
    }

    if let Err(e) = runtime.block_on(run_preview(&config, &args, &raw, &cancel_token)) {
        error!("{e}");
        std::process::exit(1);
    }
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<PreviewArgs, String> {
    let lrc_path = args
        .next()
        .map(PathBuf::from)
        .ok_or_else(|| "Missing lyrics file".to_string())?;
    let duration = args
        .next()
        .map(|secs| {
            secs.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| format!("Invalid duration: {secs}"))
        })
        .transpose()?;
    Ok(PreviewArgs { lrc_path, duration })
}

/// Build the single preview track from the file's `[ti:]`/`[ar:]` tags
fn preview_track(path: &Path, raw: &str, duration: Duration) -> TrackRef {
    let stem = path
        .file_stem()
        .map_or_else(|| "preview".to_string(), |s| s.to_string_lossy().into_owned());
    let title = lyric_tag(raw, "ti").unwrap_or_else(|| stem.clone());
    let artist = lyric_tag(raw, "ar").unwrap_or_default();
    TrackRef::new(0, stem, title, artist, duration.as_secs_u32()).with_playable_url(PREVIEW_URL)
}

async fn run_preview(
    config: &PlayerConfig,
    args: &PreviewArgs,
    raw: &str,
    cancel_token: &CancellationToken,
) -> catmusic_core::Result<()> {
    let duration = args.duration.unwrap_or_else(|| {
        Timeline::parse(raw).map_or(TRAILING_SILENCE, |timeline| {
            timeline.total_duration() + TRAILING_SILENCE
        })
    });
    let track = preview_track(&args.lrc_path, raw, duration);
    let mid = track.mid.clone();

    let (signal_tx, signal_rx) = mpsc::unbounded_channel();
    let engine = ClockEngine::new(duration, signal_tx.clone());
    let session = PlaybackSession::new(engine, NoFocus, config.session_options());

    let pump = session.attach_signals(signal_rx, cancel_token.clone());
    let logger = tokio::spawn(log_session_events(
        Arc::clone(&session),
        session.subscribe(),
        cancel_token.clone(),
    ));
    let sync_loop = Arc::new(SyncLoop::new(
        Arc::clone(&session),
        config.tick_interval(),
        Some(cancel_token.clone()),
    ));
    let sync_handle = sync_loop.start();
    let watcher = tokio::spawn(watch_completion(
        Arc::clone(&session),
        signal_tx,
        config.tick_interval(),
        cancel_token.clone(),
    ));

    info!(
        "Previewing {} ({}) with policy {}",
        track.title,
        format_clock(duration),
        config.playback.default_policy
    );

    session.set_playlist(vec![track], 0).await?;
    if !session.load_lyrics(&mid, raw).await {
        warn!("No timed lyrics in {}", args.lrc_path.display());
    }
    session.play(None).await?;

    cancel_token.cancelled().await;

    session.shutdown().await;
    for handle in [pump, logger, sync_handle, watcher] {
        if let Err(e) = handle.await {
            warn!("Background task ended abnormally: {e}");
        }
    }
    info!("Preview finished");
    Ok(())
}

/// Report completion once the clock reaches the end of the current load
async fn watch_completion(
    session: Arc<PlaybackSession>,
    signals: mpsc::UnboundedSender<EngineSignal>,
    tick: Duration,
    cancel_token: CancellationToken,
) {
    let mut interval = tokio::time::interval(tick);
    let mut reported: Option<LoadId> = None;

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => break,
            _ = interval.tick() => {}
        }

        if session.current_state().await != SessionState::Playing || session.is_preparing().await {
            continue;
        }
        let Some(load) = session.current_load().await else {
            continue;
        };
        if reported == Some(load) {
            continue;
        }
        let duration = session.duration().await;
        if !duration.is_zero() && session.current_position().await >= duration {
            debug!("Clock reached end of {}", load);
            reported = Some(load);
            if signals.send(EngineSignal::completed(load)).is_err() {
                break;
            }
        }
    }
}

async fn log_session_events(
    session: Arc<PlaybackSession>,
    mut rx: broadcast::Receiver<SessionEvent>,
    cancel_token: CancellationToken,
) {
    let mut timeline: Option<Timeline> = None;

    loop {
        let event = tokio::select! {
            () = cancel_token.cancelled() => break,
            event = rx.recv() => event,
        };

        match event {
            Ok(event) => match &event {
                SessionEvent::TrackChanged { track, index } => {
                    info!("Track changed: {} - {} (#{})", track.artist, track.title, index);
                }
                SessionEvent::Play { position, .. } => {
                    info!("Playing at {}", format_clock_detailed(*position));
                }
                SessionEvent::Pause { position } => {
                    info!("Paused at {}", format_clock_detailed(*position));
                }
                SessionEvent::Stop => info!("Playback stopped"),
                SessionEvent::Completion { index } => info!("Track #{} completed", index),
                SessionEvent::LyricsLoaded { lines } => {
                    info!("Lyrics loaded: {} lines", lines);
                    timeline = session.timeline().await;
                }
                SessionEvent::LyricsNotFound => {
                    info!("Lyrics not found");
                    timeline = None;
                }
                SessionEvent::HighlightChanged { line: Some(index) } => {
                    if let Some(line) = timeline.as_ref().and_then(|t| t.lines().get(*index)) {
                        info!("{} {}", format_lrc_timestamp(line.start_time), line.text);
                    }
                }
                SessionEvent::HighlightChanged { line: None } => {}
                SessionEvent::Error { kind, message } => {
                    error!("Session error ({:?}): {}", kind, message);
                }
                SessionEvent::TrackUnchanged { track, .. } => {
                    debug!("Track unchanged: {}", track.title);
                }
            },
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("Event logger lagged, missed {} events", n);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Load config before tracing is up, falling back to defaults.
///
/// A first run writes the template, which holds the defaults.
fn load_config() -> PlayerConfig {
    match PlayerConfig::load_or_create() {
        Ok(config) => config,
        Err(CoreError::ConfigNotFound { path }) => {
            eprintln!("Created config template at {}", path.display());
            PlayerConfig::default()
        }
        Err(e) => {
            eprintln!("Ignoring config: {e}");
            PlayerConfig::default()
        }
    }
}

fn init_tracing(file_logging_enabled: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer();

    if file_logging_enabled {
        let log_path = catmusic_core::paths::log_file_path();

        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        match File::create(&log_path) {
            Ok(file) => {
                let file_layer = tracing_subscriber::fmt::layer()
                    .with_writer(Arc::new(file))
                    .with_ansi(false);

                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt_layer)
                    .with(file_layer)
                    .init();

                return;
            }
            Err(e) => {
                eprintln!("Failed to create log file at {}: {e}", log_path.display());
            }
        }
    }

    // Console only
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
