//! The playback session state machine.
//!
//! All transitions run under a single lock so that user commands, focus
//! callbacks and engine signals arriving from different tasks observe the
//! state, cursor and timeline as one unit.

use crate::engine::{AudioEngine, AudioFocus, EngineSignal, EngineSignalKind, FocusChange, LoadId};
use crate::error::{CoreError, Result};
use crate::events::{ErrorKind, SessionEvent};
use crate::lrc::Timeline;
use crate::playlist::{Direction, PlaybackPolicy, PlaylistCursor, TrackRef};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const FULL_VOLUME: f32 = 1.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SessionState {
    #[default]
    Idle,
    Playing,
    Paused,
    Stopped,
    Error,
}

/// Why the session is paused. Only focus-loss pauses auto-resume on regain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PauseReason {
    User,
    FocusLoss,
}

/// Construction parameters for a [`PlaybackSession`]
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub policy: PlaybackPolicy,
    /// Volume applied while another application holds duckable focus
    pub duck_volume: f32,
    pub event_capacity: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            policy: PlaybackPolicy::LoopAll,
            duck_volume: 0.2,
            event_capacity: 64,
        }
    }
}

struct SessionInner {
    engine: Box<dyn AudioEngine>,
    focus: Box<dyn AudioFocus>,
    cursor: PlaylistCursor,
    /// Lyrics and the `mid` of the track they belong to
    lyrics: Option<(String, Timeline)>,
    state: SessionState,
    pause_reason: Option<PauseReason>,
    next_load: LoadId,
    /// Load whose source currently sits in the engine
    current_load: Option<LoadId>,
    /// Waiting for the engine to report `current_load` ready
    preparing: bool,
    ducked: bool,
    duck_volume: f32,
    closed: bool,
    event_tx: broadcast::Sender<SessionEvent>,
}

/// Owns the audio engine, the playlist cursor and the loaded lyric timeline.
pub struct PlaybackSession {
    inner: Mutex<SessionInner>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl PlaybackSession {
    /// Create a session that exclusively owns `engine`.
    #[must_use]
    pub fn new(
        engine: impl AudioEngine + 'static,
        focus: impl AudioFocus + 'static,
        options: SessionOptions,
    ) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(options.event_capacity.max(1));

        Arc::new(Self {
            inner: Mutex::new(SessionInner {
                engine: Box::new(engine),
                focus: Box::new(focus),
                cursor: PlaylistCursor::new(Vec::new(), options.policy),
                lyrics: None,
                state: SessionState::Idle,
                pause_reason: None,
                next_load: LoadId::new(1),
                current_load: None,
                preparing: false,
                ducked: false,
                duck_volume: options.duck_volume.clamp(0.0, FULL_VOLUME),
                closed: false,
                event_tx: event_tx.clone(),
            }),
            event_tx,
        })
    }

    /// Subscribe to session events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    pub(crate) fn publish(&self, event: SessionEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Replace the playlist and select `start`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPosition` if `start` is out of range for a non-empty
    /// list; the previous playlist is kept in that case.
    pub async fn set_playlist(&self, tracks: Vec<TrackRef>, start: usize) -> Result<()> {
        if !tracks.is_empty() && start >= tracks.len() {
            return Err(CoreError::InvalidPosition {
                index: start,
                len: tracks.len(),
            });
        }

        let mut inner = self.inner.lock().await;
        info!("Playlist replaced with {} tracks, starting at {}", tracks.len(), start);
        inner.cursor.replace_tracks(tracks);
        if !inner.cursor.is_empty() {
            inner.cursor.set_position(start)?;
        }
        Ok(())
    }

    /// Apply resolved stream URLs to matching tracks; returns how many were set
    pub async fn apply_playable_urls(&self, urls: &HashMap<String, String>) -> usize {
        let applied = self.inner.lock().await.cursor.apply_playable_urls(urls);
        debug!("Applied {} of {} resolved URLs", applied, urls.len());
        applied
    }

    /// Start playing the track at `index`, or the current track if `None`.
    ///
    /// # Errors
    ///
    /// `EmptyPlaylist`, `InvalidPosition` and `MissingUrl` leave the session
    /// untouched. `EngineError` moves the session to [`SessionState::Error`].
    pub async fn play(&self, index: Option<usize>) -> Result<()> {
        self.inner.lock().await.play(index)
    }

    /// Pause if the engine is currently playing; otherwise a no-op.
    pub async fn pause(&self) {
        self.inner.lock().await.pause();
    }

    /// Resume if paused; otherwise a no-op.
    pub async fn resume(&self) {
        self.inner.lock().await.resume();
    }

    pub async fn stop(&self) {
        self.inner.lock().await.stop();
    }

    /// # Errors
    ///
    /// See [`Self::play`].
    pub async fn play_next(&self) -> Result<()> {
        self.inner.lock().await.step(Direction::Next)
    }

    /// # Errors
    ///
    /// See [`Self::play`].
    pub async fn play_previous(&self) -> Result<()> {
        self.inner.lock().await.step(Direction::Previous)
    }

    pub async fn set_policy(&self, policy: PlaybackPolicy) {
        let mut inner = self.inner.lock().await;
        info!("Playback policy set to {}", policy);
        inner.cursor.set_policy(policy);
    }

    pub async fn seek(&self, position: Duration) {
        self.inner.lock().await.seek(position);
    }

    /// Feed an external audio focus change into the session
    pub async fn handle_focus_change(&self, change: FocusChange) {
        self.inner.lock().await.focus_changed(change);
    }

    /// Feed an asynchronous engine outcome into the session
    pub async fn handle_engine_signal(&self, signal: EngineSignal) {
        self.inner.lock().await.engine_signal(signal);
    }

    /// Forward engine signals from `rx` into the session until cancelled or
    /// the sender side is dropped.
    #[must_use]
    pub fn attach_signals(
        self: &Arc<Self>,
        mut rx: mpsc::UnboundedReceiver<EngineSignal>,
        cancel_token: CancellationToken,
    ) -> JoinHandle<()> {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel_token.cancelled() => {
                        debug!("Engine signal pump shutting down");
                        break;
                    }
                    signal = rx.recv() => match signal {
                        Some(signal) => session.handle_engine_signal(signal).await,
                        None => break,
                    }
                }
            }
        })
    }

    /// Parse `raw` and install it as the lyrics for track `mid`.
    ///
    /// Lyrics for a track other than the current one are dropped. Returns
    /// whether a timeline was installed; unparseable text clears the current
    /// lyrics and emits [`SessionEvent::LyricsNotFound`].
    pub async fn load_lyrics(&self, mid: &str, raw: &str) -> bool {
        self.inner.lock().await.load_lyrics(mid, raw)
    }

    pub async fn clear_lyrics(&self) {
        let mut inner = self.inner.lock().await;
        inner.lyrics = None;
        inner.emit(SessionEvent::LyricsNotFound);
    }

    /// Stop playback, give up audio focus and release the engine.
    pub async fn shutdown(&self) {
        self.inner.lock().await.shutdown();
    }

    pub async fn current_state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    pub async fn pause_reason(&self) -> Option<PauseReason> {
        self.inner.lock().await.pause_reason
    }

    /// Whether a load was issued and the engine has not reported ready yet
    pub async fn is_preparing(&self) -> bool {
        self.inner.lock().await.preparing
    }

    pub async fn current_position(&self) -> Duration {
        self.inner.lock().await.position()
    }

    pub async fn duration(&self) -> Duration {
        let inner = self.inner.lock().await;
        if inner.current_load.is_some() && !inner.preparing {
            let duration = inner.engine.duration();
            if !duration.is_zero() {
                return duration;
            }
        }
        inner.cursor.current().map_or(Duration::ZERO, TrackRef::duration)
    }

    pub async fn current_policy(&self) -> PlaybackPolicy {
        self.inner.lock().await.cursor.policy()
    }

    pub async fn current_index(&self) -> usize {
        self.inner.lock().await.cursor.position()
    }

    pub async fn current_track(&self) -> Option<TrackRef> {
        self.inner.lock().await.cursor.current().cloned()
    }

    pub async fn tracks(&self) -> Vec<TrackRef> {
        self.inner.lock().await.cursor.tracks().to_vec()
    }

    /// Load currently in the engine, if any
    pub async fn current_load(&self) -> Option<LoadId> {
        self.inner.lock().await.current_load
    }

    pub async fn timeline(&self) -> Option<Timeline> {
        self.inner.lock().await.lyrics.as_ref().map(|(_, t)| t.clone())
    }

    /// Highlighted line at the engine's position, sampled only while audio
    /// is actually playing. The outer `None` means "not playing".
    pub(crate) async fn sample_highlight(&self) -> Option<Option<usize>> {
        let inner = self.inner.lock().await;
        if inner.state != SessionState::Playing || inner.preparing {
            return None;
        }
        let position = inner.engine.position();
        Some(
            inner
                .lyrics
                .as_ref()
                .and_then(|(_, timeline)| timeline.current_index(position)),
        )
    }
}

impl SessionInner {
    fn emit(&self, event: SessionEvent) {
        let _ = self.event_tx.send(event);
    }

    fn report(&mut self, kind: ErrorKind, message: String) {
        error!("Playback session error ({:?}): {}", kind, message);
        self.state = SessionState::Error;
        self.preparing = false;
        self.emit(SessionEvent::Error { kind, message });
    }

    fn position(&self) -> Duration {
        if self.current_load.is_some() && !self.preparing {
            self.engine.position()
        } else {
            Duration::ZERO
        }
    }

    fn play(&mut self, index: Option<usize>) -> Result<()> {
        if self.closed {
            return Err(CoreError::SessionClosed);
        }
        if self.cursor.is_empty() {
            return Err(CoreError::EmptyPlaylist);
        }

        let target = index.unwrap_or_else(|| self.cursor.position());
        let track = self
            .cursor
            .tracks()
            .get(target)
            .ok_or(CoreError::InvalidPosition {
                index: target,
                len: self.cursor.len(),
            })?
            .clone();
        let url = track
            .playable_url()
            .ok_or_else(|| CoreError::MissingUrl {
                mid: track.mid.clone(),
            })?
            .to_string();
        self.cursor.set_position(target)?;

        if !self.focus.request() {
            warn!("{}; playing without it", CoreError::FocusDenied);
        }

        let load = self.next_load;
        self.next_load = load.next();

        if self.lyrics.as_ref().is_some_and(|(mid, _)| *mid != track.mid) {
            self.lyrics = None;
        }

        info!("Loading {} - {} ({}) at index {}", track.artist, track.title, load, target);
        if let Err(fault) = self.engine.load(load, &url) {
            self.current_load = None;
            self.report(ErrorKind::Engine, fault.message.clone());
            return Err(CoreError::EngineError {
                code: fault.code,
                message: fault.message,
            });
        }

        self.state = SessionState::Playing;
        self.pause_reason = None;
        self.current_load = Some(load);
        self.preparing = true;
        self.emit(SessionEvent::TrackChanged { track, index: target });
        Ok(())
    }

    fn pause(&mut self) {
        if self.state == SessionState::Playing && self.engine.is_playing() {
            self.engine.pause();
            self.state = SessionState::Paused;
            self.pause_reason = Some(PauseReason::User);
            info!("Playback paused");
            self.emit(SessionEvent::Pause {
                position: self.engine.position(),
            });
        } else if self.pause_reason == Some(PauseReason::FocusLoss) {
            // Already silent; the user now owns this pause.
            self.pause_reason = Some(PauseReason::User);
            debug!("Focus-loss pause taken over by user");
        } else {
            debug!("Pause ignored in state {:?}", self.state);
        }
    }

    fn resume(&mut self) {
        if self.state != SessionState::Paused || self.engine.is_playing() || self.preparing {
            debug!("Resume ignored in state {:?}", self.state);
            return;
        }
        if !self.focus.request() {
            warn!("{}; resuming without it", CoreError::FocusDenied);
        }
        self.start_engine();
    }

    fn start_engine(&mut self) {
        self.engine.start();
        self.state = SessionState::Playing;
        self.pause_reason = None;
        info!("Playback started at index {}", self.cursor.position());
        self.emit(SessionEvent::Play {
            index: self.cursor.position(),
            position: self.engine.position(),
        });
    }

    fn stop(&mut self) {
        if self.state == SessionState::Stopped {
            debug!("Stop ignored, already stopped");
            return;
        }
        self.engine.stop();
        self.state = SessionState::Stopped;
        self.pause_reason = None;
        self.current_load = None;
        self.preparing = false;
        info!("Playback stopped");
        self.emit(SessionEvent::Stop);
    }

    fn step(&mut self, direction: Direction) -> Result<()> {
        if self.closed {
            return Err(CoreError::SessionClosed);
        }
        let previous = self.cursor.position();
        let index = self.cursor.advance(direction)?;

        if index != previous || self.cursor.policy() == PlaybackPolicy::LoopOne {
            let result = self.play(Some(index));
            if let Err(ref e) = result {
                if !matches!(e, CoreError::EngineError { .. }) {
                    // Navigation failures leave the cursor where it was.
                    let _ = self.cursor.set_position(previous);
                }
            }
            return result;
        }

        if let Some(track) = self.cursor.current().cloned() {
            debug!("Track unchanged at index {}", index);
            self.emit(SessionEvent::TrackUnchanged { track, index });
        }
        Ok(())
    }

    fn seek(&mut self, position: Duration) {
        if self.current_load.is_none() || self.preparing {
            debug!("Seek ignored, nothing ready to seek in");
            return;
        }
        debug!("Seeking to {:?}", position);
        self.engine.seek(position);
    }

    fn focus_changed(&mut self, change: FocusChange) {
        debug!("Audio focus change: {:?}", change);
        match change {
            FocusChange::Gain => {
                if self.ducked {
                    self.engine.set_volume(FULL_VOLUME);
                    self.ducked = false;
                }
                if self.pause_reason != Some(PauseReason::FocusLoss) {
                    return;
                }
                if self.state == SessionState::Paused && !self.engine.is_playing() {
                    self.start_engine();
                } else if self.state == SessionState::Playing && self.preparing {
                    debug!("Focus regained before {:?} was ready", self.current_load);
                    self.pause_reason = None;
                }
            }
            FocusChange::Loss | FocusChange::LossTransient => {
                if self.state == SessionState::Playing && self.preparing {
                    // Held until ready; the engine has nothing to pause yet.
                    info!("Focus lost while loading, playback will be held");
                    self.pause_reason = Some(PauseReason::FocusLoss);
                } else if self.state == SessionState::Playing && self.engine.is_playing() {
                    self.engine.pause();
                    self.state = SessionState::Paused;
                    self.pause_reason = Some(PauseReason::FocusLoss);
                    info!("Playback paused for focus loss");
                    self.emit(SessionEvent::Pause {
                        position: self.engine.position(),
                    });
                }
            }
            FocusChange::LossTransientCanDuck => {
                self.engine.set_volume(self.duck_volume);
                self.ducked = true;
            }
        }
    }

    fn engine_signal(&mut self, signal: EngineSignal) {
        if self.current_load != Some(signal.load) {
            debug!("Dropping {:?} from superseded {}", signal.kind, signal.load);
            return;
        }

        match signal.kind {
            EngineSignalKind::Ready => {
                if !self.preparing {
                    debug!("Duplicate ready for {}", signal.load);
                    return;
                }
                self.preparing = false;
                if self.state != SessionState::Playing {
                    return;
                }
                if let Some(reason) = self.pause_reason {
                    self.state = SessionState::Paused;
                    info!("Load ready, holding paused ({:?})", reason);
                    self.emit(SessionEvent::Pause {
                        position: self.engine.position(),
                    });
                } else {
                    self.start_engine();
                }
            }
            EngineSignalKind::Completed => self.track_completed(),
            EngineSignalKind::Error { code, extra } => {
                self.current_load = None;
                self.report(
                    ErrorKind::Engine,
                    format!("Playback error: what={code}, extra={extra}"),
                );
            }
        }
    }

    fn track_completed(&mut self) {
        let index = self.cursor.position();
        info!("Track at index {} completed", index);
        self.emit(SessionEvent::Completion { index });

        let next = if self.cursor.policy() == PlaybackPolicy::LoopOne {
            Ok(index)
        } else {
            self.cursor.advance(Direction::Next)
        };

        match next.and_then(|next| self.play(Some(next))) {
            Ok(()) | Err(CoreError::EngineError { .. }) => {}
            Err(e) => {
                let kind = match e {
                    CoreError::EmptyPlaylist => ErrorKind::EmptyPlaylist,
                    CoreError::MissingUrl { .. } => ErrorKind::MissingUrl,
                    _ => ErrorKind::InvalidPosition,
                };
                self.current_load = None;
                self.report(kind, e.to_string());
            }
        }
    }

    fn load_lyrics(&mut self, mid: &str, raw: &str) -> bool {
        if !self.cursor.current().is_some_and(|track| track.mid == mid) {
            debug!("Dropping lyrics for {}, no longer the current track", mid);
            return false;
        }

        if let Some(timeline) = Timeline::parse(raw) {
            let lines = timeline.len();
            info!("Loaded {} lyric lines for {}", lines, mid);
            self.lyrics = Some((mid.to_string(), timeline));
            self.emit(SessionEvent::LyricsLoaded { lines });
            true
        } else {
            warn!("{} for {}", CoreError::ParseFailure, mid);
            self.lyrics = None;
            self.emit(SessionEvent::LyricsNotFound);
            false
        }
    }

    fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        info!("Shutting down playback session");
        self.stop();
        self.focus.abandon();
        self.engine.release();
        self.closed = true;
    }
}
