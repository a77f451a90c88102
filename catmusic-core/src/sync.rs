//! Lyric highlight synchronization.
//!
//! The sync loop samples the engine position at a fixed interval while the
//! session is playing and publishes [`SessionEvent::HighlightChanged`] when
//! the highlighted lyric line changes. It goes dormant whenever the session
//! leaves `Playing` and wakes again on the next play event.

use crate::session::PlaybackSession;
use crate::SessionEvent;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Default sampling interval
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Suppresses republishing the highlight index that was published last.
#[derive(Debug, Default, Clone)]
pub struct HighlightTracker {
    published: Option<Option<usize>>,
}

impl HighlightTracker {
    /// Record a sampled index; returns whether it should be published
    pub fn observe(&mut self, line: Option<usize>) -> bool {
        if self.published == Some(line) {
            return false;
        }
        self.published = Some(line);
        true
    }

    /// Forget the last published index, e.g. after lyrics were replaced
    pub fn reset(&mut self) {
        self.published = None;
    }

    fn note(&mut self, event: &SessionEvent) {
        if matches!(
            event,
            SessionEvent::TrackChanged { .. }
                | SessionEvent::LyricsLoaded { .. }
                | SessionEvent::LyricsNotFound
        ) {
            self.reset();
        }
    }
}

/// Cooperative poller that keeps the highlighted lyric line in step with playback
pub struct SyncLoop {
    session: Arc<PlaybackSession>,
    interval: Duration,
    cancel_token: CancellationToken,
}

impl SyncLoop {
    /// Create a new sync loop
    ///
    /// # Arguments
    /// * `session` - Session to sample and publish highlight events on
    /// * `interval` - Sampling interval while playing
    /// * `cancel_token` - Optional external cancellation token for graceful shutdown
    #[must_use]
    pub fn new(
        session: Arc<PlaybackSession>,
        interval: Duration,
        cancel_token: Option<CancellationToken>,
    ) -> Self {
        Self {
            session,
            interval: if interval.is_zero() {
                DEFAULT_TICK_INTERVAL
            } else {
                interval
            },
            cancel_token: cancel_token.unwrap_or_default(),
        }
    }

    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Start the sync loop in a background task
    #[must_use]
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        info!("Starting lyric sync loop ({:?} interval)", self.interval);

        let mut rx = self.session.subscribe();
        let mut tracker = HighlightTracker::default();

        loop {
            if self.session.sample_highlight().await.is_some()
                && self.poll_while_playing(&mut rx, &mut tracker).await.is_break()
            {
                break;
            }

            // Dormant until the session plays again
            tokio::select! {
                () = self.cancel_token.cancelled() => break,
                event = rx.recv() => match event {
                    Ok(SessionEvent::Play { .. }) | Err(RecvError::Lagged(_)) => {}
                    Ok(event) => tracker.note(&event),
                    Err(RecvError::Closed) => break,
                }
            }
        }

        info!("Lyric sync loop shutting down");
    }

    async fn poll_while_playing(
        &self,
        rx: &mut broadcast::Receiver<SessionEvent>,
        tracker: &mut HighlightTracker,
    ) -> ControlFlow<()> {
        debug!("Sync loop active");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => return ControlFlow::Break(()),
                _ = ticker.tick() => {
                    let Some(line) = self.session.sample_highlight().await else {
                        debug!("Session left playing, sync loop dormant");
                        return ControlFlow::Continue(());
                    };
                    if tracker.observe(line) {
                        self.session.publish(SessionEvent::HighlightChanged { line });
                    }
                }
                event = rx.recv() => match event {
                    Ok(
                        SessionEvent::Pause { .. }
                        | SessionEvent::Stop
                        | SessionEvent::Error { .. }
                        | SessionEvent::Completion { .. },
                    ) => return ControlFlow::Continue(()),
                    Ok(event) => tracker.note(&event),
                    Err(RecvError::Lagged(skipped)) => debug!("Sync loop skipped {} events", skipped),
                    Err(RecvError::Closed) => return ControlFlow::Break(()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{AudioEngine, EngineFault, EngineSignal, LoadId, NoFocus};
    use crate::playlist::TrackRef;
    use crate::session::SessionOptions;
    use std::sync::Mutex as StdMutex;

    #[derive(Debug, Default)]
    struct Clock {
        playing: bool,
        position: Duration,
        last_load: Option<LoadId>,
    }

    #[derive(Clone, Default)]
    struct ClockEngine(Arc<StdMutex<Clock>>);

    impl ClockEngine {
        fn set_position(&self, millis: u64) {
            self.0.lock().unwrap().position = Duration::from_millis(millis);
        }
    }

    impl AudioEngine for ClockEngine {
        fn load(&mut self, load: LoadId, _url: &str) -> Result<(), EngineFault> {
            self.0.lock().unwrap().last_load = Some(load);
            Ok(())
        }
        fn start(&mut self) {
            self.0.lock().unwrap().playing = true;
        }
        fn pause(&mut self) {
            self.0.lock().unwrap().playing = false;
        }
        fn stop(&mut self) {
            self.0.lock().unwrap().playing = false;
        }
        fn seek(&mut self, position: Duration) {
            self.0.lock().unwrap().position = position;
        }
        fn set_volume(&mut self, _volume: f32) {}
        fn is_playing(&self) -> bool {
            self.0.lock().unwrap().playing
        }
        fn position(&self) -> Duration {
            self.0.lock().unwrap().position
        }
        fn duration(&self) -> Duration {
            Duration::from_secs(10)
        }
    }

    async fn playing_session() -> (Arc<PlaybackSession>, ClockEngine) {
        let engine = ClockEngine::default();
        let session = PlaybackSession::new(engine.clone(), NoFocus, SessionOptions::default());
        let track = TrackRef::new(1, "mid1", "Song", "Artist", 10).with_playable_url("http://s/1");
        session.set_playlist(vec![track], 0).await.unwrap();
        session.play(None).await.unwrap();
        let load = engine.0.lock().unwrap().last_load.unwrap();
        session.handle_engine_signal(EngineSignal::ready(load)).await;
        session.load_lyrics("mid1", "A[00:01.00]B[00:02.00]C[00:03.00]").await;
        (session, engine)
    }

    fn highlights(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<Option<usize>> {
        let mut lines = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let SessionEvent::HighlightChanged { line } = event {
                lines.push(line);
            }
        }
        lines
    }

    fn last_load(engine: &ClockEngine) -> LoadId {
        engine.0.lock().unwrap().last_load.unwrap()
    }

    async fn tick() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    #[test]
    fn test_tracker_suppresses_repeats() {
        let mut tracker = HighlightTracker::default();
        assert!(tracker.observe(None));
        assert!(!tracker.observe(None));
        assert!(tracker.observe(Some(0)));
        assert!(!tracker.observe(Some(0)));
        tracker.reset();
        assert!(tracker.observe(Some(0)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_publishes_only_changes() {
        let (session, engine) = playing_session().await;
        let mut rx = session.subscribe();
        let sync = Arc::new(SyncLoop::new(session.clone(), DEFAULT_TICK_INTERVAL, None));
        let cancel = sync.cancel_token();
        let handle = sync.start();

        tokio::time::sleep(Duration::from_millis(50)).await;
        engine.set_position(1500);
        tick().await;
        engine.set_position(1600);
        tick().await;
        engine.set_position(2500);
        tick().await;

        assert_eq!(highlights(&mut rx), vec![None, Some(0), Some(1)]);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_dormant_while_paused() {
        let (session, engine) = playing_session().await;
        let mut rx = session.subscribe();
        let sync = Arc::new(SyncLoop::new(session.clone(), DEFAULT_TICK_INTERVAL, None));
        let cancel = sync.cancel_token();
        let handle = sync.start();

        engine.set_position(1200);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(highlights(&mut rx), vec![Some(0)]);

        session.pause().await;
        engine.set_position(2200);
        tick().await;
        tick().await;
        assert!(highlights(&mut rx).is_empty());

        session.resume().await;
        tick().await;
        assert_eq!(highlights(&mut rx), vec![Some(1)]);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_lyrics_republish() {
        let (session, engine) = playing_session().await;
        let mut rx = session.subscribe();
        let sync = Arc::new(SyncLoop::new(session.clone(), DEFAULT_TICK_INTERVAL, None));
        let cancel = sync.cancel_token();
        let handle = sync.start();

        engine.set_position(1200);
        tokio::time::sleep(Duration::from_millis(50)).await;
        session.load_lyrics("mid1", "X[00:01.00]Y[00:05.00]").await;
        tick().await;

        assert_eq!(highlights(&mut rx), vec![Some(0), Some(0)]);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_dormant_after_stop_and_error() {
        let (session, engine) = playing_session().await;
        let mut rx = session.subscribe();
        let sync = Arc::new(SyncLoop::new(session.clone(), DEFAULT_TICK_INTERVAL, None));
        let cancel = sync.cancel_token();
        let handle = sync.start();

        engine.set_position(1200);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(highlights(&mut rx), vec![Some(0)]);

        session.stop().await;
        engine.set_position(2200);
        tick().await;
        tick().await;
        assert!(highlights(&mut rx).is_empty());

        session.play(None).await.unwrap();
        session.handle_engine_signal(EngineSignal::ready(last_load(&engine))).await;
        tick().await;
        assert_eq!(highlights(&mut rx), vec![Some(1)]);

        session
            .handle_engine_signal(EngineSignal::error(last_load(&engine), 1, -1004))
            .await;
        engine.set_position(3500);
        tick().await;
        tick().await;
        assert!(highlights(&mut rx).is_empty());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_resumes_after_completion_replay() {
        let (session, engine) = playing_session().await;
        let mut rx = session.subscribe();
        let sync = Arc::new(SyncLoop::new(session.clone(), DEFAULT_TICK_INTERVAL, None));
        let cancel = sync.cancel_token();
        let handle = sync.start();

        engine.set_position(2500);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(highlights(&mut rx), vec![Some(1)]);

        let finished = last_load(&engine);
        session.handle_engine_signal(EngineSignal::completed(finished)).await;
        assert_ne!(last_load(&engine), finished);
        engine.set_position(500);
        tick().await;
        tick().await;
        assert!(highlights(&mut rx).is_empty());

        session.handle_engine_signal(EngineSignal::ready(last_load(&engine))).await;
        tick().await;
        assert_eq!(highlights(&mut rx), vec![None]);

        engine.set_position(1500);
        tick().await;
        assert_eq!(highlights(&mut rx), vec![Some(0)]);

        cancel.cancel();
        handle.await.unwrap();
    }
}
