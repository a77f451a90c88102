//! Silent audio engine that only keeps time.

use catmusic_core::{AudioEngine, EngineFault, EngineSignal, LoadId};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::debug;

/// Engine without audio output. Position advances with wall time while
/// started, and every load is ready immediately.
pub struct ClockEngine {
    signals: mpsc::UnboundedSender<EngineSignal>,
    duration: Duration,
    loaded: bool,
    started_at: Option<Instant>,
    offset: Duration,
}

impl ClockEngine {
    #[must_use]
    pub fn new(duration: Duration, signals: mpsc::UnboundedSender<EngineSignal>) -> Self {
        Self {
            signals,
            duration,
            loaded: false,
            started_at: None,
            offset: Duration::ZERO,
        }
    }

    fn elapsed(&self) -> Duration {
        let running = self.started_at.as_ref().map_or(Duration::ZERO, Instant::elapsed);
        (self.offset + running).min(self.duration)
    }
}

impl AudioEngine for ClockEngine {
    fn load(&mut self, load: LoadId, url: &str) -> Result<(), EngineFault> {
        debug!("Clock engine loading {} for {}", url, load);
        self.loaded = true;
        self.started_at = None;
        self.offset = Duration::ZERO;
        self.signals
            .send(EngineSignal::ready(load))
            .map_err(|_| EngineFault::new(-1, "engine signal channel closed"))
    }

    fn start(&mut self) {
        if self.loaded && self.started_at.is_none() {
            self.started_at = Some(Instant::now());
        }
    }

    fn pause(&mut self) {
        self.offset = self.elapsed();
        self.started_at = None;
    }

    fn stop(&mut self) {
        self.loaded = false;
        self.started_at = None;
        self.offset = Duration::ZERO;
    }

    fn seek(&mut self, position: Duration) {
        self.offset = position.min(self.duration);
        if self.started_at.is_some() {
            self.started_at = Some(Instant::now());
        }
    }

    fn set_volume(&mut self, volume: f32) {
        debug!("Clock engine volume {:.2}", volume);
    }

    fn is_playing(&self) -> bool {
        self.started_at.is_some()
    }

    fn position(&self) -> Duration {
        self.elapsed()
    }

    fn duration(&self) -> Duration {
        if self.loaded {
            self.duration
        } else {
            Duration::ZERO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_reports_ready() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut engine = ClockEngine::new(Duration::from_secs(30), tx);
        engine.load(LoadId::new(4), "clock://preview").unwrap();
        assert_eq!(rx.try_recv().unwrap(), EngineSignal::ready(LoadId::new(4)));
        assert!(!engine.is_playing());
        assert_eq!(engine.duration(), Duration::from_secs(30));
    }

    #[test]
    fn test_pause_freezes_position() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut engine = ClockEngine::new(Duration::from_secs(30), tx);
        engine.load(LoadId::new(1), "clock://preview").unwrap();
        engine.seek(Duration::from_secs(12));
        engine.start();
        engine.pause();
        let frozen = engine.position();
        assert!(frozen >= Duration::from_secs(12));
        assert_eq!(engine.position(), frozen);
        assert!(!engine.is_playing());
    }

    #[test]
    fn test_seek_clamps_and_stop_resets() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut engine = ClockEngine::new(Duration::from_secs(30), tx);
        engine.load(LoadId::new(1), "clock://preview").unwrap();
        engine.seek(Duration::from_secs(90));
        assert_eq!(engine.position(), Duration::from_secs(30));
        engine.stop();
        assert_eq!(engine.position(), Duration::ZERO);
        assert_eq!(engine.duration(), Duration::ZERO);
    }

    #[test]
    fn test_load_fails_when_signals_closed() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut engine = ClockEngine::new(Duration::from_secs(30), tx);
        assert!(engine.load(LoadId::new(1), "clock://preview").is_err());
    }
}
