//! Seams to the platform audio engine and the audio focus arbiter.
//!
//! The session owns exactly one [`AudioEngine`] for its whole lifetime. Engine
//! calls must not block: loading is asynchronous and its outcome comes back as
//! an [`EngineSignal`] tagged with the [`LoadId`] the session handed out, so
//! that signals belonging to a superseded load can be recognised and dropped.

use std::time::Duration;

/// Identifies one load request issued by the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoadId(u64);

impl LoadId {
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl std::fmt::Display for LoadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "load#{}", self.0)
    }
}

/// Error reported synchronously by an engine call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineFault {
    pub code: i32,
    pub message: String,
}

impl EngineFault {
    #[must_use]
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Handle to the platform audio player.
pub trait AudioEngine: Send {
    /// Reset the player and begin preparing `url` in the background.
    ///
    /// Completion is reported later as [`EngineSignalKind::Ready`] for `load`.
    ///
    /// # Errors
    ///
    /// Returns a fault if the source cannot even be handed to the player.
    fn load(&mut self, load: LoadId, url: &str) -> Result<(), EngineFault>;

    fn start(&mut self);

    fn pause(&mut self);

    /// Stop playback and reset to the unloaded state
    fn stop(&mut self);

    fn seek(&mut self, position: Duration);

    /// Set output volume, `0.0..=1.0`
    fn set_volume(&mut self, volume: f32);

    fn is_playing(&self) -> bool;

    fn position(&self) -> Duration;

    /// Duration of the loaded source, zero if unknown
    fn duration(&self) -> Duration;

    /// Free the underlying player. Called once, on session shutdown.
    fn release(&mut self) {}
}

/// Exclusive audio output arbitration with other applications
pub trait AudioFocus: Send {
    /// Request focus; returns whether it was granted
    fn request(&mut self) -> bool;

    fn abandon(&mut self);
}

/// Focus arbiter for platforms without one. Always grants.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFocus;

impl AudioFocus for NoFocus {
    fn request(&mut self) -> bool {
        true
    }

    fn abandon(&mut self) {}
}

/// Asynchronous outcome reported by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineSignalKind {
    /// Source prepared, ready to start
    Ready,
    /// Source played to its end
    Completed,
    Error { code: i32, extra: i32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSignal {
    pub load: LoadId,
    pub kind: EngineSignalKind,
}

impl EngineSignal {
    #[must_use]
    pub const fn ready(load: LoadId) -> Self {
        Self {
            load,
            kind: EngineSignalKind::Ready,
        }
    }

    #[must_use]
    pub const fn completed(load: LoadId) -> Self {
        Self {
            load,
            kind: EngineSignalKind::Completed,
        }
    }

    #[must_use]
    pub const fn error(load: LoadId, code: i32, extra: i32) -> Self {
        Self {
            load,
            kind: EngineSignalKind::Error { code, extra },
        }
    }
}

/// External audio focus change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusChange {
    Gain,
    /// Another application took output for good
    Loss,
    /// Output taken briefly, e.g. for a call
    LossTransient,
    /// Output shared briefly; keep playing quietly
    LossTransientCanDuck,
}
