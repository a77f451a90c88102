use crate::playlist::TrackRef;
use std::time::Duration;

/// Category of a reported failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    EmptyPlaylist,
    InvalidPosition,
    MissingUrl,
    Engine,
    ParseFailure,
    FocusDenied,
}

/// Events emitted by a playback session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Engine started (or resumed) playing
    Play {
        index: usize,
        position: Duration,
    },
    Pause {
        position: Duration,
    },
    Stop,
    /// Current track played to its end
    Completion {
        index: usize,
    },
    /// A new load was issued for this track
    TrackChanged {
        track: TrackRef,
        index: usize,
    },
    /// Navigation landed on the track already loaded; nothing was reloaded
    TrackUnchanged {
        track: TrackRef,
        index: usize,
    },
    Error {
        kind: ErrorKind,
        message: String,
    },
    /// Highlighted lyric line changed; `None` before the first line
    HighlightChanged {
        line: Option<usize>,
    },
    LyricsLoaded {
        lines: usize,
    },
    LyricsNotFound,
}
