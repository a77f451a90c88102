pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod lrc;
pub mod paths;
pub mod playlist;
pub mod session;
pub mod sync;
pub mod time;

pub use config::{EventsConfig, LoggingConfig, PlaybackConfig, PlayerConfig, SyncConfig};
pub use engine::{
    AudioEngine, AudioFocus, EngineFault, EngineSignal, EngineSignalKind, FocusChange, LoadId,
    NoFocus,
};
pub use error::{CoreError, Result};
pub use events::{ErrorKind, SessionEvent};
pub use lrc::{is_valid_lrc, lyric_tag, TimedLine, Timeline};
pub use paths::{config_dir, CONFIG_DIR_ENV, CONFIG_DIR_NAME, CONFIG_FILE_NAME, LOG_FILE_NAME};
pub use playlist::{Direction, PlaybackPolicy, PlaylistCursor, TrackRef};
pub use session::{PauseReason, PlaybackSession, SessionOptions, SessionState};
pub use sync::{HighlightTracker, SyncLoop, DEFAULT_TICK_INTERVAL};
pub use time::DurationExt;
