use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    // Playlist navigation errors
    #[error("Playlist is empty")]
    EmptyPlaylist,

    #[error("Invalid playlist position {index} (playlist has {len} tracks)")]
    InvalidPosition { index: usize, len: usize },

    #[error("Track {mid} has no playable URL")]
    MissingUrl { mid: String },

    // Engine errors
    #[error("Audio engine error {code}: {message}")]
    EngineError { code: i32, message: String },

    // Lyrics errors
    #[error("Lyric text could not be parsed into a timeline")]
    ParseFailure,

    // Focus errors
    #[error("Audio focus request was denied")]
    FocusDenied,

    #[error("Playback session has been shut down")]
    SessionClosed,

    // Configuration errors
    #[error("Config file not found at {path}. A template has been created - edit it if needed and restart.")]
    ConfigNotFound { path: PathBuf },

    #[error("Invalid config: {message}")]
    ConfigInvalid { message: String },

    #[error("Failed to parse config file: {0}")]
    ConfigParseError(#[from] toml::de::Error),

    // IO errors
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
