//! Where the player keeps its files.
//!
//! Everything lives in one directory: `$CATMUSIC_CONFIG_DIR` when set,
//! otherwise `~/.config/catmusic`.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Environment variable that relocates the whole file directory
pub const CONFIG_DIR_ENV: &str = "CATMUSIC_CONFIG_DIR";

pub const CONFIG_DIR_NAME: &str = "catmusic";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const LOG_FILE_NAME: &str = "catmusic.log";

/// Resolve the file directory from an override and a home directory.
///
/// An empty override counts as unset. Without a home directory the
/// current directory stands in for it.
#[must_use]
pub fn resolve_config_dir(dir_override: Option<OsString>, home: Option<&Path>) -> PathBuf {
    match dir_override.filter(|dir| !dir.is_empty()) {
        Some(dir) => PathBuf::from(dir),
        None => home
            .unwrap_or(Path::new("."))
            .join(".config")
            .join(CONFIG_DIR_NAME),
    }
}

#[must_use]
pub fn config_dir() -> PathBuf {
    resolve_config_dir(
        std::env::var_os(CONFIG_DIR_ENV),
        dirs::home_dir().as_deref(),
    )
}

#[must_use]
pub fn config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}

/// Written only when `[logging] file_enabled` is set
#[must_use]
pub fn log_file_path() -> PathBuf {
    config_dir().join(LOG_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_dir_under_home() {
        let dir = resolve_config_dir(None, Some(Path::new("/home/cat")));
        assert_eq!(dir, PathBuf::from("/home/cat/.config/catmusic"));
    }

    #[test]
    fn test_override_wins() {
        let dir = resolve_config_dir(
            Some(OsString::from("/srv/catmusic")),
            Some(Path::new("/home/cat")),
        );
        assert_eq!(dir, PathBuf::from("/srv/catmusic"));
    }

    #[test]
    fn test_empty_override_and_missing_home() {
        let dir = resolve_config_dir(Some(OsString::new()), None);
        assert_eq!(dir, PathBuf::from("./.config/catmusic"));
    }

    #[test]
    fn test_files_share_the_dir() {
        assert_eq!(config_path().parent(), Some(config_dir().as_path()));
        assert_eq!(log_file_path().file_name().unwrap(), LOG_FILE_NAME);
    }
}
