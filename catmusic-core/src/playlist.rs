//! Playlist descriptors and the traversal cursor.

use crate::error::{CoreError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Immutable descriptor of one playlist entry.
///
/// Field names on the wire follow the song records served by the fetch layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackRef {
    pub id: u64,
    /// External media id used for URL resolution and lyric lookup
    pub mid: String,
    #[serde(rename = "name")]
    pub title: String,
    #[serde(rename = "singer")]
    pub artist: String,
    #[serde(rename = "pic", default)]
    pub cover_url: String,
    #[serde(rename = "duration", default)]
    pub duration_secs: u32,
    /// Filled in once by URL resolution, before playback is attempted
    #[serde(rename = "url", default, skip_serializing_if = "Option::is_none")]
    playable_url: Option<String>,
}

impl TrackRef {
    #[must_use]
    pub fn new(
        id: u64,
        mid: impl Into<String>,
        title: impl Into<String>,
        artist: impl Into<String>,
        duration_secs: u32,
    ) -> Self {
        Self {
            id,
            mid: mid.into(),
            title: title.into(),
            artist: artist.into(),
            cover_url: String::new(),
            duration_secs,
            playable_url: None,
        }
    }

    #[must_use]
    pub fn with_cover_url(mut self, cover_url: impl Into<String>) -> Self {
        self.cover_url = cover_url.into();
        self
    }

    #[must_use]
    pub fn with_playable_url(mut self, url: impl Into<String>) -> Self {
        self.set_playable_url(url);
        self
    }

    /// Resolved stream URL, if any. Empty strings count as unresolved.
    #[must_use]
    pub fn playable_url(&self) -> Option<&str> {
        self.playable_url.as_deref().filter(|url| !url.is_empty())
    }

    /// Set the playable URL. Only the first non-empty URL sticks.
    ///
    /// Returns whether the URL was applied.
    pub fn set_playable_url(&mut self, url: impl Into<String>) -> bool {
        if self.playable_url().is_some() {
            return false;
        }
        let url = url.into();
        if url.is_empty() {
            return false;
        }
        self.playable_url = Some(url);
        true
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.duration_secs))
    }
}

/// Rule for choosing the next or previous track
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackPolicy {
    #[default]
    LoopAll,
    LoopOne,
    /// Uniform pick over the whole playlist; the current track may repeat
    Shuffle,
}

impl PlaybackPolicy {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::LoopAll => "loop_all",
            Self::LoopOne => "loop_one",
            Self::Shuffle => "shuffle",
        }
    }
}

impl std::fmt::Display for PlaybackPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Previous,
}

/// Current position in an ordered playlist plus its traversal policy.
///
/// `position` is always a valid index while the playlist is non-empty and
/// stays at zero otherwise.
#[derive(Debug, Clone, Default)]
pub struct PlaylistCursor {
    tracks: Vec<TrackRef>,
    position: usize,
    policy: PlaybackPolicy,
}

impl PlaylistCursor {
    #[must_use]
    pub fn new(tracks: Vec<TrackRef>, policy: PlaybackPolicy) -> Self {
        Self {
            tracks,
            position: 0,
            policy,
        }
    }

    #[must_use]
    pub fn tracks(&self) -> &[TrackRef] {
        &self.tracks
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    #[must_use]
    pub const fn policy(&self) -> PlaybackPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: PlaybackPolicy) {
        self.policy = policy;
    }

    #[must_use]
    pub fn current(&self) -> Option<&TrackRef> {
        self.tracks.get(self.position)
    }

    /// Replace the track list and rewind to the first entry
    pub fn replace_tracks(&mut self, tracks: Vec<TrackRef>) {
        self.tracks = tracks;
        self.position = 0;
    }

    /// Move to an explicit index.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPosition` (leaving the position untouched) when `index`
    /// is out of range.
    pub fn set_position(&mut self, index: usize) -> Result<()> {
        if index >= self.tracks.len() {
            return Err(CoreError::InvalidPosition {
                index,
                len: self.tracks.len(),
            });
        }
        self.position = index;
        Ok(())
    }

    /// Step in `direction` under the cursor's policy and return the new index.
    ///
    /// # Errors
    ///
    /// Returns `EmptyPlaylist` if there are no tracks.
    pub fn advance(&mut self, direction: Direction) -> Result<usize> {
        self.advance_with(direction, &mut rand::rng())
    }

    /// [`Self::advance`] with a caller-supplied random source for `Shuffle`.
    ///
    /// # Errors
    ///
    /// Returns `EmptyPlaylist` if there are no tracks.
    pub fn advance_with<R: Rng>(&mut self, direction: Direction, rng: &mut R) -> Result<usize> {
        let len = self.tracks.len();
        if len == 0 {
            return Err(CoreError::EmptyPlaylist);
        }

        let previous = self.position;
        self.position = match (self.policy, direction) {
            (PlaybackPolicy::LoopAll, Direction::Next) => (previous + 1) % len,
            (PlaybackPolicy::LoopAll, Direction::Previous) => (previous + len - 1) % len,
            (PlaybackPolicy::LoopOne, _) => previous,
            (PlaybackPolicy::Shuffle, _) => rng.random_range(0..len),
        };

        debug!(
            "Cursor advanced {:?} under {}: {} -> {}",
            direction, self.policy, previous, self.position
        );
        Ok(self.position)
    }

    /// Apply resolved stream URLs keyed by `mid`. Returns how many tracks
    /// received a URL.
    pub fn apply_playable_urls(&mut self, urls: &HashMap<String, String>) -> usize {
        self.tracks
            .iter_mut()
            .filter_map(|track| urls.get(&track.mid).map(|url| track.set_playable_url(url.as_str())))
            .filter(|applied| *applied)
            .count()
    }
}
