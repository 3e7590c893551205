//! Playlists: where the manifest comes from and what gets written back.
//!
//! ```text
//! PlaylistSource (M3uDirectory | ExporterCommand)
//!     │ load()
//!     ▼
//! Vec<Playlist> ──► Manifest ──► sync ──► export::write_playlists
//! ```

mod export;
pub mod m3u;
mod source;

pub use export::{rewrite_playlist, write_playlists};
pub use source::{ExporterCommand, M3uDirectory, PlaylistSource};

use std::path::{Path, PathBuf};

/// One track reference inside a playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistEntry {
    /// Absolute source path of the track.
    pub path: PathBuf,
    /// Display title, if the playlist carried one.
    pub title: Option<String>,
    /// Duration in whole seconds, if known.
    pub duration: Option<i64>,
}

impl PlaylistEntry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            title: None,
            duration: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_duration(mut self, seconds: i64) -> Self {
        self.duration = Some(seconds);
        self
    }
}

/// A named, ordered list of tracks.
#[derive(Debug, Clone, PartialEq)]
pub struct Playlist {
    /// File name of the playlist, e.g. `BEST.m3u`.
    pub name: String,
    pub entries: Vec<PlaylistEntry>,
}

impl Playlist {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    pub fn with_entry(mut self, entry: PlaylistEntry) -> Self {
        self.entries.push(entry);
        self
    }

    /// Name without extension (`BEST.m3u` -> `BEST`).
    pub fn stem(&self) -> &str {
        Path::new(&self.name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.name)
    }
}

/// Keep only playlists whose stem is in `include`. An empty list keeps all.
pub fn filter_playlists(playlists: Vec<Playlist>, include: &[String]) -> Vec<Playlist> {
    if include.is_empty() {
        return playlists;
    }
    playlists
        .into_iter()
        .filter(|p| include.iter().any(|name| name == p.stem()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stem() {
        assert_eq!(Playlist::new("BEST.m3u").stem(), "BEST");
        assert_eq!(Playlist::new("GOOGLE PLAY.m3u").stem(), "GOOGLE PLAY");
        assert_eq!(Playlist::new("plain").stem(), "plain");
    }

    #[test]
    fn test_filter_playlists() {
        let playlists = vec![
            Playlist::new("BEST.m3u"),
            Playlist::new("DNB.m3u"),
            Playlist::new("Podcasts.m3u"),
        ];

        let all = filter_playlists(playlists.clone(), &[]);
        assert_eq!(all.len(), 3);

        let some = filter_playlists(playlists, &["BEST".to_string(), "DNB".to_string()]);
        let names: Vec<&str> = some.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["BEST.m3u", "DNB.m3u"]);
    }
}
