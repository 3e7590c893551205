//! Writing playlists that point at the mirrored tree.

use super::{m3u, Playlist};
use crate::error::{MirrorError, Result};
use crate::fsutil::atomic_write;
use crate::manifest::Manifest;
use std::path::Path;
use tracing::debug;

/// Render `playlist` with every entry pointing at its sanitized
/// destination-relative path.
///
/// Titles are `Artist - Title` from the probed tags when available, falling
/// back to the title carried by the source playlist; durations likewise.
pub fn rewrite_playlist(playlist: &Playlist, manifest: &Manifest) -> Result<String> {
    let mut rows = Vec::with_capacity(playlist.entries.len());
    for entry in &playlist.entries {
        let item = manifest.get(&entry.path).ok_or_else(|| MirrorError::Export {
            message: format!(
                "{} references {} which is not in the manifest",
                playlist.name,
                entry.path.display()
            ),
        })?;

        let title = item.info.display_title().or_else(|| entry.title.clone());
        let duration = item
            .info
            .duration
            .map(|seconds| seconds as i64)
            .or(entry.duration);
        rows.push((item.relative_path.as_str(), title, duration));
    }

    Ok(m3u::render(
        rows.iter()
            .map(|(location, title, duration)| (*location, title.as_deref(), *duration)),
    ))
}

/// Write every playlist into `dest_root`. Returns the number written.
pub fn write_playlists(dest_root: &Path, playlists: &[Playlist], manifest: &Manifest) -> Result<usize> {
    for playlist in playlists {
        let text = rewrite_playlist(playlist, manifest)?;
        atomic_write(&dest_root.join(&playlist.name), text.as_bytes())?;
        debug!("Wrote playlist {}", playlist.name);
    }
    Ok(playlists.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::Fingerprint;
    use crate::manifest::SourceItem;
    use crate::media::{AudioFormat, TrackInfo};
    use crate::playlist::PlaylistEntry;
    use tempfile::TempDir;

    fn manifest() -> Manifest {
        Manifest::from_items(vec![
            SourceItem {
                source_path: "/music/Björk/Jóga.mp3".into(),
                relative_path: "Bjork/Joga.mp3".to_string(),
                fingerprint: Fingerprint::from_hex("h1"),
                info: TrackInfo::new(AudioFormat::Mp3)
                    .with_tags("Björk", "Jóga")
                    .with_duration(305.6),
            },
            SourceItem {
                source_path: "/music/Untagged/x.m4a".into(),
                relative_path: "Untagged/x.m4a".to_string(),
                fingerprint: Fingerprint::from_hex("h2"),
                info: TrackInfo::new(AudioFormat::Alac),
            },
        ])
    }

    #[test]
    fn test_rewrite_uses_destination_paths_and_tags() {
        let playlist = Playlist::new("BEST.m3u")
            .with_entry(PlaylistEntry::new("/music/Björk/Jóga.mp3").with_title("ignored"))
            .with_entry(
                PlaylistEntry::new("/music/Untagged/x.m4a")
                    .with_title("From playlist")
                    .with_duration(42),
            );

        let text = rewrite_playlist(&playlist, &manifest()).unwrap();
        assert_eq!(
            text,
            "#EXTM3U\n\
             #EXTINF:305,Björk - Jóga\n\
             Bjork/Joga.mp3\n\
             #EXTINF:42,From playlist\n\
             Untagged/x.m4a\n"
        );
    }

    #[test]
    fn test_rewrite_rejects_unknown_track() {
        let playlist =
            Playlist::new("BEST.m3u").with_entry(PlaylistEntry::new("/music/missing.mp3"));
        let result = rewrite_playlist(&playlist, &manifest());
        assert!(matches!(result, Err(MirrorError::Export { .. })));
    }

    #[test]
    fn test_write_playlists() {
        let temp_dir = TempDir::new().unwrap();
        let playlists = vec![
            Playlist::new("BEST.m3u").with_entry(PlaylistEntry::new("/music/Björk/Jóga.mp3")),
            Playlist::new("DNB.m3u").with_entry(PlaylistEntry::new("/music/Untagged/x.m4a")),
        ];

        let written = write_playlists(temp_dir.path(), &playlists, &manifest()).unwrap();
        assert_eq!(written, 2);
        let best = std::fs::read_to_string(temp_dir.path().join("BEST.m3u")).unwrap();
        assert!(best.contains("Bjork/Joga.mp3"));
        assert!(temp_dir.path().join("DNB.m3u").exists());
    }
}
