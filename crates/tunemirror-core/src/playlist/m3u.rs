//! Extended M3U reading and writing.

use super::{Playlist, PlaylistEntry};
use std::path::PathBuf;

const HEADER: &str = "#EXTM3U";
const EXTINF: &str = "#EXTINF:";
const FILE_URL_PREFIX: &str = "file://";

/// Parse playlist text. Unknown directives and blank lines are ignored;
/// `file://` prefixes are stripped from track locations.
pub fn parse(name: &str, content: &str) -> Playlist {
    let mut playlist = Playlist::new(name);
    let mut pending: Option<(Option<i64>, Option<String>)> = None;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line == HEADER {
            continue;
        }
        if let Some(info) = line.strip_prefix(EXTINF) {
            pending = Some(parse_extinf(info));
            continue;
        }
        if line.starts_with('#') {
            continue;
        }

        let location = line.strip_prefix(FILE_URL_PREFIX).unwrap_or(line);
        let (duration, title) = pending.take().unwrap_or((None, None));
        playlist.entries.push(PlaylistEntry {
            path: PathBuf::from(location),
            title,
            duration,
        });
    }

    playlist
}

/// `<seconds>,<title>`; negative or unparsable durations are unknown.
fn parse_extinf(info: &str) -> (Option<i64>, Option<String>) {
    let (duration, title) = match info.split_once(',') {
        Some((duration, title)) => (duration, Some(title.trim())),
        None => (info, None),
    };

    let duration = duration
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|d| *d >= 0.0)
        .map(|d| d as i64);
    let title = title.filter(|t| !t.is_empty()).map(str::to_string);
    (duration, title)
}

/// Render `(location, title, duration)` entries as extended M3U text.
pub fn render<'a, I>(entries: I) -> String
where
    I: IntoIterator<Item = (&'a str, Option<&'a str>, Option<i64>)>,
{
    let mut out = String::from(HEADER);
    out.push('\n');
    for (location, title, duration) in entries {
        out.push_str(EXTINF);
        out.push_str(&duration.unwrap_or(-1).to_string());
        out.push(',');
        out.push_str(title.unwrap_or(""));
        out.push('\n');
        out.push_str(location);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_extended_playlist() {
        let content = "#EXTM3U\n\
            #EXTINF:320,Daft Punk - One More Time\n\
            file:///Music/Daft Punk/Discovery/01 One More Time.mp3\n\
            \n\
            #EXTINF:312,Massive Attack - Teardrop\r\n\
            /Music/Massive Attack/Mezzanine/03 Teardrop.m4a\n";

        let playlist = parse("BEST.m3u", content);
        assert_eq!(playlist.name, "BEST.m3u");
        assert_eq!(playlist.entries.len(), 2);
        assert_eq!(
            playlist.entries[0].path,
            PathBuf::from("/Music/Daft Punk/Discovery/01 One More Time.mp3")
        );
        assert_eq!(
            playlist.entries[0].title.as_deref(),
            Some("Daft Punk - One More Time")
        );
        assert_eq!(playlist.entries[0].duration, Some(320));
        assert_eq!(
            playlist.entries[1].path,
            PathBuf::from("/Music/Massive Attack/Mezzanine/03 Teardrop.m4a")
        );
    }

    #[test]
    fn test_parse_plain_playlist() {
        let playlist = parse("plain.m3u", "/a.mp3\n# comment\n/b.mp3\n");
        assert_eq!(playlist.entries.len(), 2);
        assert_eq!(playlist.entries[1].title, None);
        assert_eq!(playlist.entries[1].duration, None);
    }

    #[test]
    fn test_parse_extinf_variants() {
        assert_eq!(parse_extinf("-1,Stream"), (None, Some("Stream".to_string())));
        assert_eq!(parse_extinf("245.9,"), (Some(245), None));
        assert_eq!(parse_extinf("abc"), (None, None));
        assert_eq!(
            parse_extinf("10,Artist - A, B"),
            (Some(10), Some("Artist - A, B".to_string()))
        );
    }

    #[test]
    fn test_render() {
        let text = render(vec![
            ("Daft Punk/One More Time.mp3", Some("Daft Punk - One More Time"), Some(320)),
            ("Unknown/track.mp3", None, None),
        ]);
        assert_eq!(
            text,
            "#EXTM3U\n\
             #EXTINF:320,Daft Punk - One More Time\n\
             Daft Punk/One More Time.mp3\n\
             #EXTINF:-1,\n\
             Unknown/track.mp3\n"
        );
    }

    #[test]
    fn test_rendered_playlist_parses_back_to_same_locations() {
        let text = render(vec![("A/b.mp3", Some("A - b"), Some(1))]);
        let playlist = parse("x.m3u", &text);
        assert_eq!(playlist.entries[0].path, PathBuf::from("A/b.mp3"));
        assert_eq!(playlist.entries[0].title.as_deref(), Some("A - b"));
    }
}
