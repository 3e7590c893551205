//! Removal of destination entries that no current track or playlist explains.
//!
//! ```text
//! actual   = every entry under dest_root (minus housekeeping files)
//! expected = every item path + all its ancestor directories
//!          + every playlist file name
//! leftover = actual - expected, removed deepest first
//! ```
//!
//! Paths are compared through [`CaseMode::key`], so on a case-insensitive
//! destination `Artist/Song.mp3` and `artist/song.mp3` are one entry.

use crate::config::{CaseMode, PathsConfig};
use crate::error::{MirrorError, Result};
use crate::naming::{path_with_ancestors, to_slash_path};
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Removes leftovers below a destination root.
#[derive(Debug, Clone)]
pub struct Reconciler {
    dest_root: PathBuf,
    case_mode: CaseMode,
    housekeeping: Vec<String>,
    protected: Vec<PathBuf>,
}

impl Reconciler {
    pub fn new(dest_root: impl Into<PathBuf>) -> Self {
        Self {
            dest_root: dest_root.into(),
            case_mode: CaseMode::default(),
            housekeeping: PathsConfig::HOUSEKEEPING_FILES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            protected: Vec::new(),
        }
    }

    pub fn case_mode(mut self, case_mode: CaseMode) -> Self {
        self.case_mode = case_mode;
        self
    }

    /// File names that are ignored and removed together with their directory.
    pub fn housekeeping(mut self, names: Vec<String>) -> Self {
        self.housekeeping = names;
        self
    }

    /// Never walk into or remove `path`, nor anything below it.
    pub fn protect(mut self, path: impl Into<PathBuf>) -> Self {
        self.protected.push(path.into());
        self
    }

    fn is_protected(&self, path: &Path) -> bool {
        self.protected.iter().any(|p| path.starts_with(p))
    }

    fn is_housekeeping(&self, name: &str) -> bool {
        self.housekeeping.iter().any(|h| h == name)
    }

    /// Every entry currently under the root, grouped by comparison key.
    ///
    /// A case-sensitive filesystem may hold several entries per key when
    /// compared case-insensitively; they are kept or removed together.
    fn actual(&self) -> Result<HashMap<String, Vec<(String, PathBuf)>>> {
        let mut actual: HashMap<String, Vec<(String, PathBuf)>> = HashMap::new();
        let walker = WalkDir::new(&self.dest_root)
            .min_depth(1)
            .into_iter()
            .filter_entry(|e| !self.is_protected(e.path()));
        for entry in walker {
            let entry = entry?;
            if self.is_housekeeping(&entry.file_name().to_string_lossy()) {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&self.dest_root)
                .ok()
                .and_then(to_slash_path)
                .ok_or_else(|| MirrorError::Walk {
                    message: "entry outside destination root".to_string(),
                    path: Some(entry.path().to_path_buf()),
                })?;
            actual
                .entry(self.case_mode.key(&relative))
                .or_default()
                .push((relative, entry.path().to_path_buf()));
        }
        Ok(actual)
    }

    fn expected<'a, I, P>(&self, item_paths: I, playlist_names: &[P]) -> HashSet<String>
    where
        I: IntoIterator<Item = &'a str>,
        P: AsRef<str>,
    {
        let mut expected = HashSet::new();
        for path in item_paths {
            for ancestor in path_with_ancestors(path) {
                expected.insert(self.case_mode.key(ancestor));
            }
        }
        for name in playlist_names {
            expected.insert(self.case_mode.key(name.as_ref()));
        }
        expected
    }

    /// Relative paths that would be removed, in removal order.
    pub fn leftovers<'a, I, P>(
        &self,
        item_paths: I,
        playlist_names: &[P],
    ) -> Result<Vec<(String, PathBuf)>>
    where
        I: IntoIterator<Item = &'a str>,
        P: AsRef<str>,
    {
        let expected = self.expected(item_paths, playlist_names);
        let mut leftovers: Vec<(String, PathBuf)> = self
            .actual()?
            .into_iter()
            .filter(|(key, _)| !expected.contains(key))
            .flat_map(|(_, entries)| entries)
            .collect();

        // Deepest first, then longest; ties in reverse lexical order.
        leftovers.sort_by_key(|(relative, _)| {
            Reverse((relative.matches('/').count(), relative.len(), relative.clone()))
        });
        Ok(leftovers)
    }

    /// Remove every leftover. Returns the removed relative paths in removal order.
    ///
    /// Must only run once no sync work is in flight. The first removal
    /// failure aborts; leftovers not yet reached stay in place.
    pub fn reconcile<'a, I, P>(&self, item_paths: I, playlist_names: &[P]) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = &'a str>,
        P: AsRef<str>,
    {
        let leftovers = self.leftovers(item_paths, playlist_names)?;
        debug!("{} leftovers under {}", leftovers.len(), self.dest_root.display());

        let mut removed = Vec::with_capacity(leftovers.len());
        for (relative, path) in leftovers {
            self.remove(&path)?;
            info!("Removed: {}", relative);
            removed.push(relative);
        }
        Ok(removed)
    }

    fn remove(&self, path: &Path) -> Result<()> {
        let metadata = std::fs::symlink_metadata(path).map_err(|e| MirrorError::Reconcile {
            path: path.to_path_buf(),
            source: e,
        })?;

        let result = if metadata.is_dir() {
            for name in &self.housekeeping {
                // Absent in the common case.
                let _ = std::fs::remove_file(path.join(name));
            }
            std::fs::remove_dir(path)
        } else {
            std::fs::remove_file(path)
        };

        result.map_err(|e| MirrorError::Reconcile {
            path: path.to_path_buf(),
            source: e,
        })
    }
}
