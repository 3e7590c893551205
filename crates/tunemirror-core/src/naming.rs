//! Destination-safe path sanitization.
//!
//! Destination paths are restricted to ASCII letters, digits, `.`, `/` and
//! space. Accented letters keep their base letter; everything else becomes
//! `_`.

use regex::Regex;
use std::path::{Component, Path};
use std::sync::LazyLock;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Characters not allowed in destination paths.
static FORBIDDEN_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9./ ]").expect("valid forbidden-chars regex"));

/// Sanitize a `/`-separated relative path.
///
/// # Rules Applied
/// 1. Decompose (NFD)
/// 2. Drop combining marks
/// 3. Recompose (NFC)
/// 4. Replace every character outside `[a-zA-Z0-9./ ]` with `_`
///
/// # Examples
///
/// ```
/// use tunemirror_core::naming::sanitize_path;
///
/// assert_eq!(sanitize_path("Beyoncé/Déjà Vu.mp3"), "Beyonce/Deja Vu.mp3");
/// assert_eq!(sanitize_path("AC-DC/T.N.T!.mp3"), "AC_DC/T.N.T_.mp3");
/// ```
pub fn sanitize_path(path: &str) -> String {
    let stripped: String = path
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .nfc()
        .collect();
    FORBIDDEN_CHARS.replace_all(&stripped, "_").into_owned()
}

/// Express a relative filesystem path with `/` separators.
///
/// Returns `None` if the path is absolute or escapes its base (`..`).
pub fn to_slash_path(path: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(parts.join("/"))
}

/// Every ancestor prefix of a `/`-separated path, including the path itself.
///
/// ```
/// use tunemirror_core::naming::path_with_ancestors;
///
/// assert_eq!(path_with_ancestors("a/b/c.mp3"), vec!["a/b/c.mp3", "a/b", "a"]);
/// ```
pub fn path_with_ancestors(path: &str) -> Vec<&str> {
    let mut result = Vec::new();
    let mut current = path.trim_end_matches('/');
    while !current.is_empty() {
        result.push(current);
        current = match current.rfind('/') {
            Some(pos) => &current[..pos],
            None => "",
        };
    }
    result
}
