//! Duplicate-name resolution.
//!
//! When a destination is already occupied, a free name is picked by inserting
//! " (n)" before the extension, counting up from 1:
//! - "report.pdf" -> "report (1).pdf", "report (2).pdf", ...
//! - "archive.tar.gz" -> "archive.tar (1).gz"
//! - "README" -> "README (1)"
//!
//! Existence is checked afresh for every candidate. Nothing here holds a lock,
//! so another process can still take the chosen name before the caller uses it.

use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::trace;

const MAX_TRIES: u64 = 10_000;

#[cfg(windows)]
const MAX_FILENAME_LEN: usize = 240;
#[cfg(not(windows))]
const MAX_FILENAME_LEN: usize = 255;

/// Picks a destination path that does not exist at call time.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictResolver;

impl ConflictResolver {
    /// Returns `destination` unchanged if it is free, otherwise the first free
    /// numbered variant of it.
    ///
    /// ```
    /// use tidywatch::conflict::ConflictResolver;
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let wanted = dir.path().join("report.pdf");
    /// assert_eq!(ConflictResolver.resolve(&wanted), wanted);
    ///
    /// std::fs::write(&wanted, b"taken").unwrap();
    /// assert_eq!(ConflictResolver.resolve(&wanted), dir.path().join("report (1).pdf"));
    /// ```
    pub fn resolve(&self, destination: &Path) -> PathBuf {
        if !is_occupied(destination) {
            return destination.to_path_buf();
        }

        let dir = destination.parent().unwrap_or_else(|| Path::new(""));
        let name = destination
            .file_name()
            .map(OsStr::to_os_string)
            .unwrap_or_else(|| OsString::from("file"));
        let base = Path::new(&name);
        let stem: OsString = base
            .file_stem()
            .map(OsStr::to_os_string)
            .unwrap_or_else(|| name.clone());
        let ext: Option<OsString> = base.extension().map(OsStr::to_os_string);

        for n in 1..=MAX_TRIES {
            let candidate = dir.join(build_name_with_suffix(&stem, ext.as_deref(), &format!(" ({n})")));
            if !is_occupied(&candidate) {
                return candidate;
            }
            if n == 3 {
                trace!(dir = %dir.display(), name = ?name, "several numbered duplicates present, still searching");
            }
        }

        // The directory is crowded with numbered variants; fall back to a timestamp.
        let stamp = chrono::Local::now().format(" (%Y%m%d-%H%M%S%.3f)").to_string();
        dir.join(build_name_with_suffix(&stem, ext.as_deref(), &stamp))
    }
}

/// True if anything (file, directory, dangling symlink) sits at `path`.
fn is_occupied(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

#[cfg(unix)]
fn name_len_units(s: &OsStr) -> usize {
    use std::os::unix::ffi::OsStrExt;
    s.as_bytes().len()
}

#[cfg(not(unix))]
fn name_len_units(s: &OsStr) -> usize {
    s.to_string_lossy().len()
}

/// Joins `stem + suffix + "." + ext`, shortening the stem so the result stays
/// within the platform filename limit.
fn build_name_with_suffix(stem: &OsStr, ext: Option<&OsStr>, suffix: &str) -> OsString {
    let mut overhead = suffix.len();
    let mut ext_part = OsString::new();
    if let Some(e) = ext {
        overhead += 1 + name_len_units(e);
        ext_part.push(".");
        ext_part.push(e);
    }

    let mut stem_os = stem.to_os_string();
    if name_len_units(stem) + overhead > MAX_FILENAME_LEN {
        let budget = MAX_FILENAME_LEN.saturating_sub(overhead).max(1);
        stem_os = truncate_stem(stem, budget);
    }

    let mut new_name = stem_os;
    new_name.push(suffix);
    new_name.push(&ext_part);
    new_name
}

/// Cuts `stem` down to at most `budget` length units. UTF-8 stems are cut on
/// a char boundary; other unix stems are cut byte-wise so no byte is replaced.
fn truncate_stem(stem: &OsStr, budget: usize) -> OsString {
    if let Some(text) = stem.to_str() {
        let mut acc = String::new();
        for ch in text.chars() {
            if acc.len() + ch.len_utf8() > budget {
                break;
            }
            acc.push(ch);
        }
        if acc.is_empty() {
            acc.push('f');
        }
        return OsString::from(acc);
    }

    #[cfg(unix)]
    {
        use std::os::unix::ffi::{OsStrExt, OsStringExt};
        let bytes = stem.as_bytes();
        let take = bytes.len().min(budget).max(1);
        OsString::from_vec(bytes[..take].to_vec())
    }

    #[cfg(not(unix))]
    {
        let lossy: String = stem.to_string_lossy().chars().take(budget.max(1)).collect();
        OsString::from(lossy)
    }
}
