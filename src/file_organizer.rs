/// Moving files from the watched folder into their category subfolders.
///
/// An [`Organizer`] takes one path at a time, decides whether it should be
/// touched at all, and if so moves it to `<root>/<category>/<file name>`,
/// renaming on conflict. Every call produces exactly one [`OrganizeEvent`],
/// which is handed to the configured [`Notifier`] and returned to the caller.
use crate::config::CompiledFilters;
use crate::conflict::ConflictResolver;
use crate::error::OrganizeError;
use crate::file_category::CategoryMap;
use crate::notifier::{LogNotifier, Notifier};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Record of what happened to one file.
#[derive(Debug, Clone, Serialize)]
pub struct OrganizeEvent {
    /// Local time at which the event was produced.
    pub timestamp: DateTime<Local>,
    /// Path the organizer was asked to process.
    pub source_path: PathBuf,
    /// Category the file belongs to, whether or not it was moved.
    pub category: String,
    /// Final location of the file, when it was moved.
    pub destination_path: Option<PathBuf>,
    pub outcome: Outcome,
}

impl OrganizeEvent {
    pub fn new(
        source_path: PathBuf,
        category: String,
        destination_path: Option<PathBuf>,
        outcome: Outcome,
    ) -> Self {
        Self {
            timestamp: Local::now(),
            source_path,
            category,
            destination_path,
            outcome,
        }
    }

    /// True for `Moved` and `Renamed`.
    pub fn is_moved(&self) -> bool {
        matches!(self.outcome, Outcome::Moved | Outcome::Renamed)
    }
}

/// Result of organizing a single path.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    /// Moved under its original name.
    Moved,
    /// Moved, but under a new name because the destination was taken.
    Renamed,
    /// Left where it is.
    Skipped { reason: SkipReason },
    /// Could not be moved.
    Failed { error: OrganizeError },
}

/// Why a path was left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Directory,
    /// Symlinks, sockets, fifos and other non-regular files.
    NotRegularFile,
    /// Already sitting in the folder of its own category.
    AlreadyCategorized,
    /// Not a direct child of the watched folder.
    OutsideRoot,
    /// Excluded by the configured filter rules.
    Filtered,
    /// Owned by the application itself (log file, config file).
    Ignored,
    /// Named exactly like its own category, so the folder cannot be created
    /// next to it.
    NamedLikeCategory,
}

/// Moves files from a root folder into category subfolders.
///
/// The organizer holds no mutable state; one instance can be shared between a
/// startup sweep and a watch loop.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use tidywatch::file_category::CategoryMap;
/// use tidywatch::file_organizer::{Organizer, Outcome};
///
/// let dir = tempfile::tempdir().unwrap();
/// std::fs::write(dir.path().join("report.pdf"), b"%PDF").unwrap();
///
/// let organizer = Organizer::new(dir.path(), Arc::new(CategoryMap::default()));
/// let event = organizer.organize(&dir.path().join("report.pdf"));
///
/// assert_eq!(event.outcome, Outcome::Moved);
/// assert!(dir.path().join("Documents").join("report.pdf").exists());
/// ```
pub struct Organizer {
    root: PathBuf,
    categories: Arc<CategoryMap>,
    filters: Arc<CompiledFilters>,
    notifier: Arc<dyn Notifier>,
    ignored: Vec<PathBuf>,
    resolver: ConflictResolver,
}

impl Organizer {
    /// Creates an organizer for `root` with no filters and a logging notifier.
    ///
    /// The root is canonicalized when possible so that paths reported through
    /// symlinked prefixes still compare equal to it.
    pub fn new(root: impl Into<PathBuf>, categories: Arc<CategoryMap>) -> Self {
        let root = root.into();
        let root = fs::canonicalize(&root).unwrap_or(root);
        Self {
            root,
            categories,
            filters: Arc::new(CompiledFilters::allow_all()),
            notifier: Arc::new(LogNotifier),
            ignored: Vec::new(),
            resolver: ConflictResolver,
        }
    }

    pub fn with_filters(mut self, filters: Arc<CompiledFilters>) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Paths that are never moved, typically the log and config files.
    pub fn with_ignored<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.ignored
            .extend(paths.into_iter().map(|p| canonical_path(p.as_ref())));
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn categories(&self) -> &CategoryMap {
        &self.categories
    }

    /// Organizes one path and reports the result.
    ///
    /// Never fails: problems are reported as an `Outcome::Failed` event.
    pub fn organize(&self, file_path: &Path) -> OrganizeEvent {
        let event = self.process(file_path);
        self.notifier.notify(&event);
        event
    }

    /// Organizes every regular file directly inside the root, in listing order.
    ///
    /// Subdirectories (category folders included) produce no events. A root
    /// that cannot be listed yields no events.
    pub fn organize_existing(&self) -> Vec<OrganizeEvent> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                error!(root = %self.root.display(), error = %e, "Cannot list folder");
                return Vec::new();
            }
        };

        entries
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(root = %self.root.display(), error = %e, "Skipping unreadable entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|entry| self.organize(&entry.path()))
            .collect()
    }

    fn process(&self, file_path: &Path) -> OrganizeEvent {
        let path = canonical_path(file_path);
        let category = self.categories.category_for_path(&path).to_string();
        let skipped = |reason: SkipReason| {
            debug!(path = %path.display(), ?reason, "Leaving file in place");
            OrganizeEvent::new(
                file_path.to_path_buf(),
                category.clone(),
                None,
                Outcome::Skipped { reason },
            )
        };
        let failed = |error: OrganizeError| {
            OrganizeEvent::new(
                file_path.to_path_buf(),
                category.clone(),
                None,
                Outcome::Failed { error },
            )
        };

        let metadata = match fs::symlink_metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) => {
                return failed(OrganizeError::from_io(&e, file_path, |reason| {
                    OrganizeError::MoveFailed {
                        from: file_path.to_path_buf(),
                        to: self.root.join(&category),
                        reason,
                    }
                }));
            }
        };
        if metadata.is_dir() {
            return skipped(SkipReason::Directory);
        }
        if !metadata.is_file() {
            return skipped(SkipReason::NotRegularFile);
        }

        if self.ignored.iter().any(|ignored| *ignored == path) {
            return skipped(SkipReason::Ignored);
        }

        let parent = path.parent().unwrap_or_else(|| Path::new(""));
        if parent != self.root {
            let in_own_folder = parent.parent() == Some(self.root.as_path())
                && parent.file_name().is_some_and(|name| name == category.as_str());
            return skipped(if in_own_folder {
                SkipReason::AlreadyCategorized
            } else {
                SkipReason::OutsideRoot
            });
        }

        let relative = path.strip_prefix(&self.root).unwrap_or(path.as_path());
        if !self.filters.should_include(relative) {
            return skipped(SkipReason::Filtered);
        }

        let Some(file_name) = path.file_name() else {
            return skipped(SkipReason::NotRegularFile);
        };
        if file_name == category.as_str() {
            return skipped(SkipReason::NamedLikeCategory);
        }
        let category_dir = self.root.join(&category);
        if let Err(e) = fs::create_dir_all(&category_dir) {
            let error = if e.kind() == io::ErrorKind::PermissionDenied {
                OrganizeError::PermissionDenied {
                    path: category_dir,
                    reason: e.to_string(),
                }
            } else {
                OrganizeError::DestinationCreateFailed {
                    path: category_dir,
                    reason: e.to_string(),
                }
            };
            return failed(error);
        }

        let wanted = category_dir.join(file_name);
        let destination = self.resolver.resolve(&wanted);

        match move_file(&path, &destination) {
            Ok(()) => {
                let outcome = if destination == wanted {
                    Outcome::Moved
                } else {
                    Outcome::Renamed
                };
                OrganizeEvent::new(
                    file_path.to_path_buf(),
                    category.clone(),
                    Some(destination),
                    outcome,
                )
            }
            Err(error) => failed(error),
        }
    }
}

/// Resolves symlinks in the parent directory, keeping the final component as is.
///
/// The file itself may be a symlink or may already be gone, so only the parent
/// is canonicalized.
fn canonical_path(path: &Path) -> PathBuf {
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => fs::canonicalize(parent)
            .map(|parent| parent.join(name))
            .unwrap_or_else(|_| path.to_path_buf()),
        _ => path.to_path_buf(),
    }
}

/// Moves `src` to `dest`: a plain rename first, then copy and delete.
fn move_file(src: &Path, dest: &Path) -> Result<(), OrganizeError> {
    let move_failed = |reason: String| OrganizeError::MoveFailed {
        from: src.to_path_buf(),
        to: dest.to_path_buf(),
        reason,
    };

    let rename_err = match fs::rename(src, dest) {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };
    if matches!(
        rename_err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
    ) {
        return Err(rename_refused(&rename_err, src, dest));
    }

    warn!(
        src = %src.display(),
        dest = %dest.display(),
        error = %rename_err,
        "Rename failed, falling back to copy"
    );
    copy_then_remove(src, dest).map_err(|copy_err| {
        OrganizeError::from_io(&copy_err, src, |reason| {
            move_failed(format!("rename: {}; copy: {}", rename_err, reason))
        })
    })
}

/// Classifies a rename that failed with `NotFound` or `PermissionDenied`.
///
/// A denied rename whose source can still be opened points at the
/// destination folder, so the error names `dest`.
fn rename_refused(err: &io::Error, src: &Path, dest: &Path) -> OrganizeError {
    if err.kind() == io::ErrorKind::PermissionDenied && File::open(src).is_ok() {
        return OrganizeError::PermissionDenied {
            path: dest.to_path_buf(),
            reason: err.to_string(),
        };
    }
    OrganizeError::from_io(err, src, |reason| OrganizeError::MoveFailed {
        from: src.to_path_buf(),
        to: dest.to_path_buf(),
        reason,
    })
}

/// Copies into a freshly created `dest`, then removes `src`. If the source
/// cannot be removed the copy is deleted again so the file exists only once.
fn copy_then_remove(src: &Path, dest: &Path) -> io::Result<()> {
    let mut reader = File::open(src)?;
    let permissions = reader.metadata()?.permissions();
    let mut writer = OpenOptions::new().write(true).create_new(true).open(dest)?;

    let copied = io::copy(&mut reader, &mut writer).and_then(|_| writer.sync_all());
    drop(writer);
    if let Err(e) = copied {
        let _ = fs::remove_file(dest);
        return Err(e);
    }
    if let Err(e) = fs::set_permissions(dest, permissions) {
        debug!(dest = %dest.display(), error = %e, "Could not copy permissions");
    }

    if let Err(e) = fs::remove_file(src) {
        let _ = fs::remove_file(dest);
        return Err(e);
    }
    Ok(())
}
