//! Failure modes of organizing a file.
//!
//! Every per-file failure is turned into one of these values and carried inside
//! an [`OrganizeEvent`](crate::file_organizer::OrganizeEvent); none of them ever
//! reaches the watch loop as an `Err`.

use crate::config::ConfigError;
use serde::{Serialize, Serializer};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrganizeError {
    #[error("Source file vanished before it could be moved: {}", .0.display())]
    SourceMissing(PathBuf),

    #[error("Permission denied on {}: {reason}", path.display())]
    PermissionDenied { path: PathBuf, reason: String },

    #[error("Failed to create category directory {}: {reason}", path.display())]
    DestinationCreateFailed { path: PathBuf, reason: String },

    #[error("Failed to move {} to {}: {reason}", from.display(), to.display())]
    MoveFailed {
        from: PathBuf,
        to: PathBuf,
        reason: String,
    },

    #[error("Failed to load configuration: {0}")]
    ConfigLoadFailed(#[from] ConfigError),
}

impl OrganizeError {
    /// Classifies an IO error raised while touching `source`.
    ///
    /// Not-found and permission errors get their own variants; anything else
    /// becomes whatever `otherwise` builds.
    pub(crate) fn from_io(
        err: &io::Error,
        source: &Path,
        otherwise: impl FnOnce(String) -> OrganizeError,
    ) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::SourceMissing(source.to_path_buf()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied {
                path: source.to_path_buf(),
                reason: err.to_string(),
            },
            _ => otherwise(err.to_string()),
        }
    }

    /// Short machine-friendly name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SourceMissing(_) => "source_missing",
            Self::PermissionDenied { .. } => "permission_denied",
            Self::DestinationCreateFailed { .. } => "destination_create_failed",
            Self::MoveFailed { .. } => "move_failed",
            Self::ConfigLoadFailed(_) => "config_load_failed",
        }
    }
}

impl Serialize for OrganizeError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("OrganizeError", 2)?;
        state.serialize_field("kind", self.kind())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}
