//! Error types for the relay engine.
//!
//! `RelayError` covers everything that can go wrong while talking to the remote
//! source, staging a download, or relocating a staged file. Whether an error is
//! fatal for the whole run or isolated to a single file depends on the stage it
//! occurs in; `ErrorKind` gives the coarse classification the job reports on.

use std::io;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Result alias used throughout the engine.
pub type RelayResult<T> = Result<T, RelayError>;

/// Errors raised by the remote session, staging store and relocation step.
///
/// File-level failures (one download or one move) are recorded on the
/// corresponding `FileItem`; they never abort the run.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The server rejected the credentials. Never retried automatically.
    #[error("authentication failed for user '{user}': {detail}")]
    Authentication { user: String, detail: String },

    /// Network, DNS, timeout or protocol greeting failure.
    #[error("cannot reach {address}: {detail}")]
    Connectivity { address: String, detail: String },

    /// Remote directory missing or inaccessible, or listing refused.
    #[error("remote path '{path}' unavailable: {detail}")]
    RemotePath { path: String, detail: String },

    /// Retrieval of a single file failed (mid-stream disconnect etc).
    #[error("transfer of '{file}' failed: {detail}")]
    Transfer { file: String, detail: String },

    /// A remote name that cannot be stored safely under the staging directory.
    #[error("refusing file name '{name}': {reason}")]
    InvalidFileName { name: String, reason: &'static str },

    /// Local filesystem failure in the staging or destination directory.
    #[error("{operation} failed for {}: {source}", .path.display())]
    Storage {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The destination already holds a file with this name.
    #[error("'{file}' already exists at {}", .destination.display())]
    Collision { file: String, destination: PathBuf },

    /// Moving a staged file into the destination failed.
    #[error("moving '{file}' to {} failed: {source}", .destination.display())]
    Relocation {
        file: String,
        destination: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Coarse classification reported on file items and run errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Authentication,
    Connectivity,
    RemotePath,
    Transfer,
    Storage,
    Relocation,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Authentication => "authentication",
            ErrorKind::Connectivity => "connectivity",
            ErrorKind::RemotePath => "remote_path",
            ErrorKind::Transfer => "transfer",
            ErrorKind::Storage => "storage",
            ErrorKind::Relocation => "relocation",
        };
        f.write_str(name)
    }
}

impl RelayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Authentication { .. } => ErrorKind::Authentication,
            Self::Connectivity { .. } => ErrorKind::Connectivity,
            Self::RemotePath { .. } => ErrorKind::RemotePath,
            Self::Transfer { .. } | Self::InvalidFileName { .. } => ErrorKind::Transfer,
            Self::Storage { .. } => ErrorKind::Storage,
            Self::Collision { .. } | Self::Relocation { .. } => ErrorKind::Relocation,
        }
    }

    /// True for error kinds that end the run when they surface before any
    /// file is relocated: the session could not be set up or the staging
    /// directory is unusable. Per-file kinds never are.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Authentication
                | ErrorKind::Connectivity
                | ErrorKind::RemotePath
                | ErrorKind::Storage
        )
    }

    /// Rejected credentials need a human; everything else may clear up by the
    /// next scheduled run.
    pub fn requires_operator(&self) -> bool {
        self.kind() == ErrorKind::Authentication
    }

    /// Extract the OS error code from this error, if available.
    pub fn raw_os_error(&self) -> Option<u32> {
        match self {
            Self::Storage { source, .. } | Self::Relocation { source, .. } => {
                source.raw_os_error().map(|e| e as u32)
            }
            _ => None,
        }
    }

    pub(crate) fn storage(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Storage {
            operation,
            path: path.into(),
            source,
        }
    }
}

/// Invalid relay configuration, detected before the scheduler starts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("server host must not be empty")]
    EmptyHost,

    #[error("server port must be non-zero")]
    ZeroPort,

    #[error("remote directory must not be empty")]
    EmptyRemoteDirectory,

    #[error("staging and destination directories must differ ({0})")]
    SameDirectories(PathBuf),

    #[error("invalid time of day '{0}', expected HH:MM or HH:MM:SS")]
    InvalidTimeOfDay(String),
}
