//! Core data model for relay runs.
//!
//! This module defines the structures that describe one execution of the
//! relay job:
//! - JobRun: a single trigger of the job, from connect to report
//! - FileItem: one file seen during the run (listed remotely or carried over)
//! - JobState, FileState, RunOutcome, Stage: enums tracking progress

use chrono::{DateTime, Local};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{ErrorKind, RelayError};

/// One execution of the relay job.
///
/// A JobRun is created at trigger time and finished once every stage has
/// completed or a fatal error aborted the run. It is never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct JobRun {
    /// Unique identifier for this run
    pub id: Uuid,

    /// Current stage of the run
    pub state: JobState,

    /// Every file attempted during the run, in attempt order
    pub files: Vec<FileItem>,

    /// Run-level error (fatal, or destination not usable)
    pub error: Option<RunError>,

    /// Final classification, set when the run reaches Reporting
    pub outcome: Option<RunOutcome>,

    /// When the run was triggered
    pub started_at: DateTime<Local>,

    /// When the run finished reporting
    pub finished_at: Option<DateTime<Local>>,
}

impl JobRun {
    pub fn new() -> Self {
        JobRun {
            id: Uuid::new_v4(),
            state: JobState::Idle,
            files: Vec::new(),
            error: None,
            outcome: None,
            started_at: Local::now(),
            finished_at: None,
        }
    }

    /// Files that reached the destination.
    pub fn relocated(&self) -> impl Iterator<Item = &FileItem> {
        self.files.iter().filter(|f| f.state == FileState::Relocated)
    }

    /// Files that failed in either stage.
    pub fn failed(&self) -> impl Iterator<Item = &FileItem> {
        self.files.iter().filter(|f| f.state == FileState::Failed)
    }

    /// Derive the outcome from the recorded file states and run error.
    pub fn classify(&self) -> RunOutcome {
        if let Some(error) = &self.error {
            if error.fatal {
                return RunOutcome::FatalFailure;
            }
            return RunOutcome::PartialFailure;
        }
        if self.files.iter().any(|f| f.state != FileState::Relocated) {
            RunOutcome::PartialFailure
        } else {
            RunOutcome::Success
        }
    }

    /// True when the run was stopped by rejected credentials.
    pub fn requires_operator(&self) -> bool {
        self.error
            .as_ref()
            .is_some_and(|e| e.kind == ErrorKind::Authentication)
    }

    /// Index of the item this run listed and staged under `name`.
    ///
    /// Items whose download failed are not returned: a file with that name
    /// in staging is an older copy and gets its own carried-over record.
    pub(crate) fn find_staged_listing(&self, name: &str) -> Option<usize> {
        self.files.iter().position(|f| {
            f.origin == FileOrigin::Listed && f.state == FileState::Staged && f.name == name
        })
    }
}

impl Default for JobRun {
    fn default() -> Self {
        Self::new()
    }
}

/// A run-level failure: the stage it happened in plus its classification.
#[derive(Debug, Clone, Serialize)]
pub struct RunError {
    pub state: JobState,
    pub kind: ErrorKind,
    pub fatal: bool,
    pub message: String,
}

impl RunError {
    /// The error is fatal when its kind is and it happened before relocation.
    pub fn new(state: JobState, error: &RelayError) -> Self {
        RunError {
            state,
            kind: error.kind(),
            fatal: state.aborts_run() && error.is_fatal(),
            message: error.to_string(),
        }
    }
}

/// A single file handled during a run.
#[derive(Debug, Clone, Serialize)]
pub struct FileItem {
    /// Unique identifier for this file within the run
    pub id: Uuid,

    /// File name as listed remotely (also its name in staging and destination)
    pub name: String,

    /// Where the item came from
    pub origin: FileOrigin,

    /// Bytes written to staging (None until the download completes)
    pub bytes_staged: Option<u64>,

    /// Current state of this file
    pub state: FileState,

    /// Stage that failed, if state is Failed
    pub failed_stage: Option<Stage>,

    /// Classification of the failure
    pub error_kind: Option<ErrorKind>,

    /// Human-readable error message
    pub error_message: Option<String>,

    /// OS error code, when the failure came from the local filesystem
    pub error_code: Option<u32>,
}

impl FileItem {
    pub fn listed(name: impl Into<String>) -> Self {
        Self::with_origin(name.into(), FileOrigin::Listed, FileState::Pending)
    }

    /// A file found in staging that this run did not download.
    pub fn carried_over(name: impl Into<String>) -> Self {
        Self::with_origin(name.into(), FileOrigin::CarriedOver, FileState::Staged)
    }

    fn with_origin(name: String, origin: FileOrigin, state: FileState) -> Self {
        FileItem {
            id: Uuid::new_v4(),
            name,
            origin,
            bytes_staged: None,
            state,
            failed_stage: None,
            error_kind: None,
            error_message: None,
            error_code: None,
        }
    }

    /// Record a failure at `stage`; the item becomes terminal.
    pub fn fail(&mut self, stage: Stage, error: &RelayError) {
        self.state = FileState::Failed;
        self.failed_stage = Some(stage);
        self.error_kind = Some(error.kind());
        self.error_code = error.raw_os_error();
        self.error_message = Some(error.to_string());
    }
}

/// Where a FileItem originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOrigin {
    /// Returned by this run's remote listing
    Listed,
    /// Already in staging when relocation started (left by an earlier run)
    CarriedOver,
}

/// The state of an individual file within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    /// Listed, not yet downloaded
    Pending,
    /// Streaming into staging
    Downloading,
    /// Fully written to staging
    Staged,
    /// Being moved to the destination
    Relocating,
    /// In the destination
    Relocated,
    /// Download or relocation failed
    Failed,
}

/// Per-file pipeline stage, used to say where a file failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Download,
    Relocation,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Download => write!(f, "download"),
            Stage::Relocation => write!(f, "relocation"),
        }
    }
}

/// The state of a run.
///
/// Idle -> Connecting -> Listing -> Downloading -> Relocating -> Reporting -> Idle.
/// Fatal errors while Connecting or Listing jump straight to Reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Idle,
    Connecting,
    Listing,
    Downloading,
    Relocating,
    Reporting,
}

impl JobState {
    /// True for states in which a run-level error ends the run before
    /// anything is relocated. A destination failure while Relocating leaves
    /// the downloads staged and only degrades the run.
    pub fn aborts_run(self) -> bool {
        matches!(
            self,
            JobState::Connecting | JobState::Listing | JobState::Downloading
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobState::Idle => "idle",
            JobState::Connecting => "connecting",
            JobState::Listing => "listing",
            JobState::Downloading => "downloading",
            JobState::Relocating => "relocating",
            JobState::Reporting => "reporting",
        };
        f.write_str(name)
    }
}

/// Final classification of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every listed file downloaded and every staged file relocated
    Success,
    /// The run completed but at least one file failed
    PartialFailure,
    /// Nothing was attempted (staging, connect, login, directory or listing failed)
    FatalFailure,
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::Success => write!(f, "success"),
            RunOutcome::PartialFailure => write!(f, "partial failure"),
            RunOutcome::FatalFailure => write!(f, "fatal failure"),
        }
    }
}
