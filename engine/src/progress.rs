//! Progress reporting trait.
//!
//! This module defines the ProgressCallback trait, which decouples the relay
//! job from whoever narrates it (the CLI console, a test recorder, ...).
//! Structured log events are emitted by the job itself through `tracing`;
//! callbacks are for presentation.

use crate::model::{FileItem, JobRun};

/// Trait for receiving progress updates from a relay run.
///
/// All methods are called synchronously on the thread running the job.
/// File indexes refer to `run.files`.
pub trait ProgressCallback: Send + Sync {
    /// Called when the run is triggered.
    fn on_job_started(&self, run: &JobRun);

    /// Called before a listed file is downloaded.
    fn on_download_started(&self, run: &JobRun, file_index: usize, file: &FileItem);

    /// Called when a download finished, successfully (Staged) or not (Failed).
    fn on_download_completed(&self, run: &JobRun, file_index: usize, file: &FileItem);

    /// Called before a staged file is moved to the destination.
    fn on_relocation_started(&self, run: &JobRun, file_index: usize, file: &FileItem);

    /// Called when a move finished (Relocated or Failed).
    fn on_relocation_completed(&self, run: &JobRun, file_index: usize, file: &FileItem);

    /// Called once the outcome is known, on every path including fatal ones.
    fn on_job_completed(&self, run: &JobRun);
}
