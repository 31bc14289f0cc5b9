//! Job orchestration module.
//!
//! A `RelayJob` runs one pass of the pipeline:
//! - ensure the staging directory
//! - open the remote session, change directory and list the files
//! - download every listed file into staging
//! - move everything staged into the destination
//! - classify and report the outcome
//!
//! All errors are caught here. `RelayJob::run` always returns a `JobRun`
//! describing what happened, so one bad run never takes the scheduler down.

use std::sync::Arc;

use chrono::Local;
use tracing::{debug, error, info, warn};

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::model::{FileItem, FileState, JobRun, JobState, RunError, RunOutcome, Stage};
use crate::progress::ProgressCallback;
use crate::relocate;
use crate::remote::{RemoteSource, SessionGuard};
use crate::staging::StagingStore;

/// The scheduled relay: remote source -> staging -> destination.
#[derive(Clone)]
pub struct RelayJob {
    config: Arc<RelayConfig>,
    source: Arc<dyn RemoteSource>,
    staging: StagingStore,
}

impl RelayJob {
    pub fn new(config: RelayConfig, source: Arc<dyn RemoteSource>) -> Self {
        let staging = StagingStore::new(config.staging_dir.clone());
        RelayJob {
            config: Arc::new(config),
            source,
            staging,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Execute one run of the job.
    ///
    /// Fatal errors (staging unusable, connect, login, directory, listing)
    /// skip straight to reporting. Per-file download and relocation errors are
    /// recorded on the file items and the run carries on.
    pub fn run(&self, progress: Option<&dyn ProgressCallback>) -> JobRun {
        let mut run = JobRun::new();
        info!(run_id = %run.id, "task has started");
        if let Some(callback) = progress {
            callback.on_job_started(&run);
        }

        match self.download(&mut run, progress) {
            Ok(()) => self.relocate(&mut run, progress),
            Err(e) => {
                let state = run.state;
                if e.requires_operator() {
                    error!(
                        run_id = %run.id,
                        stage = %state,
                        kind = %e.kind(),
                        operator_attention = true,
                        "{}",
                        e
                    );
                } else {
                    error!(run_id = %run.id, stage = %state, kind = %e.kind(), "{}", e);
                }
                run.error = Some(RunError::new(state, &e));
            }
        }

        self.report(&mut run);
        if let Some(callback) = progress {
            callback.on_job_completed(&run);
        }

        run.state = JobState::Idle;
        run
    }

    /// Connecting, Listing and Downloading. Returns Err only for fatal errors;
    /// the session is closed on every path out of here.
    fn download(
        &self,
        run: &mut JobRun,
        progress: Option<&dyn ProgressCallback>,
    ) -> Result<(), RelayError> {
        let config = &self.config;

        run.state = JobState::Connecting;
        self.staging.ensure_exists()?;
        info!(run_id = %run.id, server = %config.address, "connecting to the ftp server");
        let mut session = SessionGuard::new(self.source.open(&config.address, &config.credentials)?);
        info!(run_id = %run.id, remote_dir = %config.remote_dir, "changing the remote working directory");
        session.change_directory(&config.remote_dir)?;

        run.state = JobState::Listing;
        let names = session.list_files()?;
        info!(run_id = %run.id, files = names.len(), "remote listing received");
        run.files = names.into_iter().map(FileItem::listed).collect();

        run.state = JobState::Downloading;
        for file_index in 0..run.files.len() {
            let name = run.files[file_index].name.clone();
            run.files[file_index].state = FileState::Downloading;
            info!(
                run_id = %run.id,
                file = %name,
                staging = %self.staging.root().display(),
                "downloading {} to {}",
                name,
                self.staging.root().display()
            );
            if let Some(callback) = progress {
                callback.on_download_started(run, file_index, &run.files[file_index]);
            }

            let result = self
                .staging
                .write_with(&name, |sink| session.retrieve(&name, sink));

            let file = &mut run.files[file_index];
            match result {
                Ok(staged) => {
                    debug!(
                        run_id = %run.id,
                        file = %staged.name,
                        path = %staged.path.display(),
                        bytes = staged.bytes,
                        "file staged"
                    );
                    file.state = FileState::Staged;
                    file.bytes_staged = Some(staged.bytes);
                }
                Err(e) => {
                    error!(run_id = %run.id, file = %name, stage = %Stage::Download, kind = %e.kind(), "{}", e);
                    file.fail(Stage::Download, &e);
                }
            }

            if let Some(callback) = progress {
                callback.on_download_completed(run, file_index, &run.files[file_index]);
            }
        }

        info!(run_id = %run.id, "closing the ftp connection");
        if let Err(e) = session.close() {
            warn!(run_id = %run.id, error = %e, "failed to close the remote session cleanly");
        }
        Ok(())
    }

    /// Relocating: move every staged file, including leftovers from earlier
    /// runs, into the destination.
    fn relocate(&self, run: &mut JobRun, progress: Option<&dyn ProgressCallback>) {
        run.state = JobState::Relocating;
        let destination_dir = &self.config.destination_dir;
        let run_id = run.id;

        // Attempts are tracked by index so callbacks see the item as Relocating.
        let mut attempted = Vec::new();
        let results = relocate::relocate_all(&self.staging, destination_dir, |name| {
            let file_index = match run.find_staged_listing(name) {
                Some(index) => index,
                None => {
                    run.files.push(FileItem::carried_over(name));
                    run.files.len() - 1
                }
            };
            run.files[file_index].state = FileState::Relocating;
            info!(
                run_id = %run_id,
                file = %name,
                destination = %destination_dir.display(),
                "moving {} to {}",
                name,
                destination_dir.display()
            );
            if let Some(callback) = progress {
                callback.on_relocation_started(run, file_index, &run.files[file_index]);
            }
            attempted.push(file_index);
        });

        let results = match results {
            Ok(results) => results,
            Err(e) => {
                error!(run_id = %run_id, stage = %JobState::Relocating, kind = %e.kind(), "{}", e);
                run.error = Some(RunError::new(JobState::Relocating, &e));
                return;
            }
        };

        for (file_index, moved) in attempted.into_iter().zip(results) {
            let file = &mut run.files[file_index];
            match moved.result {
                Ok(()) => {
                    debug!(
                        run_id = %run_id,
                        file = %moved.name,
                        destination = %moved.destination.display(),
                        "file relocated"
                    );
                    file.state = FileState::Relocated;
                }
                Err(e) => {
                    error!(
                        run_id = %run_id,
                        file = %moved.name,
                        stage = %Stage::Relocation,
                        kind = %e.kind(),
                        "{}",
                        e
                    );
                    file.fail(Stage::Relocation, &e);
                }
            }
            if let Some(callback) = progress {
                callback.on_relocation_completed(run, file_index, &run.files[file_index]);
            }
        }
    }

    /// Reporting: classify and log the outcome.
    fn report(&self, run: &mut JobRun) {
        run.state = JobState::Reporting;
        let outcome = run.classify();
        run.outcome = Some(outcome);
        run.finished_at = Some(Local::now());

        let relocated = run.relocated().count();
        let failed = run.failed().count();
        match outcome {
            RunOutcome::Success => {
                info!(run_id = %run.id, relocated, "task finished successfully");
            }
            RunOutcome::PartialFailure => {
                warn!(run_id = %run.id, relocated, failed, "task finished with failures");
            }
            RunOutcome::FatalFailure => {
                error!(
                    run_id = %run.id,
                    operator_attention = run.requires_operator(),
                    "task aborted, will retry at the next scheduled time"
                );
            }
        }
    }
}
