//! # Relay Engine - Scheduled FTP File Relay
//!
//! A headless engine that picks up a batch of files from a remote FTP server
//! every day, stages them locally and relocates them into a shared
//! directory. Designed to be driven by the `ftp-relay` CLI but usable from any
//! host process.
//!
//! ## Overview
//!
//! - Session lifecycle against the remote source (connect, login, list, retrieve, close)
//! - Atomic staging: a staged name always refers to a complete download
//! - Best-effort relocation with per-file error isolation
//! - Run classification (success, partial failure, fatal failure)
//! - A daily scheduler that never overlaps runs and never backfills
//! - Structured `tracing` events plus an optional progress callback
//!
//! ## Basic Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use engine::{FtpSource, JobScheduler, RelayConfig, RelayJob, Schedule};
//!
//! let config = RelayConfig::default();
//! let source = Arc::new(FtpSource::new(config.read_timeout));
//! let job = RelayJob::new(config.clone(), source);
//!
//! // One run, right now
//! let run = job.run(None);
//! println!("{:?}: {} files", run.outcome, run.files.len());
//!
//! // Or every day at the configured time
//! let mut scheduler = JobScheduler::new(Duration::from_secs(1));
//! scheduler.schedule("relay", Schedule::daily(config.run_at), move || {
//!     job.run(None);
//! });
//! let (_stop, shutdown) = crossbeam_channel::bounded::<()>(1);
//! scheduler.run(&shutdown);
//! ```
//!
//! ## Modules
//!
//! - **model**: Run and file records, state enums
//! - **error**: Error types and classification
//! - **config**: Relay configuration and validation
//! - **remote**: Remote source and session traits, in-memory source
//! - **ftp_source**: FTP implementation of the remote source
//! - **staging**: Atomic local staging store
//! - **relocate**: Staging-to-destination moves
//! - **fs_ops**: Low-level filesystem operations
//! - **job**: Run orchestration
//! - **scheduler**: Daily trigger loop
//! - **progress**: Progress callback trait

pub mod config;
pub mod error;
pub mod fs_ops;
pub mod ftp_source;
pub mod job;
pub mod model;
pub mod progress;
pub mod relocate;
pub mod remote;
pub mod scheduler;
pub mod staging;

// Re-export main types and functions
pub use config::RelayConfig;
pub use error::{ConfigError, ErrorKind, RelayError, RelayResult};
pub use ftp_source::FtpSource;
pub use job::RelayJob;
pub use model::{FileItem, FileOrigin, FileState, JobRun, JobState, RunError, RunOutcome, Stage};
pub use progress::ProgressCallback;
pub use remote::memory::MemorySource;
pub use remote::{Credentials, RemoteSession, RemoteSource, ServerAddress};
pub use scheduler::{parse_time_of_day, Clock, JobHandle, JobScheduler, Schedule, SystemClock};
pub use staging::{StagedFile, StagingStore};
