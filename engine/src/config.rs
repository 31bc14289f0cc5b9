//! Relay configuration.
//!
//! Built by the CLI from flags and environment variables, validated once before
//! the scheduler starts and then shared read-only with every run.

use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveTime;

use crate::error::ConfigError;
use crate::remote::{Credentials, ServerAddress, DEFAULT_PORT};

pub const DEFAULT_HOST: &str = "test.rebex.net";
pub const DEFAULT_REMOTE_DIR: &str = "pub/example";
pub const DEFAULT_STAGING_DIR: &str = "backup_directory";
pub const DEFAULT_DESTINATION_DIR: &str = "nfs_shared_directory";
pub const DEFAULT_RUN_AT: &str = "19:46";
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Everything a relay run and its schedule need.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Remote server
    pub address: ServerAddress,

    /// Login; anonymous when none were supplied
    pub credentials: Credentials,

    /// Directory on the server holding the daily files
    pub remote_dir: String,

    /// Local holding area for downloads
    pub staging_dir: PathBuf,

    /// Shared directory the files end up in
    pub destination_dir: PathBuf,

    /// Local time of day the job fires
    pub run_at: NaiveTime,

    /// Read timeout on the control connection (None: wait forever)
    pub read_timeout: Option<Duration>,

    /// How often the scheduler checks for due jobs
    pub poll_interval: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        RelayConfig {
            address: ServerAddress::new(DEFAULT_HOST, DEFAULT_PORT),
            credentials: Credentials::anonymous(),
            remote_dir: DEFAULT_REMOTE_DIR.to_string(),
            staging_dir: PathBuf::from(DEFAULT_STAGING_DIR),
            destination_dir: PathBuf::from(DEFAULT_DESTINATION_DIR),
            run_at: NaiveTime::from_hms_opt(19, 46, 0).unwrap_or(NaiveTime::MIN),
            read_timeout: Some(DEFAULT_READ_TIMEOUT),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl RelayConfig {
    /// Check the invariants the job relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.address.host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if self.address.port == 0 {
            return Err(ConfigError::ZeroPort);
        }
        if self.remote_dir.trim().is_empty() {
            return Err(ConfigError::EmptyRemoteDirectory);
        }
        if self.staging_dir == self.destination_dir {
            return Err(ConfigError::SameDirectories(self.staging_dir.clone()));
        }
        Ok(())
    }
}
