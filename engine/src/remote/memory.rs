//! In-memory remote source.
//!
//! Serves files from memory and can be told to fail in the ways a real server
//! does: unreachable host, rejected login, broken listing, or a download that
//! disconnects after some bytes. Used by the engine and CLI tests.

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{Credentials, RemoteSession, RemoteSource, ServerAddress};
use crate::error::{RelayError, RelayResult};

/// Counters describing how the source was used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub opens: usize,
    pub closes: usize,
    pub listings: usize,
    pub retrievals: usize,
}

#[derive(Debug, Default)]
struct MemoryState {
    credentials: Option<Credentials>,
    unreachable: bool,
    fail_listing: bool,
    // directory -> files in listing order
    directories: HashMap<String, Vec<(String, Vec<u8>)>>,
    // file name -> bytes delivered before the simulated disconnect
    broken: HashMap<String, usize>,
    stats: MemoryStats,
}

/// A scriptable in-memory remote. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    state: Arc<Mutex<MemoryState>>,
}

impl MemorySource {
    /// Empty source accepting any credentials, with an empty root directory.
    pub fn new() -> Self {
        let source = Self::default();
        source.lock().directories.insert(String::new(), Vec::new());
        source
    }

    /// Only accept these credentials.
    pub fn with_credentials(self, credentials: Credentials) -> Self {
        self.lock().credentials = Some(credentials);
        self
    }

    /// Add a file to `directory`, creating the directory if needed.
    pub fn with_file(self, directory: &str, name: &str, content: impl Into<Vec<u8>>) -> Self {
        self.lock()
            .directories
            .entry(normalize(directory))
            .or_default()
            .push((name.to_string(), content.into()));
        self
    }

    /// Add an empty directory.
    pub fn with_directory(self, directory: &str) -> Self {
        self.lock().directories.entry(normalize(directory)).or_default();
        self
    }

    /// Deliver only `after_bytes` of `name`, then report a disconnect.
    pub fn with_broken_file(self, name: &str, after_bytes: usize) -> Self {
        self.lock().broken.insert(name.to_string(), after_bytes);
        self
    }

    /// Refuse every connection attempt.
    pub fn unreachable(self) -> Self {
        self.lock().unreachable = true;
        self
    }

    /// Make every listing fail.
    pub fn with_failing_listing(self) -> Self {
        self.lock().fail_listing = true;
        self
    }

    pub fn stats(&self) -> MemoryStats {
        self.lock().stats
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RemoteSource for MemorySource {
    fn open(
        &self,
        address: &ServerAddress,
        credentials: &Credentials,
    ) -> RelayResult<Box<dyn RemoteSession>> {
        let mut state = self.lock();
        if state.unreachable {
            return Err(RelayError::Connectivity {
                address: address.to_string(),
                detail: "connection refused".to_string(),
            });
        }
        if let Some(expected) = &state.credentials {
            if expected != credentials {
                return Err(RelayError::Authentication {
                    user: credentials.user.clone(),
                    detail: "530 Login incorrect.".to_string(),
                });
            }
        }
        state.stats.opens += 1;

        Ok(Box::new(MemorySession {
            state: Arc::clone(&self.state),
            cwd: String::new(),
            closed: false,
        }))
    }
}

struct MemorySession {
    state: Arc<Mutex<MemoryState>>,
    cwd: String,
    closed: bool,
}

impl MemorySession {
    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RemoteSession for MemorySession {
    fn change_directory(&mut self, path: &str) -> RelayResult<()> {
        let target = normalize(path);
        if !self.lock().directories.contains_key(&target) {
            return Err(RelayError::RemotePath {
                path: path.to_string(),
                detail: "550 Failed to change directory.".to_string(),
            });
        }
        self.cwd = target;
        Ok(())
    }

    fn list_files(&mut self) -> RelayResult<Vec<String>> {
        let mut state = self.lock();
        state.stats.listings += 1;
        if state.fail_listing {
            return Err(RelayError::RemotePath {
                path: self.cwd.clone(),
                detail: "450 Listing unavailable.".to_string(),
            });
        }
        Ok(state
            .directories
            .get(&self.cwd)
            .map(|files| files.iter().map(|(name, _)| name.clone()).collect())
            .unwrap_or_default())
    }

    fn retrieve(&mut self, filename: &str, sink: &mut dyn Write) -> RelayResult<u64> {
        let (content, cut) = {
            let mut state = self.lock();
            state.stats.retrievals += 1;
            let content = state
                .directories
                .get(&self.cwd)
                .and_then(|files| files.iter().find(|(name, _)| name == filename))
                .map(|(_, bytes)| bytes.clone())
                .ok_or_else(|| RelayError::Transfer {
                    file: filename.to_string(),
                    detail: "550 File not found.".to_string(),
                })?;
            (content, state.broken.get(filename).copied())
        };

        let transfer_error = |detail: String| RelayError::Transfer {
            file: filename.to_string(),
            detail,
        };

        match cut {
            Some(after) => {
                let partial = &content[..after.min(content.len())];
                sink.write_all(partial)
                    .map_err(|e| transfer_error(e.to_string()))?;
                Err(transfer_error(
                    "426 Connection closed; transfer aborted.".to_string(),
                ))
            }
            None => {
                sink.write_all(&content)
                    .map_err(|e| transfer_error(e.to_string()))?;
                Ok(content.len() as u64)
            }
        }
    }

    fn close(&mut self) -> RelayResult<()> {
        if !self.closed {
            self.closed = true;
            self.lock().stats.closes += 1;
        }
        Ok(())
    }
}

fn normalize(path: &str) -> String {
    path.trim_matches('/').to_string()
}
