//! Remote file source abstraction.
//!
//! A `RemoteSource` opens authenticated `RemoteSession`s; a session can change
//! directory, list the files there and stream any of them into a writer. The
//! FTP implementation lives in `crate::ftp_source`, an in-memory one in
//! [`memory`].

pub mod memory;

use std::fmt;
use std::io::Write;
use std::ops::{Deref, DerefMut};

use crate::error::RelayResult;

/// Default FTP control port.
pub const DEFAULT_PORT: u16 = 21;

/// Host and port of the remote file server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
}

impl ServerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        ServerAddress {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Login credentials. The password never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials {
            user: user.into(),
            password: password.into(),
        }
    }

    /// Anonymous login, used when no user is configured.
    pub fn anonymous() -> Self {
        Self::new("anonymous", "")
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Factory for remote sessions.
pub trait RemoteSource: Send + Sync {
    /// Connect to `address` and log in.
    ///
    /// # Errors
    /// `Authentication` when the credentials are rejected, `Connectivity` for
    /// everything that prevents talking to the server at all.
    fn open(
        &self,
        address: &ServerAddress,
        credentials: &Credentials,
    ) -> RelayResult<Box<dyn RemoteSession>>;
}

/// An open, authenticated session against the remote source.
pub trait RemoteSession: Send {
    /// Change the working directory. Fails with `RemotePath` if it is missing.
    fn change_directory(&mut self, path: &str) -> RelayResult<()>;

    /// Names of the files in the working directory, read in full at call time.
    /// An empty list is a valid result.
    fn list_files(&mut self) -> RelayResult<Vec<String>>;

    /// Stream the full content of `filename` into `sink`, returning the byte
    /// count. Fails with `Transfer` if the stream breaks.
    fn retrieve(&mut self, filename: &str, sink: &mut dyn Write) -> RelayResult<u64>;

    /// Release the session. Called at most once.
    fn close(&mut self) -> RelayResult<()>;
}

/// Closes the wrapped session when dropped, unless `close` was already called.
pub struct SessionGuard {
    session: Box<dyn RemoteSession>,
    closed: bool,
}

impl SessionGuard {
    pub fn new(session: Box<dyn RemoteSession>) -> Self {
        SessionGuard {
            session,
            closed: false,
        }
    }

    /// Close explicitly so the caller can observe the result.
    pub fn close(mut self) -> RelayResult<()> {
        self.closed = true;
        self.session.close()
    }
}

impl Deref for SessionGuard {
    type Target = dyn RemoteSession;

    fn deref(&self) -> &Self::Target {
        self.session.as_ref()
    }
}

impl DerefMut for SessionGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session.as_mut()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.session.close() {
                tracing::warn!(error = %e, "failed to close remote session");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemorySource;
    use super::*;

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials::new("partner", "hunter2");
        let printed = format!("{:?}", creds);
        assert!(printed.contains("partner"));
        assert!(!printed.contains("hunter2"));
    }

    #[test]
    fn test_server_address_display() {
        let address = ServerAddress::new("ftp.example.com", DEFAULT_PORT);
        assert_eq!(address.to_string(), "ftp.example.com:21");
    }

    #[test]
    fn test_guard_closes_on_drop() {
        let source = MemorySource::new();
        let address = ServerAddress::new("memory", DEFAULT_PORT);
        let session = source
            .open(&address, &Credentials::anonymous())
            .expect("open should succeed");

        drop(SessionGuard::new(session));
        assert_eq!(source.stats().closes, 1);
    }

    #[test]
    fn test_guard_explicit_close_runs_once() {
        let source = MemorySource::new();
        let address = ServerAddress::new("memory", DEFAULT_PORT);
        let session = source
            .open(&address, &Credentials::anonymous())
            .expect("open should succeed");

        SessionGuard::new(session).close().expect("close should succeed");
        assert_eq!(source.stats().closes, 1);
    }
}
