//! FTP implementation of the remote source, built on the `ftp` crate.
//!
//! Reply errors from `login` are authentication failures; IO errors anywhere
//! before the listing are connectivity failures. A `550` answer to `NLST`
//! right after a successful `CWD` is how many servers report an empty
//! directory, so it is treated as an empty listing.

use std::cell::RefCell;
use std::io::{self, Write};
use std::time::Duration;

use ftp::{FtpError, FtpStream};

use crate::error::{RelayError, RelayResult};
use crate::remote::{Credentials, RemoteSession, RemoteSource, ServerAddress};

/// Opens FTP sessions (plain FTP, passive mode, binary transfers).
#[derive(Debug, Clone, Default)]
pub struct FtpSource {
    read_timeout: Option<Duration>,
}

impl FtpSource {
    /// `read_timeout` bounds every read on the control connection; `None`
    /// waits indefinitely.
    pub fn new(read_timeout: Option<Duration>) -> Self {
        FtpSource { read_timeout }
    }
}

impl RemoteSource for FtpSource {
    fn open(
        &self,
        address: &ServerAddress,
        credentials: &Credentials,
    ) -> RelayResult<Box<dyn RemoteSession>> {
        let connectivity = |detail: String| RelayError::Connectivity {
            address: address.to_string(),
            detail,
        };

        tracing::debug!(%address, "connecting to ftp server");
        let mut stream = FtpStream::connect((address.host.as_str(), address.port))
            .map_err(|e| connectivity(e.to_string()))?;

        if let Some(timeout) = self.read_timeout {
            stream
                .get_ref()
                .set_read_timeout(Some(timeout))
                .map_err(|e| connectivity(e.to_string()))?;
        }

        tracing::debug!(%address, user = %credentials.user, "logging in to ftp server");
        stream
            .login(&credentials.user, &credentials.password)
            .map_err(|e| match e {
                FtpError::ConnectionError(io) => connectivity(io.to_string()),
                other => RelayError::Authentication {
                    user: credentials.user.clone(),
                    detail: other.to_string(),
                },
            })?;

        Ok(Box::new(FtpSession {
            stream,
            address: address.to_string(),
            cwd: String::from("/"),
        }))
    }
}

struct FtpSession {
    stream: FtpStream,
    address: String,
    cwd: String,
}

impl FtpSession {
    fn connectivity(&self, err: io::Error) -> RelayError {
        RelayError::Connectivity {
            address: self.address.clone(),
            detail: err.to_string(),
        }
    }
}

impl RemoteSession for FtpSession {
    fn change_directory(&mut self, path: &str) -> RelayResult<()> {
        match self.stream.cwd(path) {
            Ok(()) => {
                self.cwd = path.to_string();
                Ok(())
            }
            Err(FtpError::ConnectionError(e)) => Err(self.connectivity(e)),
            Err(other) => Err(RelayError::RemotePath {
                path: path.to_string(),
                detail: other.to_string(),
            }),
        }
    }

    fn list_files(&mut self) -> RelayResult<Vec<String>> {
        match self.stream.nlst(None) {
            Ok(names) => Ok(names),
            Err(FtpError::ConnectionError(e)) => Err(self.connectivity(e)),
            Err(FtpError::InvalidResponse(reply)) if reply.contains("550") => {
                tracing::debug!(cwd = %self.cwd, %reply, "server reports no files");
                Ok(Vec::new())
            }
            Err(other) => Err(RelayError::RemotePath {
                path: self.cwd.clone(),
                detail: other.to_string(),
            }),
        }
    }

    fn retrieve(&mut self, filename: &str, sink: &mut dyn Write) -> RelayResult<u64> {
        // retr only hands out a shared closure
        let sink = RefCell::new(sink);
        self.stream
            .retr(filename, |reader| {
                let mut sink = sink.borrow_mut();
                io::copy(reader, &mut **sink).map_err(FtpError::ConnectionError)
            })
            .map_err(|e| RelayError::Transfer {
                file: filename.to_string(),
                detail: e.to_string(),
            })
    }

    fn close(&mut self) -> RelayResult<()> {
        self.stream.quit().map_err(|e| RelayError::Connectivity {
            address: self.address.clone(),
            detail: e.to_string(),
        })
    }
}
