use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Result, TransportError};

/// A parsed control-channel address.
///
/// Accepted forms:
/// - `ipc:///tmp/frames.sock` (ZeroMQ-style IPC endpoint)
/// - `unix:///tmp/frames.sock`
/// - `/tmp/frames.sock` or any other scheme-less path
///
/// Every form resolves to a filesystem path of a Unix domain socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlAddress {
    raw: String,
    path: PathBuf,
}

impl ControlAddress {
    const SCHEMES: [&'static str; 2] = ["ipc://", "unix://"];

    /// Parse a connection string.
    pub fn parse(address: &str) -> Result<Self> {
        let trimmed = address.trim();
        let path = match Self::SCHEMES
            .iter()
            .find_map(|scheme| trimmed.strip_prefix(scheme))
        {
            Some(rest) => rest,
            None if trimmed.contains("://") => {
                return Err(TransportError::UnsupportedScheme {
                    address: address.to_string(),
                })
            }
            None => trimmed,
        };

        if path.is_empty() {
            return Err(TransportError::UnsupportedScheme {
                address: address.to_string(),
            });
        }

        Ok(Self {
            raw: address.to_string(),
            path: PathBuf::from(path),
        })
    }

    /// Build an address from a socket path.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            raw: format!("ipc://{}", path.display()),
            path,
        }
    }

    /// Socket path this address points at.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The address exactly as supplied.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for ControlAddress {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ControlAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
