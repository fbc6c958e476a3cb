use std::fmt;
use std::io;

use shmframe::receiver::ReceiverError;
use shmframe::shm::ShmError;
use shmframe::transport::TransportError;
use shmframe::wire::WireError;

// Process exit codes.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    CliError::new(io_code(err.kind()), format!("{context}: {err}"))
}

fn io_code(kind: io::ErrorKind) -> i32 {
    match kind {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound => FAILURE,
        io::ErrorKind::InvalidInput => USAGE,
        _ => INTERNAL,
    }
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        TransportError::UnsupportedScheme { .. } | TransportError::PathTooLong { .. } => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
    }
}

pub fn wire_error(context: &str, err: WireError) -> CliError {
    match err {
        WireError::Io(source) => io_error(context, source),
        WireError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
        other if other.is_malformed_message() => {
            CliError::new(DATA_INVALID, format!("{context}: {other}"))
        }
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn shm_error(context: &str, err: ShmError) -> CliError {
    let code = match &err {
        ShmError::Open { source, .. }
        | ShmError::Map { source, .. }
        | ShmError::Create { source, .. } => io_code(source.kind()),
        ShmError::InvalidName { .. } => USAGE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn receiver_error(context: &str, err: ReceiverError) -> CliError {
    match err {
        ReceiverError::Connect { source, .. } | ReceiverError::Transport(source) => {
            transport_error(context, source)
        }
        ReceiverError::Open(source) | ReceiverError::Map(source) | ReceiverError::Shm(source) => {
            shm_error(context, source)
        }
        ReceiverError::Malformed(source) | ReceiverError::Wire(source) => {
            wire_error(context, source)
        }
        ReceiverError::InvalidConfig(_) | ReceiverError::InvalidScaleFactor(_) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        ReceiverError::Spawn(source) => io_error(context, source),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}
