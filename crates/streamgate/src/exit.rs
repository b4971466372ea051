use std::fmt;
use std::io;

use streamgate_frame::FrameError;
use streamgate_transport::TransportError;

use crate::config::ConfigError;

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
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::AddrInUse | io::ErrorKind::AddrNotAvailable => TRANSPORT_ERROR,
        io::ErrorKind::ConnectionRefused => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Recv(source)
        | TransportError::Send { source, .. }
        | TransportError::Io(source) => io_error(context, source),
        TransportError::QueueFull { .. } => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
        TransportError::Shutdown => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::PayloadTooLarge { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

pub fn config_error(err: ConfigError) -> CliError {
    CliError::new(USAGE, format!("invalid configuration: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_map_by_kind() {
        let err = io_error("bind", io::Error::from(io::ErrorKind::AddrInUse));
        assert_eq!(err.code, TRANSPORT_ERROR);
        assert!(err.message.starts_with("bind: "));

        let err = io_error("send", io::Error::from(io::ErrorKind::TimedOut));
        assert_eq!(err.code, TIMEOUT);
    }

    #[test]
    fn full_reply_queue_is_a_transport_error() {
        let err = transport_error("reply", TransportError::QueueFull { capacity: 8 });
        assert_eq!(err.code, TRANSPORT_ERROR);
        assert!(err.message.contains("8 pending"));
    }

    #[test]
    fn malformed_frames_are_invalid_data() {
        let err = frame_error("decode", FrameError::ZeroLength);
        assert_eq!(err.code, DATA_INVALID);
        let err = frame_error(
            "encode",
            FrameError::PayloadTooLarge {
                size: 40_000,
                max: 32_765,
            },
        );
        assert_eq!(err.code, USAGE);
    }
}
