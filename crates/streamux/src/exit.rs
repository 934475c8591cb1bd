use std::fmt;
use std::io;

use streamux_conn::ConnError;
use streamux_frame::FrameError;
use streamux_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
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
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound | io::ErrorKind::InvalidInput => USAGE,
        io::ErrorKind::AddrInUse
        | io::ErrorKind::AddrNotAvailable
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::PermissionDenied => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { addr, source } => CliError::new(
            TRANSPORT_ERROR,
            format!("{context}: bind {addr}: {source}"),
        ),
        TransportError::Io(source) => io_error(context, source),
        TransportError::Closed => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Transport(err) => transport_error(context, err),
        FrameError::PacketTooLarge { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

pub fn conn_error(context: &str, err: ConnError) -> CliError {
    match err {
        ConnError::HandshakeTimeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        ConnError::Channel(err) => transport_error(context, err),
        ConnError::Frame(err) => frame_error(context, err),
        ConnError::Configuration(_) => CliError::new(USAGE, format!("{context}: {err}")),
        ConnError::InvalidState { .. } | ConnError::StreamsPending { .. } => {
            CliError::new(INTERNAL, format!("{context}: {err}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn handshake_timeout_maps_to_timeout_code() {
        let err = conn_error("send failed", ConnError::HandshakeTimeout(Duration::from_secs(1)));
        assert_eq!(err.code, TIMEOUT);
        assert!(err.message.starts_with("send failed: "));
    }

    #[test]
    fn configuration_maps_to_usage() {
        let err = conn_error("send failed", ConnError::Configuration("bad".into()));
        assert_eq!(err.code, USAGE);
    }

    #[test]
    fn codec_errors_map_to_data_invalid() {
        let err = frame_error("decode", FrameError::InvalidFlags(0));
        assert_eq!(err.code, DATA_INVALID);
    }

    #[test]
    fn early_fin_is_internal_error() {
        let err = conn_error("send failed", ConnError::StreamsPending { active: 2 });
        assert_eq!(err.code, INTERNAL);
        assert!(err.message.contains("2 stream(s)"));
    }

    #[test]
    fn closed_channel_is_transport_error() {
        let err = conn_error("listen", ConnError::Channel(TransportError::Closed));
        assert_eq!(err.code, TRANSPORT_ERROR);
    }
}
