//! Domain error types for the TPCK serial bridge.
//!
//! Uses `thiserror` for ergonomic error definitions with proper context.

use thiserror::Error;

use crate::packet::Method;

/// Errors related to configuration parsing and validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file '{path}': {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// Invalid address format.
    #[error("invalid address format: {0} (expected 'host:port')")]
    InvalidAddress(String),

    /// A numeric setting is outside its usable range.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Errors raised while building a TPCK frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Frame length is carried in a single byte.
    #[error("frame data is {0} bytes, maximum is 255")]
    DataTooLong(usize),
}

/// Errors raised by the tRPC packet model.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// The frame does not carry the application packet type.
    #[error("frame type {0} is not a tRPC packet")]
    WrongFrameType(u8),

    /// Frame data shorter than the service/method header.
    #[error("packet header needs 5 bytes, got {0}")]
    HeaderTooShort(usize),

    /// Service code outside the service enumeration.
    #[error("unknown service code 0x{0:02X}")]
    UnknownService(u8),

    /// Method code outside the method enumeration.
    #[error("unknown method code 0x{0:03X}")]
    UnknownMethod(u32),

    /// Field accessed on a packet whose method does not carry it.
    #[error("method {method} does not have a \"{field}\" field")]
    InvalidFieldForMethod { field: &'static str, method: Method },

    /// Field value does not fit the field's range.
    #[error("{field} value {value} out of range (max {max})")]
    ValueOutOfRange {
        field: &'static str,
        value: u64,
        max: u64,
    },

    /// Encoded packet does not fit in a single frame.
    #[error("packet payload is {0} bytes, maximum is 250")]
    PayloadTooLong(usize),
}

/// Errors decoding a client text line into a packet.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Nothing but whitespace on the line.
    #[error("empty packet line")]
    Empty,

    /// Line is not valid UTF-8.
    #[error("packet line is not valid UTF-8")]
    InvalidUtf8,

    /// A required token is missing.
    #[error("missing {0}")]
    MissingToken(&'static str),

    /// More tokens than the grammar allows.
    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),

    /// Service name not recognised.
    #[error("unknown service '{0}'")]
    UnknownService(String),

    /// Method name not recognised.
    #[error("unknown method '{0}'")]
    UnknownMethod(String),

    /// Payload is not a bracketed run of hex pairs.
    #[error("invalid payload '{0}'")]
    InvalidHex(String),

    /// The decoded packet is not representable.
    #[error(transparent)]
    Packet(#[from] PacketError),
}

/// Errors that occur while the bridge is running.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Reading or writing the serial transport failed.
    #[error("serial transport error: {0}")]
    Serial(#[source] std::io::Error),

    /// The serial transport reached end of stream.
    #[error("serial transport closed")]
    SerialClosed,

    /// The front-end could not acquire its listening address.
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// Accepting a client connection failed.
    #[error("accept error: {0}")]
    Accept(#[source] std::io::Error),

    /// The bridge task panicked or was aborted.
    #[error("bridge task failed: {0}")]
    TaskFailed(String),

    /// A client could not reach the bridge.
    #[error("failed to connect to {address}: {message}")]
    Connect { address: String, message: String },

    /// A line received from the bridge is not a packet.
    #[error("undecodable line from bridge: {0}")]
    Decode(#[from] DecodeError),

    /// Other socket I/O error.
    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for packet operations.
pub type PacketResult<T> = std::result::Result<T, PacketError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_error_display() {
        let err = PacketError::InvalidFieldForMethod {
            field: "setpoint",
            method: Method::ModeSetting,
        };
        assert!(err.to_string().contains("ModeSetting"));
        assert!(err.to_string().contains("setpoint"));
    }

    #[test]
    fn test_range_error_display() {
        let err = PacketError::ValueOutOfRange {
            field: "address",
            value: 70_000,
            max: 65_535,
        };
        assert!(err.to_string().contains("70000"));
        assert!(err.to_string().contains("65535"));
    }

    #[test]
    fn test_bridge_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "test");
        let err: BridgeError = io_err.into();
        assert!(matches!(err, BridgeError::Io(_)));
    }

    #[test]
    fn test_decode_error_from_packet() {
        let err: DecodeError = PacketError::UnknownMethod(0x999).into();
        assert!(matches!(err, DecodeError::Packet(_)));
        assert_eq!(err.to_string(), "unknown method code 0x999");
    }
}
