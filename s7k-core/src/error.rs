//! Error types for record decoding and stream processing

use thiserror::Error;

/// Errors that can occur when decoding a 7k record
///
/// All of these are framing errors: a session logs them, skips ahead and
/// resynchronises on the next valid header.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    /// Not enough bytes for the structure being read
    #[error("Record too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },

    /// Sync pattern at offset 4 is not 0x0000FFFF
    #[error("Bad sync pattern: {0:#010X}")]
    BadSync(u32),

    /// Size field doesn't match the byte span handed to the decoder
    #[error("Size mismatch: header says {header_len} bytes, record has {actual_len}")]
    SizeMismatch { header_len: usize, actual_len: usize },

    /// Size field outside the range a record can have
    #[error("Invalid record size: {0}")]
    InvalidSize(u32),

    /// Header time fields out of range
    #[error("Invalid record time: {0}")]
    InvalidTime(String),

    /// Optional data offset points outside the record
    #[error("Optional data offset {offset} outside record of {size} bytes")]
    InvalidOptionalOffset { offset: u32, size: u32 },

    /// Stored checksum doesn't match the byte sum
    #[error("Checksum mismatch: stored {stored:#010X}, computed {computed:#010X}")]
    ChecksumMismatch { stored: u32, computed: u32 },

    /// A declared element count doesn't fit in the remaining payload
    #[error("Record {record_type}: declared count {count} exceeds the payload")]
    CountOverflow { record_type: u32, count: usize },

    /// A field holds a value the record layout can't accept
    #[error("Invalid field in record {record_type}: {reason}")]
    InvalidField { record_type: u32, reason: String },

    /// Failed to deserialize a fixed structure
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),
}

impl From<bincode::Error> for CodecError {
    fn from(e: bincode::Error) -> Self {
        CodecError::DeserializationFailed(e.to_string())
    }
}

/// Errors that end a session
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    /// Buffer growth failed or the stream buffer limit was exceeded
    #[error("Resource failure: {0}")]
    Resource(String),

    /// Configuration could not be parsed or is inconsistent
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<serde_json::Error> for SessionError {
    fn from(e: serde_json::Error) -> Self {
        SessionError::Config(e.to_string())
    }
}

/// Reasons a ping can't be solved
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveError {
    /// The bathymetry record (7006) never arrived for this ping
    #[error("Ping has no bathymetry record")]
    MissingCoreRecord,

    /// The bathymetry record's time can't be placed on the time line
    #[error("Bathymetry record time is not a valid instant")]
    InvalidPingTime,
}
