//! Error types
//!
//! Each area of the crate has its own error enum; [`Error`] wraps them so
//! callers can use a single `Result` type.

use std::fmt;
use std::io;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// I/O error while writing packets out
    Io(io::Error),
    /// Malformed or unsupported media input
    Media(MediaError),
    /// MPEG-TS framing invariant violated
    Ts(TsError),
    /// Ring read failure
    Ring(RingError),
}

/// Errors raised while parsing ingest data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    /// Malformed AVC packet or decoder configuration record
    InvalidAvcPacket,
    /// Malformed HEVC decoder configuration record
    InvalidHevcPacket,
    /// Malformed AAC packet or AudioSpecificConfig
    InvalidAacPacket,
    /// Codec identifier this crate cannot build a track for
    UnsupportedCodec(u8),
    /// A length-prefixed NALU claims more bytes than remain in the buffer
    NaluOverflow {
        /// Bytes the prefix claims (prefix included)
        declared: usize,
        /// Bytes left in the buffer
        remaining: usize,
    },
}

/// Errors raised by the TS packetizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TsError {
    /// PES start code prefix was not 0x000001
    StartCodeMismatch(u32),
    /// An assembled TS packet did not come out at exactly 188 bytes
    PacketSize(usize),
}

/// Errors returned to ring readers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingError {
    /// The writer closed the track; no more frames will arrive
    Closed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Media(e) => write!(f, "Media error: {}", e),
            Error::Ts(e) => write!(f, "TS error: {}", e),
            Error::Ring(e) => write!(f, "Ring error: {}", e),
        }
    }
}

impl fmt::Display for MediaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaError::InvalidAvcPacket => write!(f, "Invalid AVC packet"),
            MediaError::InvalidHevcPacket => write!(f, "Invalid HEVC packet"),
            MediaError::InvalidAacPacket => write!(f, "Invalid AAC packet"),
            MediaError::UnsupportedCodec(id) => write!(f, "Unsupported codec id: {}", id),
            MediaError::NaluOverflow {
                declared,
                remaining,
            } => write!(
                f,
                "NALU length {} exceeds remaining buffer of {} bytes",
                declared, remaining
            ),
        }
    }
}

impl fmt::Display for TsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TsError::StartCodeMismatch(prefix) => {
                write!(f, "PES start code prefix {:#08x} != 0x000001", prefix)
            }
            TsError::PacketSize(size) => write!(f, "TS packet size {} != 188", size),
        }
    }
}

impl fmt::Display for RingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RingError::Closed => write!(f, "Track closed"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Media(e) => Some(e),
            Error::Ts(e) => Some(e),
            Error::Ring(e) => Some(e),
        }
    }
}

impl std::error::Error for MediaError {}
impl std::error::Error for TsError {}
impl std::error::Error for RingError {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<MediaError> for Error {
    fn from(e: MediaError) -> Self {
        Error::Media(e)
    }
}

impl From<TsError> for Error {
    fn from(e: TsError) -> Self {
        Error::Ts(e)
    }
}

impl From<RingError> for Error {
    fn from(e: RingError) -> Self {
        Error::Ring(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err: Error = TsError::StartCodeMismatch(0x000002).into();
        assert_eq!(
            err.to_string(),
            "TS error: PES start code prefix 0x000002 != 0x000001"
        );

        let err: Error = MediaError::NaluOverflow {
            declared: 12,
            remaining: 3,
        }
        .into();
        assert!(err.to_string().contains("NALU length 12"));
    }

    #[test]
    fn test_source_is_inner_error() {
        use std::error::Error as _;

        let err: Error = RingError::Closed.into();
        assert!(err.source().is_some());
    }
}
