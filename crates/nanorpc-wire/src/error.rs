use std::fmt;

/// Errors raised by the wire codec.
///
/// These map to the `ProtocolError` kind in the error taxonomy: a `WireError`
/// always means the bytes on the wire were malformed, never that a peer
/// reported an application-level failure.
#[derive(Debug)]
pub enum WireError {
    /// The declared frame length does not fit in a signed 32-bit integer
    /// (`payload_len` must satisfy `0 <= len <= i32::MAX`).
    LengthOverflow { declared: u64 },
    /// `at_eof = true` was reached with a partial varint or a partial
    /// payload still buffered.
    UnexpectedEof,
    /// The payload bytes did not decode as a valid protobuf message.
    Decode(prost::DecodeError),
    /// A value failed to encode (only possible for pathological inputs;
    /// `prost::EncodeError` is otherwise infallible for these messages).
    Encode(prost::EncodeError),
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireError::LengthOverflow { declared } => {
                write!(f, "frame length {} exceeds i32::MAX", declared)
            }
            WireError::UnexpectedEof => {
                write!(f, "connection ended with a partial frame buffered")
            }
            WireError::Decode(e) => write!(f, "failed to decode frame: {}", e),
            WireError::Encode(e) => write!(f, "failed to encode frame: {}", e),
        }
    }
}

impl std::error::Error for WireError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WireError::Decode(e) => Some(e),
            WireError::Encode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<prost::DecodeError> for WireError {
    fn from(e: prost::DecodeError) -> Self {
        WireError::Decode(e)
    }
}

impl From<prost::EncodeError> for WireError {
    fn from(e: prost::EncodeError) -> Self {
        WireError::Encode(e)
    }
}
