use std::fmt;

/// Errors raised by the hash cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashError {
    /// Two distinct paths hash to the same 32-bit FNV-1a output.
    HashCollision {
        hash: u32,
        existing: String,
        attempted: String,
    },
}

impl fmt::Display for HashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashError::HashCollision {
                hash,
                existing,
                attempted,
            } => write!(
                f,
                "hash collision on {:#010x}: {:?} already registered, {:?} attempted",
                hash, existing, attempted
            ),
        }
    }
}

impl std::error::Error for HashError {}
