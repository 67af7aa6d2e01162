//! The FNV-1a 32-bit path hash cache shared between a NanoRPC client and
//! server, resolving `path` <-> `path_hash` request variants.

mod cache;
mod error;
mod fnv;

pub use cache::HashCache;
pub use error::HashError;
pub use fnv::fnv1a_32;
