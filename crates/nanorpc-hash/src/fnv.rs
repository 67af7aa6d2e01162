//! FNV-1a 32-bit, the hash function the wire protocol specifies for
//! `path_hash`. Bit-for-bit compatible with the embedded C peer.

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Hashes `path` with FNV-1a 32-bit (XOR-then-multiply order).
pub fn fnv1a_32(path: &str) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in path.as_bytes() {
        hash ^= *byte as u32;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}
