/*!
 * Content hashing for change detection
 *
 * A cheap fixed-width checksum used only to answer "did these bytes change".
 * Not an integrity or security primitive.
 */

use std::fmt;
use std::str::FromStr;

/// 64-bit content checksum (first 8 bytes of a BLAKE3 digest)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash(pub u64);

impl ContentHash {
    /// 16 lowercase hex digits, the form persisted in the store
    pub fn to_hex(self) -> String {
        format!("{:016x}", self.0)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for ContentHash {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u64::from_str_radix(s.trim(), 16).map(ContentHash)
    }
}

/// Hash an arbitrary byte blob. Total and deterministic; empty input is fine.
pub fn content_hash(bytes: &[u8]) -> ContentHash {
    let digest = blake3::hash(bytes);
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest.as_bytes()[..8]);
    ContentHash(u64::from_le_bytes(head))
}
