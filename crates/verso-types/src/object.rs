use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

const LEN: usize = 32;

/// A 32-byte BLAKE3 digest naming a stored item.
///
/// Items are written under the id of their own bytes, which makes rewrites
/// no-ops and lets every read be checked against its name.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId([u8; LEN]);

impl ObjectId {
    /// Plain BLAKE3 of `data`. Stored records go through a domain-separated
    /// hasher instead.
    pub fn from_bytes(data: &[u8]) -> Self {
        Self(blake3::hash(data).into())
    }

    pub const fn from_hash(hash: [u8; LEN]) -> Self {
        Self(hash)
    }

    /// All zeros; never the digest of real content.
    pub const fn null() -> Self {
        Self([0; LEN])
    }

    pub fn is_null(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    pub fn as_bytes(&self) -> &[u8; LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First four bytes as hex, for log lines.
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let decoded = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        let actual = decoded.len();
        let bytes: [u8; LEN] = decoded.try_into().map_err(|_| TypeError::InvalidLength {
            expected: LEN,
            actual,
        })?;
        Ok(Self(bytes))
    }
}

impl FromStr for ObjectId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ObjectId").field(&self.short_hex()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_bytes_same_id() {
        assert_eq!(ObjectId::from_bytes(b"a"), ObjectId::from_bytes(b"a"));
        assert_ne!(ObjectId::from_bytes(b"a"), ObjectId::from_bytes(b"b"));
    }

    #[test]
    fn null_id() {
        assert!(ObjectId::null().is_null());
        assert!(!ObjectId::from_bytes(b"").is_null());
    }

    #[test]
    fn hex_forms() {
        let id = ObjectId::from_bytes(b"verso");
        let parsed: ObjectId = id.to_hex().parse().unwrap();
        assert_eq!(parsed, id);
        assert_eq!(id.to_string().len(), 64);
        assert!(id.to_hex().starts_with(&id.short_hex()));
        assert_eq!(format!("{id:?}"), format!("ObjectId({:?})", id.short_hex()));
    }

    #[test]
    fn rejects_bad_hex() {
        assert!(matches!(
            ObjectId::from_hex("xyz"),
            Err(TypeError::InvalidHex(_))
        ));
        assert_eq!(
            ObjectId::from_hex("00ff"),
            Err(TypeError::InvalidLength {
                expected: 32,
                actual: 2
            })
        );
    }

    #[test]
    fn orders_bytewise() {
        let mut low = [0; LEN];
        low[31] = 1;
        assert!(ObjectId::null() < ObjectId::from_hash(low));
        assert!(ObjectId::from_hash(low) < ObjectId::from_hash([1; LEN]));
    }
}
