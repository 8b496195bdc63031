use verso_types::ObjectId;

/// BLAKE3 with a domain tag mixed in ahead of the data.
///
/// Commits, values, and snapshot segments share one key space in the
/// backend. Tagging each kind keeps equal bytes of different kinds from
/// ever sharing an id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    pub const COMMIT: Self = Self::new("verso-commit-v1");
    /// Values written by commits and read through the index.
    pub const CONTENT: Self = Self::new("verso-content-v1");
    pub const SEGMENT: Self = Self::new("verso-segment-v1");

    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    pub fn hash(&self, data: &[u8]) -> ObjectId {
        let digest = blake3::Hasher::new()
            .update(self.domain.as_bytes())
            .update(b":")
            .update(data)
            .finalize();
        ObjectId::from_hash(digest.into())
    }

    /// Whether `data` hashes to `expected` under this domain.
    pub fn verify(&self, data: &[u8], expected: &ObjectId) -> bool {
        self.hash(data) == *expected
    }

    pub fn domain(&self) -> &'static str {
        self.domain
    }
}
