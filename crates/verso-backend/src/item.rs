use bytes::Bytes;

/// A stored item: opaque payload plus the version token used for CAS.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Item {
    pub value: Bytes,
    pub version: u64,
}

impl Item {
    pub fn new(value: impl Into<Bytes>, version: u64) -> Self {
        Self {
            value: value.into(),
            version,
        }
    }

    /// Size of the payload in bytes.
    pub fn size(&self) -> usize {
        self.value.len()
    }
}

/// Precondition of a conditional write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Expected {
    /// The key must not exist.
    Absent,
    /// The key must exist with exactly this version.
    Version(u64),
}

/// Result of a conditional write or delete.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    ConditionFailed,
}

impl WriteOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// One page of a key scan.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanPage {
    /// Keys in ascending order.
    pub keys: Vec<String>,
    /// Pass as `start_after` to fetch the next page; `None` when exhausted.
    pub next: Option<String>,
}
