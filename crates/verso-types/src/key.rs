//! Content keys.
//!
//! A [`ContentKey`] is a non-empty sequence of non-empty elements, rendered
//! with `.` separators (`db.schema.table`). Keys order element-wise so that a
//! `BTreeMap<ContentKey, _>` groups keys sharing a namespace prefix.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Maximum number of elements in a key.
pub const MAX_ELEMENTS: usize = 20;

/// Maximum total length of a key in bytes, summed over its elements.
pub const MAX_KEY_BYTES: usize = 500;

/// Key addressing one content value in the index.
///
/// Decoding goes through the same validation as [`ContentKey::new`].
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct ContentKey {
    elements: Vec<String>,
}

impl ContentKey {
    /// Build a key from its elements, validating each one.
    pub fn new<I, S>(elements: I) -> Result<Self, TypeError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let elements: Vec<String> = elements.into_iter().map(Into::into).collect();
        let rendered = elements.join(".");
        let invalid = |reason: &str| TypeError::InvalidKey {
            key: rendered.clone(),
            reason: reason.to_string(),
        };

        if elements.is_empty() {
            return Err(invalid("key must have at least one element"));
        }
        if elements.len() > MAX_ELEMENTS {
            return Err(invalid("too many elements"));
        }
        if elements.iter().map(String::len).sum::<usize>() > MAX_KEY_BYTES {
            return Err(invalid("key too long"));
        }
        for element in &elements {
            if element.is_empty() {
                return Err(invalid("elements must not be empty"));
            }
            if element.contains('\0') {
                return Err(invalid("elements must not contain NUL"));
            }
        }
        Ok(Self { elements })
    }

    /// Parse a dot-separated key (`"a.b.c"`).
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        Self::new(s.split('.'))
    }

    pub fn elements(&self) -> &[String] {
        &self.elements
    }

    /// The key's namespace: all elements but the last.
    pub fn namespace(&self) -> &[String] {
        &self.elements[..self.elements.len() - 1]
    }

    /// The last element.
    pub fn name(&self) -> &str {
        // `new` rejects empty element lists.
        &self.elements[self.elements.len() - 1]
    }
}

impl TryFrom<Vec<String>> for ContentKey {
    type Error = TypeError;

    fn try_from(elements: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(elements)
    }
}

impl From<ContentKey> for Vec<String> {
    fn from(key: ContentKey) -> Self {
        key.elements
    }
}

impl fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentKey({self})")
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.elements.join("."))
    }
}
