//! Reference name validation following git-style conventions.
//!
//! Valid reference names:
//! - Are non-empty and at most [`MAX_NAME_BYTES`] bytes long
//! - Contain no whitespace, control characters, or any of `~ ^ : ? * [ \`
//! - Contain neither `..` nor `@{`
//! - Do not start or end with `.` or `/`, and do not end with `.lock`
//! - Consist of non-empty `/`-separated components, none starting with `.`

use crate::error::{RefError, RefResult};

/// Longest accepted name, in bytes. Keeps `ref/<name>` within backend key
/// limits.
pub const MAX_NAME_BYTES: usize = 255;

const FORBIDDEN_CHARS: &[char] = &['~', '^', ':', '?', '*', '[', '\\'];

fn invalid(name: &str, reason: impl Into<String>) -> RefError {
    RefError::InvalidName {
        name: name.to_string(),
        reason: reason.into(),
    }
}

/// Validate a reference name, returning `Ok(())` if valid.
///
/// # Examples
///
/// ```
/// use verso_refs::names::validate_reference_name;
///
/// assert!(validate_reference_name("main").is_ok());
/// assert!(validate_reference_name("release/2024.1").is_ok());
/// assert!(validate_reference_name("").is_err());
/// assert!(validate_reference_name("bad..name").is_err());
/// ```
pub fn validate_reference_name(name: &str) -> RefResult<()> {
    if name.is_empty() {
        return Err(invalid(name, "name must not be empty"));
    }
    if name.len() > MAX_NAME_BYTES {
        return Err(invalid(
            name,
            format!("longer than {MAX_NAME_BYTES} bytes"),
        ));
    }

    if let Some(ch) = name
        .chars()
        .find(|c| c.is_whitespace() || c.is_control() || FORBIDDEN_CHARS.contains(c))
    {
        return Err(invalid(name, format!("contains forbidden character: {ch:?}")));
    }

    if name.contains("..") {
        return Err(invalid(name, "must not contain '..'"));
    }
    if name.contains("@{") {
        return Err(invalid(name, "must not contain '@{'"));
    }
    if name.starts_with('.') || name.ends_with('.') {
        return Err(invalid(name, "must not start or end with '.'"));
    }
    if name.starts_with('/') || name.ends_with('/') {
        return Err(invalid(name, "must not start or end with '/'"));
    }
    if name.ends_with(".lock") {
        return Err(invalid(name, "must not end with '.lock'"));
    }

    for component in name.split('/') {
        if component.is_empty() {
            return Err(invalid(name, "path components must not be empty"));
        }
        if component.starts_with('.') {
            return Err(invalid(
                name,
                format!("component must not start with '.': {component:?}"),
            ));
        }
    }

    Ok(())
}
