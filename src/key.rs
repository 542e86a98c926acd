//! Validation for strings used as cache keys.
use crate::error::{CacheError, Result};

/// Checks that `key` is safe to use verbatim as a single filesystem path
/// component: non-empty, no path separators, no NUL byte, and not a `.`/`..`
/// traversal token.
pub fn validate(key: &str) -> Result<()> {
    let is_safe = !key.is_empty()
        && key != "."
        && key != ".."
        && !key.contains(['/', '\\', '\0']);

    if is_safe {
        Ok(())
    } else {
        Err(CacheError::InvalidKey {
            key: key.to_owned(),
        })
    }
}
