//! Pagination cursor for the archive's cursor-based paging.
//!
//! The archive echoes an opaque `after` token in each page's paging
//! envelope; requests pass it back verbatim to continue where the previous
//! page ended. [`FetchCursor`] pairs that token with a strictly increasing
//! page counter and round-trips through JSON exactly, so a persisted cursor
//! resumes at the same page.

use serde::{Deserialize, Serialize};

/// Position in a paginated archive result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchCursor {
    /// Opaque continuation token from the archive.
    pub after: String,
    /// 1-based index of the page this cursor points past. Monotonically
    /// increasing within a run; never regresses except by restoring a
    /// persisted cursor.
    pub page: u64,
}

impl FetchCursor {
    #[must_use]
    pub fn new(after: String, page: u64) -> Self {
        Self { after, page }
    }

    /// Serializes the cursor for persistence between runs.
    ///
    /// # Errors
    ///
    /// Returns the underlying `serde_json` error if serialization fails.
    pub fn serialize(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Restores a cursor persisted by [`FetchCursor::serialize`].
    ///
    /// # Errors
    ///
    /// Returns the underlying `serde_json` error if `raw` is not a valid
    /// serialized cursor.
    pub fn restore(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_restore_round_trips_exactly() {
        let cursor = FetchCursor::new("QVZPNzU4waZCZA==".to_owned(), 17);
        let raw = cursor.serialize().unwrap();
        let restored = FetchCursor::restore(&raw).unwrap();
        assert_eq!(restored, cursor);
    }

    #[test]
    fn restore_rejects_garbage() {
        assert!(FetchCursor::restore("not a cursor").is_err());
    }

    #[test]
    fn restore_rejects_missing_fields() {
        assert!(FetchCursor::restore(r#"{"after":"x"}"#).is_err());
    }
}
