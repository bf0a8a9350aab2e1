//! Record and page types for the archive API.
//!
//! The archive's payload schema is not fixed: fields come and go between API
//! versions and between ad types (a political ad carries reach breakdowns a
//! commercial ad lacks). Records therefore keep their raw JSON payload and
//! expose the fields the pipeline cares about through [`AdPayload`], a typed
//! accessor layer returning `Option<_>` — absent fields are normal, not
//! errors.

use serde_json::Value;

use crate::error::ClientError;

/// A single advertisement record from one page of archive results.
///
/// Immutable once built; the raw payload travels with the record so the
/// dataset preserves everything the archive returned.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AdRecord {
    /// Archive-assigned identifier, unique per remote service.
    pub id: String,
    /// Raw payload as returned by the archive.
    pub payload: Value,
}

impl AdRecord {
    #[must_use]
    pub fn payload(&self) -> AdPayload<'_> {
        AdPayload(&self.payload)
    }
}

/// Schema-tolerant view over a record payload.
#[derive(Debug, Clone, Copy)]
pub struct AdPayload<'a>(pub(crate) &'a Value);

impl<'a> AdPayload<'a> {
    /// A top-level string field by name. The resolver's media field policy
    /// goes through this accessor.
    #[must_use]
    pub fn str_field(&self, name: &str) -> Option<&'a str> {
        self.0.get(name).and_then(Value::as_str)
    }

    #[must_use]
    pub fn page_id(&self) -> Option<&'a str> {
        self.str_field("page_id")
    }

    #[must_use]
    pub fn page_name(&self) -> Option<&'a str> {
        self.str_field("page_name")
    }

    /// URL of the rendered ad snapshot page.
    #[must_use]
    pub fn snapshot_url(&self) -> Option<&'a str> {
        self.str_field("ad_snapshot_url")
    }

    #[must_use]
    pub fn delivery_start(&self) -> Option<&'a str> {
        self.str_field("ad_delivery_start_time")
    }

    #[must_use]
    pub fn delivery_stop(&self) -> Option<&'a str> {
        self.str_field("ad_delivery_stop_time")
    }

    /// Creative body texts; empty when the field is absent or not an array.
    #[must_use]
    pub fn creative_bodies(&self) -> Vec<&'a str> {
        self.0
            .get("ad_creative_bodies")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn languages(&self) -> Vec<&'a str> {
        self.0
            .get("languages")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

/// One parsed page of archive results.
#[derive(Debug)]
pub struct AdsPage {
    pub records: Vec<AdRecord>,
    /// Continuation token for the next page, when the archive reports one.
    pub next_after: Option<String>,
    pub has_more: bool,
    /// Entries dropped from this page because they carried no `id`.
    pub skipped_entries: usize,
}

/// Parses an archive page body into [`AdsPage`].
///
/// The paging envelope is extracted before the `data` array so a page whose
/// record list is broken still yields its continuation cursor. Per-entry
/// problems (an entry with no `id`) drop that entry with a warning rather
/// than failing the page.
///
/// # Errors
///
/// Returns [`ClientError::MalformedPage`] when `data` is absent or not an
/// array, carrying any salvaged continuation cursor.
pub(crate) fn parse_archive_page(body: &Value, context: &str) -> Result<AdsPage, ClientError> {
    let paging = body.get("paging");
    let next_after = paging
        .and_then(|p| p.get("cursors"))
        .and_then(|c| c.get("after"))
        .and_then(Value::as_str)
        .map(str::to_owned);
    // The archive omits `paging.next` on the last page even when a cursor is
    // still echoed back; only `next` signals more results.
    let has_more = paging.and_then(|p| p.get("next")).is_some() && next_after.is_some();

    let Some(entries) = body.get("data").and_then(Value::as_array) else {
        return Err(ClientError::MalformedPage {
            context: format!("{context}: missing or non-array `data` field"),
            next_after,
        });
    };

    let mut records = Vec::with_capacity(entries.len());
    let mut skipped_entries = 0usize;
    for entry in entries {
        match entry.get("id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => records.push(AdRecord {
                id: id.to_owned(),
                payload: entry.clone(),
            }),
            _ => {
                skipped_entries += 1;
                tracing::warn!(context, "dropping archive entry without an id");
            }
        }
    }

    Ok(AdsPage {
        records,
        next_after,
        has_more,
        skipped_entries,
    })
}
