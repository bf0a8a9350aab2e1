//! Media URL resolution from record payloads.
//!
//! Archive payloads carry media locations in a handful of top-level string
//! fields whose presence varies by ad format: an image ad has
//! `original_image_url`, a video ad has `video_hd_url`/`video_sd_url` plus a
//! preview image, a text-only ad has none of them. Which fields are scanned
//! is policy, not code — the archive renames fields between versions.

use std::collections::HashSet;

use adgrab_client::AdRecord;

use crate::types::{MediaKind, MediaRef};

/// Prioritized payload fields scanned for media URLs.
///
/// Fields are scanned in declaration order within each list; lists are
/// scanned images → videos → thumbnails → extra. The first field to claim a
/// URL wins, so a video's preview image never shadows the video itself.
#[derive(Debug, Clone)]
pub struct MediaFieldPolicy {
    pub image_fields: Vec<String>,
    pub video_fields: Vec<String>,
    /// Yield [`MediaKind::Image`] refs; scanned after the video fields.
    pub thumbnail_fields: Vec<String>,
    /// Catch-all fields whose media kind cannot be declared up front.
    pub extra_fields: Vec<String>,
}

impl Default for MediaFieldPolicy {
    /// Default field set observed on archive ad snapshots.
    fn default() -> Self {
        Self {
            image_fields: vec![
                "original_image_url".to_owned(),
                "resized_image_url".to_owned(),
            ],
            video_fields: vec!["video_hd_url".to_owned(), "video_sd_url".to_owned()],
            thumbnail_fields: vec!["video_preview_image_url".to_owned()],
            extra_fields: Vec::new(),
        }
    }
}

/// Extracts the media references a record's payload declares.
///
/// Pure and total: unknown or absent fields contribute nothing, a record
/// with only a thumbnail still yields one ref, and a record with no media
/// fields yields an empty list. Duplicate URLs within one record collapse
/// to the first field that produced them.
#[must_use]
pub fn resolve(record: &AdRecord, policy: &MediaFieldPolicy) -> Vec<MediaRef> {
    let payload = record.payload();
    let mut seen = HashSet::new();
    let mut refs = Vec::new();

    let groups: [(&[String], MediaKind); 4] = [
        (&policy.image_fields, MediaKind::Image),
        (&policy.video_fields, MediaKind::Video),
        (&policy.thumbnail_fields, MediaKind::Image),
        (&policy.extra_fields, MediaKind::Unknown),
    ];

    for (fields, kind) in groups {
        for field in fields {
            let Some(url) = payload.str_field(field) else {
                continue;
            };
            if url.is_empty() || !seen.insert(url.to_owned()) {
                continue;
            }
            refs.push(MediaRef {
                url: url.to_owned(),
                kind,
                record_id: record.id.clone(),
            });
        }
    }

    refs
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(payload: serde_json::Value) -> AdRecord {
        AdRecord {
            id: "ad-1".to_owned(),
            payload,
        }
    }

    #[test]
    fn no_media_fields_yield_empty_list() {
        let refs = resolve(
            &record(json!({ "page_name": "Acme" })),
            &MediaFieldPolicy::default(),
        );
        assert!(refs.is_empty());
    }

    #[test]
    fn image_ad_yields_one_image_ref() {
        let refs = resolve(
            &record(json!({ "original_image_url": "https://cdn.example/a.jpg" })),
            &MediaFieldPolicy::default(),
        );
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].url, "https://cdn.example/a.jpg");
        assert_eq!(refs[0].kind, MediaKind::Image);
        assert_eq!(refs[0].record_id, "ad-1");
    }

    #[test]
    fn video_ad_yields_video_and_preview() {
        let refs = resolve(
            &record(json!({
                "video_hd_url": "https://cdn.example/v.mp4",
                "video_preview_image_url": "https://cdn.example/p.jpg"
            })),
            &MediaFieldPolicy::default(),
        );
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].kind, MediaKind::Video);
        assert_eq!(refs[1].kind, MediaKind::Image);
    }

    #[test]
    fn thumbnail_only_record_still_yields_a_ref() {
        let refs = resolve(
            &record(json!({ "video_preview_image_url": "https://cdn.example/p.jpg" })),
            &MediaFieldPolicy::default(),
        );
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].kind, MediaKind::Image);
    }

    #[test]
    fn duplicate_urls_collapse_to_first_field() {
        let refs = resolve(
            &record(json!({
                "original_image_url": "https://cdn.example/same.jpg",
                "resized_image_url": "https://cdn.example/same.jpg"
            })),
            &MediaFieldPolicy::default(),
        );
        assert_eq!(refs.len(), 1);
    }

    #[test]
    fn empty_and_non_string_fields_are_ignored() {
        let refs = resolve(
            &record(json!({
                "original_image_url": "",
                "video_hd_url": 17
            })),
            &MediaFieldPolicy::default(),
        );
        assert!(refs.is_empty());
    }

    #[test]
    fn custom_policy_overrides_field_names() {
        let policy = MediaFieldPolicy {
            image_fields: vec!["hero_image".to_owned()],
            video_fields: Vec::new(),
            thumbnail_fields: Vec::new(),
            extra_fields: vec!["media_url".to_owned()],
        };
        let refs = resolve(
            &record(json!({
                "hero_image": "https://cdn.example/h.png",
                "media_url": "https://cdn.example/m"
            })),
            &policy,
        );
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].kind, MediaKind::Image);
        assert_eq!(refs[1].kind, MediaKind::Unknown);
    }
}
