//! Text normalization and content keys.
//!
//! The content key is the change-detection fingerprint of an item: two fetches
//! yielding the same normalized text at the same canonical URL hash to the same
//! key and therefore never produce a new revision.

use reqwest::Url;
use sha2::{Digest, Sha256};

use super::{FetchedItem, NormalizedItem};

/// Collapse runs of whitespace to single spaces and trim the ends.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canonical form of a URL.
///
/// Scheme and host are lowercased, the fragment and `utm_*` tracking
/// parameters are dropped and trailing slashes are removed. Strings that do
/// not parse as URLs are only trimmed.
pub fn canonical_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(mut url) = Url::parse(trimmed) else {
        return trimmed.to_string();
    };

    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !key.starts_with("utm_"))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }

    let path = url.path().trim_end_matches('/').to_string();
    url.set_path(if path.is_empty() { "/" } else { &path });

    let mut canonical = url.to_string();
    if url.query().is_none() && canonical.ends_with('/') {
        canonical.pop();
    }
    canonical
}

/// Hash of normalized text and canonical URL, as lowercase hex.
pub fn content_key(normalized_text: &str, canonical_url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized_text.as_bytes());
    hasher.update(b"\n");
    hasher.update(canonical_url.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Normalize a fetched item and compute its content key.
pub fn normalize_item(item: &FetchedItem) -> NormalizedItem {
    let text = normalize_text(&item.text);
    let url = canonical_url(&item.url);
    let title = item
        .title
        .as_deref()
        .map(normalize_text)
        .filter(|t| !t.is_empty());
    let content_key = content_key(&text, &url);

    NormalizedItem {
        external_id: item.external_id.clone(),
        url,
        title,
        text,
        content_key,
    }
}
