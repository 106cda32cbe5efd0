//! Content hashing and duplicate removal.

use std::collections::HashSet;

use honestroles_shared::schema::{COMPANY, CONTENT_HASH, DESCRIPTION_TEXT, ID, LOCATION, TITLE};
use honestroles_shared::{Column, JobDataset, Result};
use sha2::{Digest, Sha256};
use tracing::debug;

/// SHA-256 hex digest of the normalized `title|company|location|description`.
///
/// Case and whitespace differences do not change the hash.
pub fn content_hash(
    title: Option<&str>,
    company: Option<&str>,
    location: Option<&str>,
    description: Option<&str>,
) -> String {
    let normalized: Vec<String> = [title, company, location, description]
        .into_iter()
        .map(|part| {
            part.unwrap_or_default()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase()
        })
        .collect();

    let mut hasher = Sha256::new();
    hasher.update(normalized.join("|").as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Content hash of one row, or `None` when every hashed field is blank.
fn row_hash(dataset: &JobDataset, row: usize) -> Option<String> {
    let parts = [TITLE, COMPANY, LOCATION, DESCRIPTION_TEXT].map(|c| dataset.text_at(c, row));
    if parts.iter().all(|p| p.is_none_or(|s| s.trim().is_empty())) {
        return None;
    }
    Some(content_hash(parts[0], parts[1], parts[2], parts[3]))
}

/// Add `content_hash` and drop duplicate rows, keeping the first occurrence.
///
/// A row is a duplicate when its non-null `id` was already seen, or when its
/// content hash was already seen. Row order is preserved.
pub fn dedup(dataset: JobDataset) -> Result<JobDataset> {
    let rows = dataset.row_count();
    let hashes: Vec<Option<String>> = (0..rows).map(|row| row_hash(&dataset, row)).collect();

    let keep: Vec<bool> = {
        let mut seen_ids = HashSet::new();
        let mut seen_hashes = HashSet::new();
        hashes
            .iter()
            .enumerate()
            .map(|(row, hash)| {
                let id_is_new = dataset.text_at(ID, row).is_none_or(|id| seen_ids.insert(id));
                let hash_is_new = hash.as_deref().is_none_or(|h| seen_hashes.insert(h));
                id_is_new && hash_is_new
            })
            .collect()
    };

    let dropped = keep.iter().filter(|k| !**k).count();
    debug!(rows, dropped, "dedup complete");

    dataset
        .with_column(CONTENT_HASH, Column::Text(hashes))?
        .filter_rows(&keep)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(values: &[Option<&str>]) -> Column {
        Column::Text(values.iter().map(|v| v.map(String::from)).collect())
    }

    #[test]
    fn hash_ignores_case_and_spacing() {
        let a = content_hash(Some("Data  Engineer"), Some("Acme"), None, Some("Build things"));
        let b = content_hash(Some("data engineer"), Some(" ACME "), None, Some("Build\nthings"));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, content_hash(Some("Data Engineer"), Some("Other"), None, None));
    }

    #[test]
    fn drops_repeated_ids_and_content_in_order() {
        let ds = JobDataset::new(vec![
            ("id".into(), text(&[Some("a"), Some("b"), Some("a"), Some("c"), Some("d")])),
            (
                "title".into(),
                text(&[Some("Analyst"), Some("Engineer"), Some("Other"), Some("analyst"), None]),
            ),
            (
                "company".into(),
                text(&[Some("Acme"), Some("Acme"), Some("Acme"), Some("ACME"), None]),
            ),
        ])
        .expect("dataset");

        let out = dedup(ds).expect("dedup");
        let ids: Vec<_> = (0..out.row_count()).map(|r| out.text_at(ID, r)).collect();
        assert_eq!(ids, vec![Some("a"), Some("b"), Some("d")]);
        assert!(out.has_column(CONTENT_HASH));
        assert_eq!(out.text_at(CONTENT_HASH, 2), None);
        assert!(out.has_unique_ids());
    }

    #[test]
    fn blank_rows_are_not_collapsed() {
        let ds = JobDataset::new(vec![
            ("id".into(), text(&[Some("1"), Some("2")])),
            ("title".into(), text(&[None, None])),
        ])
        .expect("dataset");
        assert_eq!(dedup(ds).expect("dedup").row_count(), 2);
    }
}
