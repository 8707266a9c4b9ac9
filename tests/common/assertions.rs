//! Shared checks on job summaries and output directories

use media_dl::types::{JobSummary, Outcome};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Finished files under `root`, recursively, sorted; staged `.part` files excluded
pub fn visible_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            !p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(".part"))
        })
        .collect();
    files.sort();
    files
}

/// Staged `.part` files left anywhere under `root`
pub fn partial_files(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .map(|e| e.into_path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(".part"))
        })
        .collect()
}

/// Invariants every summary must satisfy
pub fn assert_summary_consistent(summary: &JobSummary) {
    assert_eq!(
        summary.downloaded + summary.skipped + summary.failed,
        summary.outcomes.len(),
        "counts must add up to the number of outcomes"
    );

    let collected: usize = summary.source_notes.iter().map(|n| n.collected).sum();
    assert_eq!(
        collected,
        summary.outcomes.len(),
        "every collected item needs exactly one outcome"
    );

    let mut ids = HashSet::new();
    for outcome in &summary.outcomes {
        assert!(
            ids.insert(outcome.item().id.clone()),
            "item {} has more than one outcome",
            outcome.item().id
        );
    }

    let mut hashes = HashSet::new();
    for outcome in &summary.outcomes {
        if let Outcome::Downloaded { item, local_path, .. } = outcome {
            let hash = item
                .content_hash
                .as_deref()
                .expect("downloaded items carry their hash");
            assert!(
                hashes.insert(hash.to_string()),
                "two downloads share content hash {hash}"
            );
            assert!(local_path.is_file(), "{} should exist", local_path.display());
        }
    }
}
