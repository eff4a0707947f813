//! Job classification: decide from the top level of a job folder whether it
//! is already archived, still needs archiving, or has to be left for a human.
//!
//! Read-only. Any shape the rules cannot account for degrades to
//! [`ClassificationResult::Ignored`] with the reason recorded; a job that
//! cannot be confidently classified is never auto-processed.

use std::{path::Path, sync::LazyLock};

use regex::Regex;
use tracing::warn;

use crate::fs_scan::{self, ChildEntry};

/// Hidden share-metadata file that never counts toward classification.
const NOISE_FILE: &str = ".DS_Store";
/// Hidden per-job configuration directory, likewise ignored.
const NOISE_DIR: &str = "config";

/// A tag id this far (or further) below the maximum is treated as a stray
/// leftover from an ancient run, not part of this job's disc range.
const TAG_OUTLIER_THRESHOLD: u32 = 10;

/// Tag folders tolerate either spelling, an optional `#` and stray spacing,
/// e.g. `Disc0042`, `disk 7`, `Disk#12`.
static TAG_DIR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^dis[ck]\s*#?\s*(\d+)$").expect("tag pattern is valid"));

/// Outcome of classifying one job folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassificationResult {
    /// Every remaining subdirectory is a recognized disc tag.
    Archived { discs: Vec<u32> },
    /// Real content remains alongside (or instead of) disc tags.
    NeedsArchiving,
    /// Left alone for this run; the reason is data, not an error.
    Ignored { reason: String },
}

impl ClassificationResult {
    fn ignored(reason: impl Into<String>) -> Self {
        ClassificationResult::Ignored {
            reason: reason.into(),
        }
    }
}

/// Classify the job folder at `root`.
///
/// Lists one level only and never mutates the filesystem. Running this twice
/// over an unchanged tree yields the same result.
pub fn classify(root: &Path) -> ClassificationResult {
    let children = match fs_scan::list_children(root) {
        Ok(children) => children,
        Err(err) => {
            warn!(root = %root.display(), error = %err, "Failed to list job folder");
            return ClassificationResult::ignored(format!("unreadable job folder: {err}"));
        }
    };
    classify_children(&children)
}

fn classify_children(children: &[ChildEntry]) -> ClassificationResult {
    let relevant: Vec<&ChildEntry> = children.iter().filter(|child| !is_noise(child)).collect();

    if relevant.iter().any(|child| !child.is_dir) {
        // Loose files at the top level mean the job was never laid out by the
        // production system; a human has to look at it.
        return ClassificationResult::ignored("loose files in job folder");
    }

    let subdirs: Vec<&str> = relevant
        .iter()
        .filter(|child| child.is_dir)
        .map(|child| child.name.as_str())
        .collect();
    if subdirs.is_empty() {
        return ClassificationResult::ignored("job folder is empty");
    }

    let tag_ids: Vec<u32> = subdirs.iter().filter_map(|name| parse_tag_dir(name)).collect();
    let discs = filter_outliers(tag_ids);

    match discs.len().cmp(&subdirs.len()) {
        std::cmp::Ordering::Equal => ClassificationResult::Archived { discs },
        std::cmp::Ordering::Less => ClassificationResult::NeedsArchiving,
        std::cmp::Ordering::Greater => {
            // More recognized tags than subdirectories cannot happen unless
            // the bookkeeping above is wrong; refuse to touch the job.
            ClassificationResult::ignored("tag count exceeds subdirectory count")
        }
    }
}

fn is_noise(child: &ChildEntry) -> bool {
    if child.is_dir {
        child.name == NOISE_DIR
    } else {
        child.name == NOISE_FILE
    }
}

fn parse_tag_dir(name: &str) -> Option<u32> {
    TAG_DIR_PATTERN
        .captures(name)
        .and_then(|captures| captures.get(1))
        .and_then(|id| id.as_str().parse().ok())
}

/// Drop tag ids implausibly far below the maximum, returning the survivors
/// in ascending order.
fn filter_outliers(mut ids: Vec<u32>) -> Vec<u32> {
    ids.sort_unstable();
    let Some(&max) = ids.last() else {
        return ids;
    };
    ids.retain(|&id| max - id < TAG_OUTLIER_THRESHOLD);
    ids
}
