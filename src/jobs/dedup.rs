//! Carrier-file deduplication.
//!
//! Print jobs accumulate many near-duplicate renditions of the same image
//! carrier (one per proofing round); only the newest rendition per ink
//! channel, plus anything unambiguously tied to the job, should survive into
//! the archive. This module only plans deletions; the pipeline performs them
//! after confirmation so every planned path is reportable first.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::LazyLock,
    time::SystemTime,
};

use regex::Regex;
use tracing::warn;

use super::JobNumber;

/// File extensions recognized as image carriers. Anything else in the subtree
/// is out of scope: never deleted, never kept.
const CARRIER_EXTENSIONS: [&str; 3] = ["len", "tif", "tiff"];

/// A file that exists for this purpose only counts as "short-named" (and is
/// therefore always kept) when it has at most this many tokens.
const SHORT_NAME_TOKEN_LIMIT: usize = 2;

/// Trailing revision/cut-class codes like `C2` are noise, not ink tags.
static REVISION_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z]+[0-9]+$").expect("revision pattern is valid"));

/// One carrier file under consideration, scoped to a single dedup pass.
#[derive(Debug)]
struct CarrierFile {
    path: PathBuf,
    modified: SystemTime,
    tokens: Vec<String>,
    keep: bool,
}

/// Outcome of planning one job's carrier cleanup.
#[derive(Debug, Default, Clone)]
pub struct DedupPlan {
    /// Paths slated for deletion, sorted for stable reporting.
    pub delete: Vec<PathBuf>,
    /// Number of carrier files that were examined.
    pub considered: usize,
}

/// Plan which carrier files to delete before archiving `job_root`.
///
/// Walks the carrier subtree recursively, skipping dot-prefixed entries. A
/// file whose metadata cannot be read is kept and skipped; preservation is
/// the conservative default. A missing carrier subtree yields an empty plan.
pub fn plan_deletions(job_number: &JobNumber, job_root: &Path, carrier_subdir: &Path) -> DedupPlan {
    let carrier_root = job_root.join(carrier_subdir);
    let mut files = collect_carrier_files(&carrier_root);

    apply_job_number_gate(&mut files, job_number);
    apply_recency_gate(&mut files);
    apply_short_name_override(&mut files);

    let mut delete: Vec<PathBuf> = files
        .iter()
        .filter(|file| !file.keep)
        .map(|file| file.path.clone())
        .collect();
    delete.sort();
    DedupPlan {
        delete,
        considered: files.len(),
    }
}

fn collect_carrier_files(carrier_root: &Path) -> Vec<CarrierFile> {
    let mut files = Vec::new();
    if !carrier_root.is_dir() {
        return files;
    }
    let mut stack = vec![carrier_root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(dir = %dir.display(), error = %err, "Failed to read carrier directory");
                continue;
            }
        };
        for entry_result in entries {
            let Ok(entry) = entry_result else { continue };
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_symlink() {
                continue;
            }
            if file_type.is_dir() {
                stack.push(entry.path());
                continue;
            }
            if !file_type.is_file() || !has_carrier_extension(&name) {
                continue;
            }
            let path = entry.path();
            let modified = match entry.metadata().and_then(|meta| meta.modified()) {
                Ok(modified) => modified,
                Err(err) => {
                    // Unreadable metadata: keep the file out of the pass
                    // entirely so it can never be planned for deletion.
                    warn!(path = %path.display(), error = %err, "Failed to stat carrier file");
                    continue;
                }
            };
            files.push(CarrierFile {
                tokens: tokenize(&name),
                path,
                modified,
                keep: true,
            });
        }
    }
    files
}

fn has_carrier_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            CARRIER_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
}

/// Split a filename into its tokens.
///
/// The extension is stripped at the last dot, then the stem is split on
/// whitespace, underscores and hyphens, in that order. The ordering is a
/// contract: the last token carries the ink-channel tag the recency gate
/// groups by. A trailing revision marker is dropped before further analysis.
fn tokenize(filename: &str) -> Vec<String> {
    let stem = filename.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(filename);
    let mut tokens: Vec<String> = stem
        .split_whitespace()
        .flat_map(|section| section.split('_'))
        .flat_map(|section| section.split('-'))
        .filter(|token| !token.is_empty())
        .map(str::to_owned)
        .collect();
    let trailing_marker = tokens
        .last()
        .is_some_and(|last| REVISION_MARKER.is_match(last));
    if trailing_marker {
        tokens.pop();
    }
    tokens
}

/// Primary relevance filter: a file stays kept only if some token contains
/// the job number as a substring.
fn apply_job_number_gate(files: &mut [CarrierFile], job_number: &JobNumber) {
    let needle = job_number.as_str();
    for file in files.iter_mut() {
        if !file.tokens.iter().any(|token| token.contains(needle)) {
            file.keep = false;
        }
    }
}

/// Among files still kept, keep only the newest file per ink-channel token.
///
/// Ties on modification time go to the lexicographically greatest path; the
/// sort below makes that pick deterministic.
fn apply_recency_gate(files: &mut [CarrierFile]) {
    let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (index, file) in files.iter().enumerate() {
        if file.keep
            && let Some(channel) = file.tokens.last()
        {
            groups.entry(channel.clone()).or_default().push(index);
        }
    }
    for indices in groups.values() {
        if indices.len() < 2 {
            continue;
        }
        let mut ordered = indices.clone();
        ordered.sort_by(|&a, &b| {
            files[a]
                .modified
                .cmp(&files[b].modified)
                .then_with(|| files[a].path.cmp(&files[b].path))
        });
        for &index in &ordered[..ordered.len() - 1] {
            files[index].keep = false;
        }
    }
}

/// Short names are assumed unambiguous and always relevant; this runs last so
/// it can override the earlier gates.
fn apply_short_name_override(files: &mut [CarrierFile]) {
    for file in files.iter_mut() {
        if file.tokens.len() <= SHORT_NAME_TOKEN_LIMIT {
            file.keep = true;
        }
    }
}
