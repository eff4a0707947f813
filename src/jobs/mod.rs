//! Job identity and lifecycle.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::archive::Artifact;
use crate::naming;

pub mod classify;
pub mod dedup;

pub use classify::{ClassificationResult, classify};
pub use dedup::{DedupPlan, plan_deletions};

/// Identifier of a print job.
///
/// Numeric in practice but treated as an opaque token; the last digit selects
/// the shard directory under the jobs root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobNumber(String);

impl JobNumber {
    /// Wrap a raw job number token.
    pub fn new(number: impl Into<String>) -> Self {
        Self(number.into())
    }

    /// Borrow the number as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Folder for this job under the given jobs root.
    pub fn root_under(&self, jobs_root: &Path) -> PathBuf {
        naming::job_root(jobs_root, &self.0)
    }
}

impl std::fmt::Display for JobNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of a job within one batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Not yet inspected.
    Unclassified,
    /// Already archived; its disc tags were recognized.
    Archived,
    /// Content present that still needs to be archived.
    NeedsArchiving,
    /// Excluded from all further processing for this run.
    Ignored,
}

/// A job being carried through the pipeline.
#[derive(Debug, Clone)]
pub struct Job {
    pub number: JobNumber,
    pub root: PathBuf,
    pub state: JobState,
    /// Disc numbers this job is archived to, in placement order.
    pub assigned_discs: Vec<u32>,
    pub artifacts: Vec<Artifact>,
}

impl Job {
    /// Create an unclassified job rooted under `jobs_root`.
    pub fn new(number: JobNumber, jobs_root: &Path) -> Self {
        let root = number.root_under(jobs_root);
        Self {
            number,
            root,
            state: JobState::Unclassified,
            assigned_discs: Vec::new(),
            artifacts: Vec::new(),
        }
    }
}

/// Parse a plain-text job manifest: one job number per line.
///
/// Blank lines and `#` comments are skipped; duplicate entries keep their
/// first occurrence only, mirroring the double-entry check the old workbook
/// ingest performed.
pub fn parse_manifest(text: &str) -> Vec<JobNumber> {
    let mut seen = Vec::new();
    for line in text.lines() {
        let trimmed = line.split('#').next().unwrap_or("").trim();
        if trimmed.is_empty() {
            continue;
        }
        let number = JobNumber::new(trimmed);
        if !seen.contains(&number) {
            seen.push(number);
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_skips_comments_blanks_and_duplicates() {
        let text = "4044906\n\n# queued last week\n4044910\n4044906   # re-listed\n";
        let numbers = parse_manifest(text);
        assert_eq!(
            numbers,
            vec![JobNumber::new("4044906"), JobNumber::new("4044910")]
        );
    }

    #[test]
    fn job_root_follows_shard_convention() {
        let job = Job::new(JobNumber::new("4044906"), Path::new("/srv/jobs"));
        assert_eq!(job.root, PathBuf::from("/srv/jobs/Jobs6/4044906"));
        assert_eq!(job.state, JobState::Unclassified);
    }
}
