//! On-disk naming conventions shared by the allocator and the job pipeline.
//!
//! These must stay bit-exact with the layout already present on the archive
//! volumes: disc folders are `Disc` followed by a zero-padded 4-digit number,
//! and job folders are sharded by the last digit of the job number into
//! `Jobs0`..`Jobs9` subtrees.

use std::path::{Path, PathBuf};

/// Prefix used for disc folders and for tag folders inside archived jobs.
pub const DISC_FOLDER_PREFIX: &str = "Disc";

/// Prefix of the shard directories under the jobs root.
pub const JOB_SHARD_PREFIX: &str = "Jobs";

/// Folder name for a disc number, e.g. `Disc0042`.
///
/// Numbers wider than four digits are not truncated.
pub fn disc_folder_name(number: u32) -> String {
    format!("{DISC_FOLDER_PREFIX}{number:04}")
}

/// Parse a folder name produced by [`disc_folder_name`] back into its number.
///
/// Strict inverse: the prefix must match exactly and the remainder must be
/// all ASCII digits. Loosely-spelled tag folders inside job directories are
/// handled separately by the classifier.
pub fn parse_disc_folder(name: &str) -> Option<u32> {
    let digits = name.strip_prefix(DISC_FOLDER_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Absolute path of a disc folder under the staging root.
pub fn disc_path(staging_root: &Path, number: u32) -> PathBuf {
    staging_root.join(disc_folder_name(number))
}

/// Absolute path of a job folder under the jobs root.
///
/// The last ASCII digit of the job number selects the shard directory, so job
/// `4044906` lives at `<jobs_root>/Jobs6/4044906`.
pub fn job_root(jobs_root: &Path, job_number: &str) -> PathBuf {
    let shard_digit = job_number
        .chars()
        .rev()
        .find(|c| c.is_ascii_digit())
        .unwrap_or('0');
    jobs_root
        .join(format!("{JOB_SHARD_PREFIX}{shard_digit}"))
        .join(job_number)
}
