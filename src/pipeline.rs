//! Per-job orchestration: classify, dedup, archive, allocate, tag.
//!
//! Strictly single-threaded and batch-sequential; one job runs to completion
//! before the next begins, so the disc catalog always sees a consistent,
//! monotonically-updated fill state. Producer or allocator failures abort the
//! current job only; the batch carries on.

use std::{fs, path::PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use crate::allocator::{AllocError, DiscCatalog};
use crate::archive::{ArchiveProducer, ProducerError};
use crate::config::RunConfig;
use crate::jobs::{ClassificationResult, Job, JobNumber, JobState, classify, plan_deletions};
use crate::naming;

/// Asks whether planned deletions may proceed.
///
/// The interactive prompt loop lives in the shell; the library only ships
/// [`AssumeYes`] so unattended runs and tests never block on a terminal.
pub trait ConfirmationProvider {
    fn confirm_deletions(&mut self, job: &JobNumber, paths: &[PathBuf]) -> bool;
}

/// Approves every deletion plan.
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeYes;

impl ConfirmationProvider for AssumeYes {
    fn confirm_deletions(&mut self, _job: &JobNumber, _paths: &[PathBuf]) -> bool {
        true
    }
}

/// Errors that abort processing of a single job.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Producer(#[from] ProducerError),
    #[error(transparent)]
    Alloc(#[from] AllocError),
    #[error("Failed to finalize job folder {path}: {source}")]
    Finalize {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// How one job ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Recognized as archived on a previous run; nothing was touched.
    AlreadyArchived { discs: Vec<u32> },
    /// Archived and placed during this run.
    Archived { discs: Vec<u32>, deleted_carriers: usize },
    /// Left alone, with the classifier's reason.
    Ignored { reason: String },
    /// The operator declined the deletion plan; nothing was touched.
    DeletionsDeclined,
    /// Dry run: decisions were logged, nothing was touched.
    Planned { would_delete: usize },
    /// Aborted partway; the error is carried for the report.
    Failed { error: String },
}

/// Report entry for one job.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub number: JobNumber,
    pub outcome: JobOutcome,
}

/// Everything that happened during one batch run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub jobs: Vec<JobReport>,
}

impl RunReport {
    pub fn any_failed(&self) -> bool {
        self.jobs
            .iter()
            .any(|job| matches!(job.outcome, JobOutcome::Failed { .. }))
    }
}

/// Mutable state threaded through a batch run. No globals: the catalog is
/// owned here and only [`DiscCatalog::try_place`] may change fill levels.
pub struct RunContext<P: ArchiveProducer> {
    pub config: RunConfig,
    pub catalog: DiscCatalog,
    pub producer: P,
    /// Log every decision, mutate nothing.
    pub dry_run: bool,
}

impl<P: ArchiveProducer> RunContext<P> {
    pub fn new(config: RunConfig, catalog: DiscCatalog, producer: P) -> Self {
        Self {
            config,
            catalog,
            producer,
            dry_run: false,
        }
    }

    /// Run the full pipeline over every job in the manifest, in order.
    pub fn run_batch(
        &mut self,
        numbers: &[JobNumber],
        confirm: &mut dyn ConfirmationProvider,
    ) -> RunReport {
        let mut report = RunReport::default();
        for number in numbers {
            let mut job = Job::new(number.clone(), &self.config.jobs_root);
            let outcome = self.process_job(&mut job, confirm);
            if let JobOutcome::Failed { error } = &outcome {
                warn!(job = %number, error = %error, "Job aborted, continuing with the next");
            }
            report.jobs.push(JobReport {
                number: number.clone(),
                outcome,
            });
        }
        report
    }

    /// Carry one job through classify → dedup → archive → allocate → tag.
    pub fn process_job(
        &mut self,
        job: &mut Job,
        confirm: &mut dyn ConfirmationProvider,
    ) -> JobOutcome {
        match classify(&job.root) {
            ClassificationResult::Archived { discs } => {
                // Already done on a previous run: record the discs and stop
                // before any filesystem mutation or allocator call.
                job.state = JobState::Archived;
                job.assigned_discs = discs.clone();
                info!(job = %job.number, ?discs, "Job already archived");
                return JobOutcome::AlreadyArchived { discs };
            }
            ClassificationResult::Ignored { reason } => {
                job.state = JobState::Ignored;
                info!(job = %job.number, reason = %reason, "Job ignored");
                return JobOutcome::Ignored { reason };
            }
            ClassificationResult::NeedsArchiving => {
                job.state = JobState::NeedsArchiving;
            }
        }

        let plan = plan_deletions(&job.number, &job.root, &self.config.carrier_subdir);
        info!(
            job = %job.number,
            considered = plan.considered,
            to_delete = plan.delete.len(),
            "Carrier dedup planned"
        );

        if self.dry_run {
            for path in &plan.delete {
                info!(job = %job.number, path = %path.display(), "Would delete carrier file");
            }
            // Archive sizes are unknowable without compressing, so disc
            // placement cannot be forecast; the dry run stops here.
            info!(
                job = %job.number,
                "Would archive and place; sizes and disc numbers need a real run"
            );
            return JobOutcome::Planned {
                would_delete: plan.delete.len(),
            };
        }

        if !plan.delete.is_empty() && !confirm.confirm_deletions(&job.number, &plan.delete) {
            info!(job = %job.number, "Deletion plan declined, leaving job untouched");
            return JobOutcome::DeletionsDeclined;
        }

        match self.archive_and_place(job, &plan.delete) {
            Ok(discs) => JobOutcome::Archived {
                discs,
                deleted_carriers: plan.delete.len(),
            },
            Err(err) => JobOutcome::Failed {
                error: err.to_string(),
            },
        }
    }

    fn archive_and_place(
        &mut self,
        job: &mut Job,
        planned_deletions: &[PathBuf],
    ) -> Result<Vec<u32>, PipelineError> {
        delete_carriers(planned_deletions);
        empty_trash(job, &self.config.trash_dir_name);

        job.artifacts = self.producer.produce(&job.number, &job.root)?;
        info!(
            job = %job.number,
            artifacts = job.artifacts.len(),
            "Archive produced"
        );

        let mut discs: Vec<u32> = Vec::new();
        for artifact in &mut job.artifacts {
            let disc = self.catalog.try_place(artifact)?;
            if !discs.contains(&disc) {
                discs.push(disc);
            }
        }

        finalize_job(job, &discs)?;
        job.state = JobState::Archived;
        job.assigned_discs = discs.clone();
        Ok(discs)
    }
}

/// Delete the confirmed carrier files. A failed delete is logged and skipped;
/// it leaves stale data in the archive but never aborts the batch.
fn delete_carriers(paths: &[PathBuf]) {
    for path in paths {
        match fs::remove_file(path) {
            Ok(()) => info!(path = %path.display(), "Deleted carrier file"),
            Err(err) => warn!(path = %path.display(), error = %err, "Could not delete carrier file"),
        }
    }
}

/// Remove the per-job trash folder. Missing is fine.
fn empty_trash(job: &Job, trash_dir_name: &str) {
    let trash = job.root.join(trash_dir_name);
    if !trash.exists() {
        return;
    }
    match fs::remove_dir_all(&trash) {
        Ok(()) => info!(job = %job.number, "Emptied trash folder"),
        Err(err) => warn!(job = %job.number, error = %err, "Could not empty trash folder"),
    }
}

/// Replace the archived job's content with one empty tag folder per disc it
/// was placed on. Runs only after every artifact was placed successfully.
fn finalize_job(job: &Job, discs: &[u32]) -> Result<(), PipelineError> {
    fs::remove_dir_all(&job.root).map_err(|source| PipelineError::Finalize {
        path: job.root.clone(),
        source,
    })?;
    for &disc in discs {
        let tag = job.root.join(naming::disc_folder_name(disc));
        fs::create_dir_all(&tag).map_err(|source| PipelineError::Finalize {
            path: tag.clone(),
            source,
        })?;
    }
    info!(job = %job.number, ?discs, "Job folder replaced with disc tags");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::Artifact;
    use std::path::Path;
    use tempfile::tempdir;

    /// Producer that fabricates fixed-size artifact files without compressing.
    struct FixedSizeProducer {
        working_dir: PathBuf,
        sizes: Vec<u64>,
        fail: bool,
    }

    impl ArchiveProducer for FixedSizeProducer {
        fn produce(
            &self,
            job_number: &JobNumber,
            _job_root: &Path,
        ) -> Result<Vec<Artifact>, ProducerError> {
            if self.fail {
                return Err(ProducerError::InvalidJobRoot(self.working_dir.clone()));
            }
            fs::create_dir_all(&self.working_dir).unwrap();
            let mut artifacts = Vec::new();
            for (index, &size) in self.sizes.iter().enumerate() {
                let path = self
                    .working_dir
                    .join(format!("{job_number}_part{index}.zip"));
                fs::write(&path, vec![0u8; size as usize]).unwrap();
                artifacts.push(Artifact::new(path, size));
            }
            Ok(artifacts)
        }
    }

    struct RefuseAll;

    impl ConfirmationProvider for RefuseAll {
        fn confirm_deletions(&mut self, _job: &JobNumber, _paths: &[PathBuf]) -> bool {
            false
        }
    }

    fn test_config(base: &Path) -> RunConfig {
        RunConfig {
            jobs_root: base.join("jobs"),
            staging_root: base.join("staging"),
            working_dir: Some(base.join("work")),
            disc_capacity_bytes: 100,
            split_part_bytes: 50,
            carrier_subdir: PathBuf::from("Deliverables/Image_Carriers"),
            trash_dir_name: "Trash".into(),
        }
    }

    fn context(base: &Path, sizes: Vec<u64>) -> RunContext<FixedSizeProducer> {
        let config = test_config(base);
        fs::create_dir_all(&config.staging_root).unwrap();
        let mut catalog = DiscCatalog::scan(&config.staging_root, config.disc_capacity_bytes).unwrap();
        catalog.seed(0).unwrap();
        let producer = FixedSizeProducer {
            working_dir: base.join("work"),
            sizes,
            fail: false,
        };
        RunContext::new(config, catalog, producer)
    }

    fn make_job(ctx: &RunContext<FixedSizeProducer>, number: &str) -> Job {
        let job = Job::new(JobNumber::new(number), &ctx.config.jobs_root);
        fs::create_dir_all(job.root.join("Deliverables")).unwrap();
        job
    }

    #[test]
    fn archived_job_is_left_completely_alone() {
        let dir = tempdir().unwrap();
        let mut ctx = context(dir.path(), vec![10]);
        let mut job = Job::new(JobNumber::new("4044901"), &ctx.config.jobs_root);
        fs::create_dir_all(job.root.join("Disc0009")).unwrap();

        let outcome = ctx.process_job(&mut job, &mut AssumeYes);
        assert_eq!(outcome, JobOutcome::AlreadyArchived { discs: vec![9] });
        assert_eq!(job.state, JobState::Archived);
        assert_eq!(job.assigned_discs, vec![9]);
        // The tag folder survives and no artifact landed anywhere.
        assert!(job.root.join("Disc0009").is_dir());
        assert_eq!(ctx.catalog.snapshot()[0].used_bytes, 0);
    }

    #[test]
    fn needs_archiving_job_ends_as_tag_folders() {
        let dir = tempdir().unwrap();
        let mut ctx = context(dir.path(), vec![10]);
        let mut job = make_job(&ctx, "4044902");
        fs::write(job.root.join("Deliverables/print.pdf"), b"content").unwrap();

        let outcome = ctx.process_job(&mut job, &mut AssumeYes);
        assert_eq!(
            outcome,
            JobOutcome::Archived {
                discs: vec![0],
                deleted_carriers: 0
            }
        );
        assert!(job.root.join("Disc0000").is_dir());
        assert!(!job.root.join("Deliverables").exists());
        assert!(
            ctx.config
                .staging_root
                .join("Disc0000/4044902_part0.zip")
                .exists()
        );
        assert_eq!(ctx.catalog.snapshot()[0].used_bytes, 10);
    }

    #[test]
    fn multi_artifact_job_records_every_disc() {
        let dir = tempdir().unwrap();
        // Three artifacts of 60 bytes against 100-byte discs: one per disc.
        let mut ctx = context(dir.path(), vec![60, 60, 60]);
        let mut job = make_job(&ctx, "4044903");

        let outcome = ctx.process_job(&mut job, &mut AssumeYes);
        assert_eq!(
            outcome,
            JobOutcome::Archived {
                discs: vec![0, 1, 2],
                deleted_carriers: 0
            }
        );
        for disc in [0, 1, 2] {
            assert!(job.root.join(naming::disc_folder_name(disc)).is_dir());
        }
    }

    #[test]
    fn declined_deletions_leave_the_job_untouched() {
        let dir = tempdir().unwrap();
        let mut ctx = context(dir.path(), vec![10]);
        let mut job = make_job(&ctx, "4044904");
        let stale = job
            .root
            .join("Deliverables/Image_Carriers/A_other_blue.len");
        fs::create_dir_all(stale.parent().unwrap()).unwrap();
        fs::write(&stale, b"x").unwrap();

        let outcome = ctx.process_job(&mut job, &mut RefuseAll);
        assert_eq!(outcome, JobOutcome::DeletionsDeclined);
        assert!(stale.exists());
        assert_eq!(ctx.catalog.snapshot()[0].used_bytes, 0);
    }

    #[test]
    fn dry_run_mutates_nothing() {
        let dir = tempdir().unwrap();
        let mut ctx = context(dir.path(), vec![10]);
        ctx.dry_run = true;
        let mut job = make_job(&ctx, "4044905");
        let stale = job
            .root
            .join("Deliverables/Image_Carriers/A_other_blue.len");
        fs::create_dir_all(stale.parent().unwrap()).unwrap();
        fs::write(&stale, b"x").unwrap();

        let outcome = ctx.process_job(&mut job, &mut AssumeYes);
        assert_eq!(outcome, JobOutcome::Planned { would_delete: 1 });
        assert!(stale.exists());
        assert!(job.root.join("Deliverables").is_dir());
    }

    #[test]
    fn producer_failure_aborts_only_that_job() {
        let dir = tempdir().unwrap();
        let mut ctx = context(dir.path(), vec![10]);
        ctx.producer.fail = true;

        let first = make_job(&ctx, "4044906");
        let second = make_job(&ctx, "4044907");
        drop((first, second));

        let report = ctx.run_batch(
            &[JobNumber::new("4044906"), JobNumber::new("4044907")],
            &mut AssumeYes,
        );
        assert_eq!(report.jobs.len(), 2);
        assert!(report.any_failed());
        assert!(matches!(report.jobs[0].outcome, JobOutcome::Failed { .. }));
        assert!(matches!(report.jobs[1].outcome, JobOutcome::Failed { .. }));
        // Job folders survive a producer failure.
        assert!(
            JobNumber::new("4044906")
                .root_under(&ctx.config.jobs_root)
                .is_dir()
        );
    }

    #[test]
    fn trash_folder_is_emptied_before_archiving() {
        let dir = tempdir().unwrap();
        let mut ctx = context(dir.path(), vec![10]);
        let mut job = make_job(&ctx, "4044908");
        fs::create_dir_all(job.root.join("Trash")).unwrap();
        fs::write(job.root.join("Trash/old.tmp"), b"junk").unwrap();

        let outcome = ctx.process_job(&mut job, &mut AssumeYes);
        assert!(matches!(outcome, JobOutcome::Archived { .. }));
    }
}
