//! Full-pipeline runs over realistic job trees on temp directories.

use std::{
    fs,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use tempfile::tempdir;

use discpack::allocator::DiscCatalog;
use discpack::archive::ZipArchiveProducer;
use discpack::config::RunConfig;
use discpack::jobs::JobNumber;
use discpack::pipeline::{AssumeYes, JobOutcome, RunContext};

fn test_config(base: &Path, capacity: u64) -> RunConfig {
    RunConfig {
        jobs_root: base.join("jobs"),
        staging_root: base.join("staging"),
        working_dir: Some(base.join("work")),
        disc_capacity_bytes: capacity,
        split_part_bytes: capacity / 2,
        carrier_subdir: PathBuf::from("Deliverables/Image_Carriers"),
        trash_dir_name: "Trash".into(),
    }
}

fn context(base: &Path, capacity: u64) -> RunContext<ZipArchiveProducer> {
    let config = test_config(base, capacity);
    fs::create_dir_all(&config.staging_root).unwrap();
    let mut catalog =
        DiscCatalog::scan(&config.staging_root, config.disc_capacity_bytes).unwrap();
    catalog.seed(0).unwrap();
    let producer = ZipArchiveProducer::new(
        config.working_dir().to_path_buf(),
        config.disc_capacity_bytes,
        config.split_part_bytes,
    );
    RunContext::new(config, catalog, producer)
}

fn write_aged(path: &Path, bytes: &[u8], age: Duration) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let file = fs::File::create(path).unwrap();
    drop(file);
    fs::write(path, bytes).unwrap();
    let handle = fs::File::options().write(true).open(path).unwrap();
    handle.set_modified(SystemTime::now() - age).unwrap();
}

/// Bytes that deflate cannot squeeze much, to control archive sizes.
fn incompressible(len: usize, mut seed: u64) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(len);
    for _ in 0..len {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        bytes.push((seed >> 33) as u8);
    }
    bytes
}

fn zip_entry_names(zip_path: &Path) -> Vec<String> {
    let file = fs::File::open(zip_path).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    (0..archive.len())
        .map(|index| archive.by_index(index).unwrap().name().to_string())
        .collect()
}

#[test]
fn job_is_deduplicated_archived_and_tagged() {
    let base = tempdir().unwrap();
    let mut ctx = context(base.path(), 64 * 1024);
    let number = JobNumber::new("4044906");
    let job_root = number.root_under(&ctx.config.jobs_root);
    let carriers = job_root.join("Deliverables/Image_Carriers");

    write_aged(
        &carriers.join("old/A_4044906_red.tif"),
        b"old red",
        Duration::from_secs(200),
    );
    write_aged(
        &carriers.join("new/A_4044906_red.tif"),
        b"new red",
        Duration::from_secs(100),
    );
    write_aged(
        &carriers.join("A_other_blue.len"),
        b"blue",
        Duration::from_secs(150),
    );
    write_aged(&carriers.join("B.tif"), b"short", Duration::from_secs(400));
    fs::write(job_root.join("Deliverables/sheet.pdf"), b"deliverable").unwrap();
    fs::create_dir_all(job_root.join("Trash")).unwrap();
    fs::write(job_root.join("Trash/leftover.tmp"), b"junk").unwrap();

    let report = ctx.run_batch(std::slice::from_ref(&number), &mut AssumeYes);
    assert_eq!(report.jobs.len(), 1);
    let JobOutcome::Archived {
        discs,
        deleted_carriers,
    } = &report.jobs[0].outcome
    else {
        panic!("unexpected outcome: {:?}", report.jobs[0].outcome);
    };
    assert_eq!(discs, &vec![0]);
    assert_eq!(*deleted_carriers, 2);

    // The job folder now holds nothing but the tag directory.
    let children: Vec<String> = fs::read_dir(&job_root)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(children, vec!["Disc0000".to_string()]);

    // The placed archive kept the survivors and dropped the stale renditions.
    let zip_path = ctx.config.staging_root.join("Disc0000/4044906.zip");
    assert!(zip_path.exists());
    let names = zip_entry_names(&zip_path);
    assert!(
        names
            .iter()
            .any(|name| name.ends_with("new/A_4044906_red.tif"))
    );
    assert!(names.iter().any(|name| name.ends_with("B.tif")));
    assert!(names.iter().any(|name| name.ends_with("sheet.pdf")));
    assert!(!names.iter().any(|name| name.ends_with("old/A_4044906_red.tif")));
    assert!(!names.iter().any(|name| name.ends_with("A_other_blue.len")));
    assert!(!names.iter().any(|name| name.contains("Trash")));
}

#[test]
fn second_run_recognizes_the_archive_and_touches_nothing() {
    let base = tempdir().unwrap();
    let mut ctx = context(base.path(), 64 * 1024);
    let number = JobNumber::new("4044907");
    let job_root = number.root_under(&ctx.config.jobs_root);
    fs::create_dir_all(job_root.join("Deliverables")).unwrap();
    fs::write(job_root.join("Deliverables/sheet.pdf"), b"deliverable").unwrap();

    let first = ctx.run_batch(std::slice::from_ref(&number), &mut AssumeYes);
    assert!(matches!(first.jobs[0].outcome, JobOutcome::Archived { .. }));
    let used_after_first = ctx.catalog.snapshot()[0].used_bytes;

    let second = ctx.run_batch(std::slice::from_ref(&number), &mut AssumeYes);
    assert_eq!(
        second.jobs[0].outcome,
        JobOutcome::AlreadyArchived { discs: vec![0] }
    );
    assert_eq!(ctx.catalog.snapshot()[0].used_bytes, used_after_first);
    assert_eq!(ctx.catalog.snapshot().len(), 1);
}

#[test]
fn oversized_job_splits_across_multiple_discs() {
    let base = tempdir().unwrap();
    // Tiny discs so a single real job overflows: capacity 4 KiB, parts 2 KiB.
    let mut ctx = context(base.path(), 4096);
    let number = JobNumber::new("4044908");
    let job_root = number.root_under(&ctx.config.jobs_root);
    fs::create_dir_all(job_root.join("Deliverables")).unwrap();
    fs::write(
        job_root.join("Deliverables/raster.tif"),
        incompressible(10 * 1024, 9),
    )
    .unwrap();

    let report = ctx.run_batch(std::slice::from_ref(&number), &mut AssumeYes);
    let JobOutcome::Archived { discs, .. } = &report.jobs[0].outcome else {
        panic!("unexpected outcome: {:?}", report.jobs[0].outcome);
    };
    assert!(discs.len() > 1, "expected the job to span discs, got {discs:?}");

    // One tag folder per disc the parts landed on.
    for disc in discs {
        assert!(job_root.join(format!("Disc{disc:04}")).is_dir());
    }
    // Every produced part ended up inside some disc folder.
    let snapshot = ctx.catalog.snapshot();
    let mut part_count = 0;
    for disc in &snapshot {
        part_count += fs::read_dir(&disc.path)
            .unwrap()
            .filter(|entry| {
                entry
                    .as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .contains("_split.zip")
            })
            .count();
    }
    assert!(part_count > 1);
    // Scratch space is clean: nothing left behind in the working dir.
    let leftovers: Vec<_> = fs::read_dir(ctx.config.working_dir()).unwrap().collect();
    assert!(leftovers.is_empty(), "working dir not empty: {leftovers:?}");
}

#[test]
fn catalog_state_survives_across_separate_runs() {
    let base = tempdir().unwrap();
    let capacity = 64 * 1024;

    let number_a = JobNumber::new("4044901");
    let number_b = JobNumber::new("4044902");
    for number in [&number_a, &number_b] {
        let job_root = number.root_under(&base.path().join("jobs"));
        fs::create_dir_all(job_root.join("Deliverables")).unwrap();
        fs::write(job_root.join("Deliverables/sheet.pdf"), b"deliverable").unwrap();
    }

    let mut first = context(base.path(), capacity);
    let report = first.run_batch(std::slice::from_ref(&number_a), &mut AssumeYes);
    assert!(matches!(report.jobs[0].outcome, JobOutcome::Archived { .. }));
    let used = first.catalog.snapshot()[0].used_bytes;
    drop(first);

    // A fresh scan of the same staging root sees the fill level on disk.
    let config = test_config(base.path(), capacity);
    let catalog = DiscCatalog::scan(&config.staging_root, capacity).unwrap();
    assert!(!catalog.is_empty());
    assert_eq!(catalog.snapshot()[0].used_bytes, used);

    let producer = ZipArchiveProducer::new(
        config.working_dir().to_path_buf(),
        capacity,
        config.split_part_bytes,
    );
    let mut second = RunContext::new(config, catalog, producer);
    let report = second.run_batch(std::slice::from_ref(&number_b), &mut AssumeYes);
    assert!(matches!(report.jobs[0].outcome, JobOutcome::Archived { .. }));
    assert!(second.catalog.snapshot()[0].used_bytes > used);
}

#[test]
fn missing_job_folder_is_ignored_not_fatal() {
    let base = tempdir().unwrap();
    let mut ctx = context(base.path(), 64 * 1024);

    let report = ctx.run_batch(
        &[JobNumber::new("9999999"), JobNumber::new("4044903")],
        &mut AssumeYes,
    );
    assert!(matches!(
        report.jobs[0].outcome,
        JobOutcome::Ignored { .. }
    ));
    // The second (also missing) job is still processed independently.
    assert_eq!(report.jobs.len(), 2);
    assert!(!report.any_failed());
}
