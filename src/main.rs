#![deny(warnings)]

//! Batch shell around the archiving pipeline.
//!
//! Everything interactive lives here: argument parsing, the cold-start disc
//! prompt, and the deletion confirmation loop. The core stays prompt-free.

use std::{
    io::{BufRead, Write},
    path::PathBuf,
    process::ExitCode,
};

use discpack::allocator::DiscCatalog;
use discpack::archive::ZipArchiveProducer;
use discpack::config::{self, RunConfig};
use discpack::jobs::{self, JobNumber};
use discpack::logging;
use discpack::pipeline::{AssumeYes, ConfirmationProvider, JobOutcome, RunContext, RunReport};

const USAGE: &str = "Usage: discpack [--dry-run] [--yes] [--seed-disc N] [--config PATH] <manifest> [job-number...]";

struct Options {
    dry_run: bool,
    assume_yes: bool,
    seed_disc: Option<u32>,
    config_path: Option<PathBuf>,
    manifest: Option<PathBuf>,
    extra_jobs: Vec<JobNumber>,
}

fn main() -> ExitCode {
    if let Err(err) = logging::init() {
        eprintln!("Logging disabled: {err}");
    }

    let options = match parse_args(std::env::args().skip(1)) {
        Ok(options) => options,
        Err(message) => {
            eprintln!("{message}");
            if message != USAGE {
                eprintln!("{USAGE}");
            }
            return ExitCode::FAILURE;
        }
    };

    match run(options) {
        Ok(report) => {
            if report.any_failed() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Options, String> {
    let mut options = Options {
        dry_run: false,
        assume_yes: false,
        seed_disc: None,
        config_path: None,
        manifest: None,
        extra_jobs: Vec::new(),
    };
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--dry-run" => options.dry_run = true,
            "--yes" | "-y" => options.assume_yes = true,
            "--seed-disc" => {
                let value = args.next().ok_or("--seed-disc requires a number")?;
                let number = value
                    .parse()
                    .map_err(|_| format!("Invalid disc number: {value}"))?;
                options.seed_disc = Some(number);
            }
            "--config" => {
                let value = args.next().ok_or("--config requires a path")?;
                options.config_path = Some(PathBuf::from(value));
            }
            "--help" | "-h" => return Err(USAGE.to_string()),
            _ if options.manifest.is_none() => options.manifest = Some(PathBuf::from(arg)),
            _ => options.extra_jobs.push(JobNumber::new(arg)),
        }
    }
    if options.manifest.is_none() && options.extra_jobs.is_empty() {
        return Err("A job manifest is required".to_string());
    }
    Ok(options)
}

fn run(options: Options) -> Result<RunReport, String> {
    let config = load_config(options.config_path.as_deref())?;
    let numbers = collect_jobs(&options)?;
    if numbers.is_empty() {
        return Err("No jobs to process".to_string());
    }

    std::fs::create_dir_all(&config.staging_root)
        .map_err(|err| format!("Cannot prepare staging root: {err}"))?;
    let mut catalog = DiscCatalog::scan(&config.staging_root, config.disc_capacity_bytes)
        .map_err(|err| format!("Cannot scan staging root: {err}"))?;
    if catalog.is_empty() {
        let start = match options.seed_disc {
            Some(number) => number,
            None => prompt_starting_disc()?,
        };
        catalog
            .seed(start)
            .map_err(|err| format!("Cannot seed disc catalog: {err}"))?;
    }

    let producer = ZipArchiveProducer::new(
        config.working_dir().to_path_buf(),
        config.disc_capacity_bytes,
        config.split_part_bytes,
    );
    let mut context = RunContext::new(config, catalog, producer);
    context.dry_run = options.dry_run;

    let report = if options.assume_yes || options.dry_run {
        context.run_batch(&numbers, &mut AssumeYes)
    } else {
        context.run_batch(&numbers, &mut StdinConfirm)
    };

    render_report(&report, &context);
    Ok(report)
}

fn load_config(path: Option<&std::path::Path>) -> Result<RunConfig, String> {
    let result = match path {
        Some(path) => config::load_from_path(path),
        None => config::load_or_default(),
    };
    result.map_err(|err| format!("Cannot load configuration: {err}"))
}

fn collect_jobs(options: &Options) -> Result<Vec<JobNumber>, String> {
    let mut numbers = Vec::new();
    if let Some(manifest) = &options.manifest {
        let text = std::fs::read_to_string(manifest)
            .map_err(|err| format!("Cannot read manifest {}: {err}", manifest.display()))?;
        numbers = jobs::parse_manifest(&text);
    }
    for number in &options.extra_jobs {
        if !numbers.contains(number) {
            numbers.push(number.clone());
        }
    }
    Ok(numbers)
}

fn prompt_starting_disc() -> Result<u32, String> {
    let stdin = std::io::stdin();
    loop {
        print!("No disc folders found. Enter a starting disc number: ");
        std::io::stdout().flush().ok();
        let mut line = String::new();
        let read = stdin
            .lock()
            .read_line(&mut line)
            .map_err(|err| format!("Cannot read from stdin: {err}"))?;
        if read == 0 {
            return Err("No starting disc number supplied".to_string());
        }
        match line.trim().parse() {
            Ok(number) => return Ok(number),
            Err(_) => eprintln!("Disc number is invalid, please enter an integer."),
        }
    }
}

/// Interactive confirmation of each job's deletion plan.
struct StdinConfirm;

impl ConfirmationProvider for StdinConfirm {
    fn confirm_deletions(&mut self, job: &JobNumber, paths: &[std::path::PathBuf]) -> bool {
        println!("Job {job}: {} carrier file(s) slated for deletion:", paths.len());
        for path in paths {
            println!("  {}", path.display());
        }
        loop {
            print!("Delete these files? [y/n]: ");
            std::io::stdout().flush().ok();
            let mut line = String::new();
            if std::io::stdin().lock().read_line(&mut line).is_err() || line.is_empty() {
                return false;
            }
            match line.trim().to_ascii_lowercase().as_str() {
                "y" | "yes" => return true,
                "n" | "no" => return false,
                _ => eprintln!("Please answer y or n."),
            }
        }
    }
}

fn render_report(report: &RunReport, context: &RunContext<ZipArchiveProducer>) {
    for job in &report.jobs {
        match &job.outcome {
            JobOutcome::AlreadyArchived { discs } => {
                println!("{}: already archived on discs {discs:?}", job.number);
            }
            JobOutcome::Archived {
                discs,
                deleted_carriers,
            } => {
                println!(
                    "{}: archived to discs {discs:?} ({deleted_carriers} carrier file(s) pruned)",
                    job.number
                );
            }
            JobOutcome::Ignored { reason } => {
                println!("{}: ignored ({reason})", job.number);
            }
            JobOutcome::DeletionsDeclined => {
                println!("{}: skipped, deletion plan declined", job.number);
            }
            JobOutcome::Planned { would_delete } => {
                println!(
                    "{}: dry run, would delete {would_delete} carrier file(s)",
                    job.number
                );
            }
            JobOutcome::Failed { error } => {
                println!("{}: FAILED ({error})", job.number);
            }
        }
    }
    println!("Disc catalog:");
    for disc in context.catalog.snapshot() {
        println!(
            "  Disc {:04}: {} / {} bytes{}",
            disc.number,
            disc.used_bytes,
            disc.capacity_bytes,
            if disc.is_full { " (full)" } else { "" }
        );
    }
}
