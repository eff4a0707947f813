//! Archive production: compress one job folder into one or more artifacts.
//!
//! The pipeline only depends on the [`ArchiveProducer`] trait; the shipped
//! implementation compresses in-process with the `zip` crate, replacing the
//! `ditto`/`zip -s` subprocess pair the operators used before. A job whose
//! compressed size reaches the split ceiling is re-cut into numbered part
//! files so no single artifact can exceed a disc.

use std::{
    fs::{self, File},
    io::{self, Read, Write},
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{info, warn};

use crate::jobs::JobNumber;

/// One compressed output unit produced from a job.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub path: PathBuf,
    /// Measured once at production time; placement moves, it never re-measures.
    pub size_bytes: u64,
    pub placed: bool,
    /// Disc number this artifact landed on, once placed.
    pub disc: Option<u32>,
}

impl Artifact {
    /// Wrap a freshly produced archive file.
    pub fn new(path: PathBuf, size_bytes: u64) -> Self {
        Self {
            path,
            size_bytes,
            placed: false,
            disc: None,
        }
    }
}

/// Errors raised while producing archives.
#[derive(Debug, Error)]
pub enum ProducerError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: io::Error,
    },
    #[error("Zip error for job {job}: {message}")]
    Zip { job: String, message: String },
    #[error("Job folder is not a directory: {0}")]
    InvalidJobRoot(PathBuf),
}

impl ProducerError {
    fn io(path: &Path, source: io::Error) -> Self {
        ProducerError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Turns a job folder into sized artifacts ready for placement.
pub trait ArchiveProducer {
    fn produce(
        &self,
        job_number: &JobNumber,
        job_root: &Path,
    ) -> Result<Vec<Artifact>, ProducerError>;
}

/// In-process zip producer writing into a scratch directory.
#[derive(Debug, Clone)]
pub struct ZipArchiveProducer {
    working_dir: PathBuf,
    /// A monolithic zip at or above this size gets split.
    split_threshold: u64,
    /// Maximum size of one split part.
    part_size: u64,
}

impl ZipArchiveProducer {
    pub fn new(working_dir: PathBuf, split_threshold: u64, part_size: u64) -> Self {
        Self {
            working_dir,
            split_threshold,
            part_size: part_size.max(1),
        }
    }

    fn zip_path(&self, job_number: &JobNumber) -> PathBuf {
        self.working_dir.join(format!("{job_number}.zip"))
    }

    fn split_part_path(&self, job_number: &JobNumber, part: usize) -> PathBuf {
        self.working_dir
            .join(format!("{job_number}_split.zip.{part:03}"))
    }
}

impl ArchiveProducer for ZipArchiveProducer {
    fn produce(
        &self,
        job_number: &JobNumber,
        job_root: &Path,
    ) -> Result<Vec<Artifact>, ProducerError> {
        if !job_root.is_dir() {
            return Err(ProducerError::InvalidJobRoot(job_root.to_path_buf()));
        }
        fs::create_dir_all(&self.working_dir)
            .map_err(|source| ProducerError::io(&self.working_dir, source))?;

        let zip_path = self.zip_path(job_number);
        write_job_zip(job_number, job_root, &zip_path)?;
        let size = fs::metadata(&zip_path)
            .map_err(|source| ProducerError::io(&zip_path, source))?
            .len();

        if size >= self.split_threshold {
            info!(
                job = %job_number,
                size,
                threshold = self.split_threshold,
                "Archive exceeds split ceiling, cutting into parts"
            );
            let artifacts = self.split_into_parts(job_number, &zip_path)?;
            fs::remove_file(&zip_path).map_err(|source| ProducerError::io(&zip_path, source))?;
            Ok(artifacts)
        } else {
            Ok(vec![Artifact::new(zip_path, size)])
        }
    }
}

impl ZipArchiveProducer {
    fn split_into_parts(
        &self,
        job_number: &JobNumber,
        zip_path: &Path,
    ) -> Result<Vec<Artifact>, ProducerError> {
        let mut source = File::open(zip_path).map_err(|source| ProducerError::io(zip_path, source))?;
        let mut artifacts = Vec::new();
        let mut buffer = vec![0u8; 64 * 1024];
        let mut part = 1usize;
        loop {
            let part_path = self.split_part_path(job_number, part);
            let mut written = 0u64;
            let mut out =
                File::create(&part_path).map_err(|source| ProducerError::io(&part_path, source))?;
            while written < self.part_size {
                let budget = (self.part_size - written).min(buffer.len() as u64) as usize;
                let read = source
                    .read(&mut buffer[..budget])
                    .map_err(|source| ProducerError::io(zip_path, source))?;
                if read == 0 {
                    break;
                }
                out.write_all(&buffer[..read])
                    .map_err(|source| ProducerError::io(&part_path, source))?;
                written += read as u64;
            }
            if written == 0 {
                // Nothing left for this part; drop the empty file.
                drop(out);
                let _ = fs::remove_file(&part_path);
                break;
            }
            artifacts.push(Artifact::new(part_path, written));
            part += 1;
        }
        Ok(artifacts)
    }
}

/// Compress the job tree into `zip_path`, entries rooted at the job number so
/// extraction recreates the job folder itself.
fn write_job_zip(
    job_number: &JobNumber,
    job_root: &Path,
    zip_path: &Path,
) -> Result<(), ProducerError> {
    let map_zip = |err: zip::result::ZipError| ProducerError::Zip {
        job: job_number.to_string(),
        message: err.to_string(),
    };

    let file = File::create(zip_path).map_err(|source| ProducerError::io(zip_path, source))?;
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .large_file(true);

    let mut stack = vec![job_root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(dir = %dir.display(), error = %err, "Skipping unreadable directory while zipping");
                continue;
            }
        };
        for entry_result in entries {
            let Ok(entry) = entry_result else { continue };
            let path = entry.path();
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_symlink() {
                continue;
            }
            let Some(entry_name) = zip_entry_name(job_number, job_root, &path) else {
                warn!(path = %path.display(), "Skipping non-UTF-8 path while zipping");
                continue;
            };
            if file_type.is_dir() {
                writer
                    .add_directory(entry_name.as_str(), options)
                    .map_err(map_zip)?;
                stack.push(path);
            } else if file_type.is_file() {
                writer
                    .start_file(entry_name.as_str(), options)
                    .map_err(map_zip)?;
                let mut input =
                    File::open(&path).map_err(|source| ProducerError::io(&path, source))?;
                io::copy(&mut input, &mut writer)
                    .map_err(|source| ProducerError::io(&path, source))?;
            }
        }
    }
    writer.finish().map_err(map_zip)?;
    Ok(())
}

fn zip_entry_name(job_number: &JobNumber, job_root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(job_root).ok()?;
    let mut name = job_number.to_string();
    for component in relative.components() {
        name.push('/');
        name.push_str(component.as_os_str().to_str()?);
    }
    Some(name)
}
