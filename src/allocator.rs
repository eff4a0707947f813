//! Disc catalog and first-fit artifact placement.
//!
//! Discs fill in numeric order: an artifact goes to the first (lowest
//! numbered) disc with room, even when a later disc has a tighter fit.
//! Operators burn discs in sequence and expect them to fill the same way.
//! The catalog is the only shared mutable state of a run and is mutated
//! exclusively through [`DiscCatalog::try_place`].

use std::{
    fs,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{info, warn};

use crate::archive::Artifact;
use crate::fs_scan::{self, FsError};
use crate::naming;

/// One capacity-bounded destination folder.
#[derive(Debug, Clone)]
struct Disc {
    number: u32,
    path: PathBuf,
    used_bytes: u64,
    capacity_bytes: u64,
}

impl Disc {
    /// Full once used bytes reach capacity; never reverts during a run.
    fn is_full(&self) -> bool {
        self.used_bytes >= self.capacity_bytes
    }

    fn has_room_for(&self, size: u64) -> bool {
        // Strictly less than: an artifact that would exactly fill the disc
        // does not fit.
        self.used_bytes + size < self.capacity_bytes
    }
}

/// Read-only view of one disc for reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscInfo {
    pub number: u32,
    pub path: PathBuf,
    pub used_bytes: u64,
    pub capacity_bytes: u64,
    pub is_full: bool,
}

/// Errors raised while seeding the catalog or placing artifacts.
#[derive(Debug, Error)]
pub enum AllocError {
    #[error("Artifact {path} ({size} bytes) exceeds disc capacity ({capacity} bytes)")]
    ArtifactTooLarge {
        path: PathBuf,
        size: u64,
        capacity: u64,
    },
    #[error("Artifact {0} was already placed")]
    AlreadyPlaced(PathBuf),
    #[error("No discs exist; seed the catalog with a starting disc number")]
    EmptyCatalog,
    #[error("Disc {number} already exists in the catalog")]
    DiscExists { number: u32 },
    #[error("Failed to create disc folder {path}: {source}")]
    CreateDisc {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Fs(#[from] FsError),
}

/// Ordered catalog of discs under one staging root.
#[derive(Debug)]
pub struct DiscCatalog {
    staging_root: PathBuf,
    capacity_bytes: u64,
    /// Ascending by disc number.
    discs: Vec<Disc>,
}

impl DiscCatalog {
    /// Build the catalog by scanning the staging root for existing disc
    /// folders and sizing each from disk.
    ///
    /// The catalog is never assumed empty in a long-lived deployment; sizes
    /// carry over from whatever previous runs left behind.
    pub fn scan(staging_root: &Path, capacity_bytes: u64) -> Result<Self, AllocError> {
        let mut discs = Vec::new();
        for child in fs_scan::list_children(staging_root)? {
            if !child.is_dir {
                continue;
            }
            let Some(number) = naming::parse_disc_folder(&child.name) else {
                continue;
            };
            let path = staging_root.join(&child.name);
            let used_bytes = match fs_scan::tree_size_bytes(&path) {
                Ok(size) => size,
                Err(err) => {
                    warn!(disc = number, error = %err, "Failed to size disc folder, assuming full");
                    capacity_bytes
                }
            };
            discs.push(Disc {
                number,
                path,
                used_bytes,
                capacity_bytes,
            });
        }
        discs.sort_by_key(|disc| disc.number);
        Ok(Self {
            staging_root: staging_root.to_path_buf(),
            capacity_bytes,
            discs,
        })
    }

    /// Cold-start seeding: create the first disc folder with an operator
    /// supplied number.
    pub fn seed(&mut self, start_number: u32) -> Result<(), AllocError> {
        if self.discs.iter().any(|disc| disc.number == start_number) {
            return Err(AllocError::DiscExists {
                number: start_number,
            });
        }
        let disc = self.create_disc(start_number)?;
        self.discs.push(disc);
        self.discs.sort_by_key(|disc| disc.number);
        Ok(())
    }

    /// True when scanning found no disc folders at all.
    pub fn is_empty(&self) -> bool {
        self.discs.is_empty()
    }

    /// Place `artifact` into the first disc with room, creating the next
    /// disc on demand. Physically moves the artifact file before returning
    /// the receiving disc number.
    pub fn try_place(&mut self, artifact: &mut Artifact) -> Result<u32, AllocError> {
        if artifact.placed {
            return Err(AllocError::AlreadyPlaced(artifact.path.clone()));
        }
        if artifact.size_bytes >= self.capacity_bytes {
            // Would not fit even an empty disc; fatal for this artifact.
            return Err(AllocError::ArtifactTooLarge {
                path: artifact.path.clone(),
                size: artifact.size_bytes,
                capacity: self.capacity_bytes,
            });
        }
        let last = self.discs.last().ok_or(AllocError::EmptyCatalog)?;
        let next_number = last.number + 1;

        let index = match self
            .discs
            .iter()
            .position(|disc| disc.has_room_for(artifact.size_bytes))
        {
            Some(index) => index,
            None => {
                let disc = self.create_disc(next_number)?;
                info!(disc = next_number, "All discs full, created a new one");
                self.discs.push(disc);
                self.discs.len() - 1
            }
        };
        self.place_into(index, artifact)
    }

    /// Read-only view of the catalog for reporting.
    pub fn snapshot(&self) -> Vec<DiscInfo> {
        self.discs
            .iter()
            .map(|disc| DiscInfo {
                number: disc.number,
                path: disc.path.clone(),
                used_bytes: disc.used_bytes,
                capacity_bytes: disc.capacity_bytes,
                is_full: disc.is_full(),
            })
            .collect()
    }

    fn create_disc(&self, number: u32) -> Result<Disc, AllocError> {
        let path = naming::disc_path(&self.staging_root, number);
        fs::create_dir_all(&path).map_err(|source| AllocError::CreateDisc {
            path: path.clone(),
            source,
        })?;
        Ok(Disc {
            number,
            path,
            used_bytes: 0,
            capacity_bytes: self.capacity_bytes,
        })
    }

    fn place_into(&mut self, index: usize, artifact: &mut Artifact) -> Result<u32, AllocError> {
        let disc = &mut self.discs[index];
        let file_name = artifact
            .path
            .file_name()
            .map(|name| name.to_owned())
            .unwrap_or_else(|| "artifact".into());
        let destination = disc.path.join(file_name);
        fs_scan::move_file(&artifact.path, &destination)?;
        disc.used_bytes += artifact.size_bytes;
        artifact.path = destination;
        artifact.placed = true;
        artifact.disc = Some(disc.number);
        info!(
            disc = disc.number,
            artifact = %artifact.path.display(),
            used = disc.used_bytes,
            "Placed artifact"
        );
        Ok(disc.number)
    }
}
