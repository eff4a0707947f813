//! Library exports for reuse in the shell binary and tests.
/// Disc catalog and first-fit placement.
pub mod allocator;
/// Application directory helpers.
pub mod app_dirs;
/// Archive production and artifacts.
pub mod archive;
/// Run configuration.
pub mod config;
/// Filesystem inspection helpers.
pub mod fs_scan;
/// Job identity, classification and dedup.
pub mod jobs;
/// Logging setup.
pub mod logging;
/// On-disk naming conventions.
pub mod naming;
/// Per-job orchestration.
pub mod pipeline;
