//! Application configuration constants.
//! Tuning and thresholds in one place.

use std::sync::OnceLock;

// ---- Package / paths (from CARGO_PKG_NAME, cached) ----

/// Package-derived file names: built once from `CARGO_PKG_NAME`, then cached.
pub struct PackagePaths {
    ledger_filename: String,
    config_filename: String,
    partial_suffix: String,
}

static PACKAGE_PATHS: OnceLock<PackagePaths> = OnceLock::new();

impl PackagePaths {
    /// Build and cache names from `CARGO_PKG_NAME`. Called once on first use.
    pub fn get() -> &'static PackagePaths {
        PACKAGE_PATHS.get_or_init(|| {
            let pkg = env!("CARGO_PKG_NAME");
            PackagePaths {
                ledger_filename: format!(".{pkg}.db"),
                config_filename: format!(".{pkg}.toml"),
                partial_suffix: format!(".{pkg}-part"),
            }
        })
    }

    /// Default ledger file name, created in the local root.
    pub fn ledger_filename(&self) -> &str {
        &self.ledger_filename
    }

    pub fn config_filename(&self) -> &str {
        &self.config_filename
    }

    /// Suffix of in-progress download files (written next to the target, renamed on completion).
    pub fn partial_suffix(&self) -> &str {
        &self.partial_suffix
    }

    /// Names never synchronized: the ledger with its WAL/SHM files, the config file and
    /// partial downloads.
    pub fn reserved_patterns(&self) -> Vec<String> {
        vec![
            self.ledger_filename.clone(),
            format!("{}-wal", self.ledger_filename),
            format!("{}-shm", self.ledger_filename),
            format!("{}.tmp", self.ledger_filename),
            self.config_filename.clone(),
            format!("*{}", self.partial_suffix),
        ]
    }
}

// ---- Worker threads ----

/// Worker pool limits. Remote calls dominate item cost, so the default stays small.
#[derive(Clone, Copy, Debug)]
pub struct WorkerLimits;

impl WorkerLimits {
    pub const DEFAULT_WORKERS: usize = 4;
    pub const MAX_WORKERS: usize = 32;

    /// Clamp a requested worker count into `1..=MAX_WORKERS`.
    pub fn clamp(requested: usize) -> usize {
        requested.clamp(1, Self::MAX_WORKERS)
    }
}

// ---- Hashing ----

/// Hashing I/O thresholds and buffer sizes.
pub struct HashingConsts;

impl HashingConsts {
    /// File size above which hashing uses memory-mapped I/O (bytes). 100 MB.
    pub const HASH_MMAP_THRESHOLD: u64 = 100 * 1024 * 1024;
    /// Chunk size for reading files below mmap threshold (bytes). 1 MB.
    pub const HASH_READ_CHUNK_SIZE: usize = 1024 * 1024;
}

// ---- Queues ----

/// Capacity of the semi-triplet queue (producers → assembler) and the
/// assembled queue (assembler → workers).
pub const QUEUE_CAP: usize = 10_000;

/// Page size requested from the remote change log.
pub const CHANGE_PAGE_SIZE: usize = 500;

// ---- Conflicts ----

/// Marker inserted before the extension of a local copy renamed aside on conflict.
pub const CONFLICT_SUFFIX: &str = "-conflict-version";

/// Upper bound on `-N` counters tried when the conflict name is taken.
pub const CONFLICT_NAME_ATTEMPTS: u32 = 1000;
