//! Content checksums shared by the local crawl, downloads and the ledger.

use anyhow::{Context, Result};
use blake3::Hasher;
use memmap2::Mmap;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use crate::utils::config::HashingConsts;

/// Content checksum stored in the ledger and compared against the local file.
pub type Checksum = [u8; 32];

/// blake3 of a file's content. Large files are memory-mapped, small ones streamed through a
/// buffered reader.
pub fn hash_file(path: &Path) -> Result<Checksum> {
    let file = File::open(path).with_context(|| format!("open {} for hashing", path.display()))?;
    let size = file.metadata().map(|m| m.len()).unwrap_or(0);
    let mut hasher = Hasher::new();

    if size > HashingConsts::HASH_MMAP_THRESHOLD {
        // SAFETY: read-only map; a concurrent writer can only change the resulting digest.
        let mmap = unsafe { Mmap::map(&file) }
            .with_context(|| format!("map {}", path.display()))?;
        hasher.update(&mmap);
    } else {
        let mut reader = BufReader::with_capacity(HashingConsts::HASH_READ_CHUNK_SIZE, file);
        io::copy(&mut reader, &mut hasher)
            .with_context(|| format!("read {}", path.display()))?;
    }

    Ok(*hasher.finalize().as_bytes())
}

/// Hash an in-memory buffer the same way [`hash_file`] hashes a file.
pub fn hash_bytes(bytes: &[u8]) -> Checksum {
    *blake3::hash(bytes).as_bytes()
}

/// Stored BLOB as a checksum; None unless it is exactly 32 bytes.
pub fn checksum_from_blob(blob: Option<Vec<u8>>) -> Option<Checksum> {
    blob?.as_slice().try_into().ok()
}
