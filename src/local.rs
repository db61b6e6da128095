//! Local file-system operations used by the reconciler. Paths are relative to the local root
//! and `/`-separated.

use anyhow::{Context, Result, bail};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::engine::hashing::{Checksum, hash_file};
use crate::engine::tools::partial_path;
use crate::triplet::ItemKind;
use crate::utils::config::{CONFLICT_NAME_ATTEMPTS, CONFLICT_SUFFIX};

#[derive(Clone, Debug)]
pub struct LocalTree {
    root: PathBuf,
}

/// A fully written download that has not been moved into place yet.
#[derive(Debug)]
pub struct PartialFile {
    pub path: PathBuf,
    pub checksum: Checksum,
}

impl LocalTree {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn abs(&self, rel: &str) -> PathBuf {
        let mut out = self.root.clone();
        for part in rel.split('/').filter(|p| !p.is_empty()) {
            out.push(part);
        }
        out
    }

    /// True if `rel` exists and is of the given kind. Symlinks are never followed. Only
    /// not-found means absent; any other stat failure is an error.
    pub fn exists(&self, rel: &str, kind: ItemKind) -> Result<bool> {
        let path = self.abs(rel);
        match fs::symlink_metadata(&path) {
            Ok(meta) => Ok(match kind {
                ItemKind::Folder => meta.is_dir(),
                ItemKind::File => meta.is_file(),
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("examine {}", path.display())),
        }
    }

    pub fn checksum(&self, rel: &str) -> Result<Checksum> {
        hash_file(&self.abs(rel))
    }

    pub fn open(&self, rel: &str) -> Result<File> {
        let path = self.abs(rel);
        File::open(&path).with_context(|| format!("open {}", path.display()))
    }

    pub fn create_dir(&self, rel: &str) -> Result<()> {
        let path = self.abs(rel);
        fs::create_dir_all(&path).with_context(|| format!("create folder {}", path.display()))
    }

    /// Stream content into a partial file next to `rel`, hashing it on the way.
    pub fn write_partial<F>(&self, rel: &str, fill: F) -> Result<PartialFile>
    where
        F: FnOnce(&mut dyn Write) -> Result<()>,
    {
        let target = self.abs(rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create folder {}", parent.display()))?;
        }
        let partial = partial_path(&target);
        let written = (|| {
            let file = File::create(&partial)
                .with_context(|| format!("create {}", partial.display()))?;
            let mut sink = HashingWriter {
                inner: BufWriter::new(file),
                hasher: blake3::Hasher::new(),
            };
            fill(&mut sink)?;
            sink.inner.flush()?;
            let file = sink.inner.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
            Ok::<_, anyhow::Error>(*sink.hasher.finalize().as_bytes())
        })();
        match written {
            Ok(checksum) => Ok(PartialFile {
                path: partial,
                checksum,
            }),
            Err(e) => {
                let _ = fs::remove_file(&partial);
                Err(e)
            }
        }
    }

    /// Move a partial file into place, replacing any existing file.
    pub fn commit_partial(&self, partial: PartialFile, rel: &str) -> Result<Checksum> {
        let target = self.abs(rel);
        fs::rename(&partial.path, &target)
            .with_context(|| format!("move download into {}", target.display()))?;
        Ok(partial.checksum)
    }

    pub fn discard_partial(&self, partial: PartialFile) {
        if let Err(e) = fs::remove_file(&partial.path) {
            log::debug!("remove {}: {}", partial.path.display(), e);
        }
    }

    /// Remove a file or an empty folder. Already gone is fine; a non-empty folder is an error.
    pub fn delete(&self, rel: &str, kind: ItemKind) -> Result<()> {
        let path = self.abs(rel);
        let result = match kind {
            ItemKind::File => fs::remove_file(&path),
            ItemKind::Folder => fs::remove_dir(&path),
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("delete {}", path.display())),
        }
    }

    pub fn rename(&self, from: &str, to: &str) -> Result<()> {
        let (src, dst) = (self.abs(from), self.abs(to));
        fs::rename(&src, &dst)
            .with_context(|| format!("rename {} to {}", src.display(), dst.display()))
    }

    /// First free `<stem>-conflict-version[-N].<ext>` next to `rel`.
    pub fn conflict_name(&self, rel: &str) -> Result<String> {
        let (dir, name) = match rel.rsplit_once('/') {
            Some((dir, name)) => (format!("{dir}/"), name),
            None => (String::new(), rel),
        };
        let (stem, ext) = match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem, format!(".{ext}")),
            _ => (name, String::new()),
        };
        for n in 0..CONFLICT_NAME_ATTEMPTS {
            let counter = if n == 0 { String::new() } else { format!("-{n}") };
            let candidate = format!("{dir}{stem}{CONFLICT_SUFFIX}{counter}{ext}");
            if fs::symlink_metadata(self.abs(&candidate)).is_err() {
                return Ok(candidate);
            }
        }
        bail!("no free conflict name for {rel}")
    }
}

struct HashingWriter<W: Write> {
    inner: W,
    hasher: blake3::Hasher,
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
