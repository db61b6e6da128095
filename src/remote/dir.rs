//! Remote repository backed by a plain directory (mounted share, second disk, test fixture).
//!
//! Has no change history: the change token is a fingerprint of the whole tree, so
//! `changes_since` can only say "nothing changed" or "ask for a full crawl".

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

use blake3::Hasher;
use walkdir::WalkDir;

use super::{ChangePage, RemoteError, RemoteObject, RemoteRepository};
use crate::engine::tools::{partial_path, path_relative_to, path_to_db_string};
use crate::triplet::ItemKind;
use crate::utils::config::PackagePaths;

pub struct DirRemote {
    root: PathBuf,
}

impl DirRemote {
    pub fn new(root: &Path) -> Result<Self, RemoteError> {
        let meta = fs::metadata(root)?;
        if !meta.is_dir() {
            return Err(RemoteError::InvalidPath(root.display().to_string()));
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Map a remote path under the backing directory. Rejects `..` and drive prefixes.
    fn fs_path(&self, remote_path: &str) -> Result<PathBuf, RemoteError> {
        let mut out = self.root.clone();
        for component in Path::new(remote_path).components() {
            match component {
                Component::Normal(part) => out.push(part),
                Component::RootDir | Component::CurDir => continue,
                Component::ParentDir | Component::Prefix(_) => {
                    return Err(RemoteError::InvalidPath(remote_path.to_string()));
                }
            }
        }
        Ok(out)
    }

    fn remote_path_of(&self, fs_path: &Path) -> String {
        let rel = path_relative_to(fs_path, &self.root)
            .map(|p| path_to_db_string(&p))
            .unwrap_or_default();
        format!("/{rel}")
    }

    fn object_at(&self, remote_path: &str, fs_path: &Path) -> Result<RemoteObject, RemoteError> {
        let meta = fs::metadata(fs_path).map_err(|e| not_found_or_io(remote_path, e))?;
        let kind = ItemKind::from_is_dir(meta.is_dir());
        let normalized = self.remote_path_of(fs_path);
        Ok(RemoteObject {
            id: normalized.clone(),
            path: normalized,
            kind,
            mtime_ns: match kind {
                ItemKind::File => Some(mtime_ns(&meta)),
                ItemKind::Folder => None,
            },
        })
    }

    /// Write `content` to a partial file next to `target`, then rename it into place.
    fn write_atomic(&self, target: &Path, content: &mut dyn Read) -> Result<(), RemoteError> {
        let partial = partial_path(target);
        let result = (|| {
            let mut file = File::create(&partial)?;
            io::copy(content, &mut file)?;
            file.sync_all()?;
            fs::rename(&partial, target)
        })();
        if result.is_err() {
            let _ = fs::remove_file(&partial);
        }
        result.map_err(RemoteError::from)
    }

    fn ensure_parent(&self, remote_path: &str, target: &Path) -> Result<(), RemoteError> {
        match target.parent() {
            Some(parent) if parent.is_dir() => Ok(()),
            _ => Err(RemoteError::NotFound(format!("parent of {remote_path}"))),
        }
    }
}

fn is_partial(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(PackagePaths::get().partial_suffix()))
}

fn mtime_ns(meta: &fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

fn not_found_or_io(remote_path: &str, e: io::Error) -> RemoteError {
    if e.kind() == io::ErrorKind::NotFound {
        RemoteError::NotFound(remote_path.to_string())
    } else {
        RemoteError::Io(e)
    }
}

impl RemoteRepository for DirRemote {
    fn get_object(&self, path: &str) -> Result<RemoteObject, RemoteError> {
        let fs_path = self.fs_path(path)?;
        self.object_at(path, &fs_path)
    }

    fn list_children(&self, folder: &str) -> Result<Vec<RemoteObject>, RemoteError> {
        let dir = self.fs_path(folder)?;
        let mut out = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| not_found_or_io(folder, e))? {
            let entry = entry?;
            let path = entry.path();
            if is_partial(&path) {
                continue;
            }
            let remote_path = self.remote_path_of(&path);
            match self.object_at(&remote_path, &path) {
                Ok(obj) => out.push(obj),
                // Removed between read_dir and stat.
                Err(RemoteError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    fn create_folder(&self, path: &str) -> Result<RemoteObject, RemoteError> {
        let target = self.fs_path(path)?;
        self.ensure_parent(path, &target)?;
        match fs::create_dir(&target) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && target.is_dir() => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(RemoteError::AlreadyExists(path.to_string()));
            }
            Err(e) => return Err(e.into()),
        }
        self.object_at(path, &target)
    }

    fn create_document(
        &self,
        path: &str,
        content: &mut dyn Read,
    ) -> Result<RemoteObject, RemoteError> {
        let target = self.fs_path(path)?;
        self.ensure_parent(path, &target)?;
        if target.exists() {
            return Err(RemoteError::AlreadyExists(path.to_string()));
        }
        self.write_atomic(&target, content)?;
        self.object_at(path, &target)
    }

    fn update_document(
        &self,
        path: &str,
        content: &mut dyn Read,
    ) -> Result<RemoteObject, RemoteError> {
        let target = self.fs_path(path)?;
        if !target.is_file() {
            return Err(RemoteError::NotFound(path.to_string()));
        }
        self.write_atomic(&target, content)?;
        self.object_at(path, &target)
    }

    fn download(&self, path: &str, sink: &mut dyn Write) -> Result<(), RemoteError> {
        let source = self.fs_path(path)?;
        let mut file = File::open(&source).map_err(|e| not_found_or_io(path, e))?;
        io::copy(&mut file, sink)?;
        Ok(())
    }

    fn delete_object(&self, path: &str) -> Result<(), RemoteError> {
        let target = self.fs_path(path)?;
        let meta = fs::symlink_metadata(&target).map_err(|e| not_found_or_io(path, e))?;
        if meta.is_dir() {
            fs::remove_dir(&target)?;
        } else {
            fs::remove_file(&target)?;
        }
        Ok(())
    }

    fn latest_change_token(&self) -> Result<String, RemoteError> {
        let mut hasher = Hasher::new();
        for entry in WalkDir::new(&self.root).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| RemoteError::Transient(e.to_string()))?;
            if is_partial(entry.path()) {
                continue;
            }
            let meta = entry
                .metadata()
                .map_err(|e| RemoteError::Transient(e.to_string()))?;
            hasher.update(self.remote_path_of(entry.path()).as_bytes());
            hasher.update(&[u8::from(meta.is_dir())]);
            if meta.is_file() {
                hasher.update(&mtime_ns(&meta).to_le_bytes());
                hasher.update(&meta.len().to_le_bytes());
            }
        }
        Ok(hasher.finalize().to_hex().to_string())
    }

    fn changes_since(&self, token: &str, _max_items: usize) -> Result<ChangePage, RemoteError> {
        let current = self.latest_change_token()?;
        if token != current {
            return Err(RemoteError::TokenUnknown);
        }
        Ok(ChangePage {
            changes: Vec::new(),
            next_token: current,
            has_more: false,
        })
    }
}
