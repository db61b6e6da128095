//! Triplet model: local, remote and ledger state of one item, and the predicates that drive
//! every reconciliation decision.

pub mod factory;

pub use factory::TripletFactory;

use std::path::PathBuf;
use std::sync::OnceLock;

use serde::Serialize;

use crate::engine::hashing::{Checksum, hash_file};
use crate::remote::RemoteObject;

/// File or folder. Folders compare by path only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    File,
    Folder,
}

impl ItemKind {
    pub fn is_folder(self) -> bool {
        matches!(self, ItemKind::Folder)
    }

    pub fn from_is_dir(is_dir: bool) -> Self {
        if is_dir {
            ItemKind::Folder
        } else {
            ItemKind::File
        }
    }
}

/// Snapshot of an item on the local disk.
#[derive(Clone, Debug)]
pub struct LocalState {
    pub root: PathBuf,
    /// `/`-separated, relative to `root`, no trailing separator.
    pub rel_path: String,
    pub kind: ItemKind,
    checksum: OnceLock<Option<Checksum>>,
}

impl LocalState {
    pub fn new(root: PathBuf, rel_path: impl Into<String>, kind: ItemKind) -> Self {
        Self {
            root,
            rel_path: rel_path.into(),
            kind,
            checksum: OnceLock::new(),
        }
    }

    /// Snapshot whose checksum is already known (e.g. just written by a download).
    pub fn with_checksum(self, checksum: Checksum) -> Self {
        let _ = self.checksum.set(Some(checksum));
        self
    }

    pub fn abs_path(&self) -> PathBuf {
        let mut out = self.root.clone();
        for part in self.rel_path.split('/').filter(|p| !p.is_empty()) {
            out.push(part);
        }
        out
    }

    /// Content checksum, computed on first use. Always None for folders; None when the file
    /// cannot be read.
    pub fn checksum(&self) -> Option<Checksum> {
        if self.kind.is_folder() {
            return None;
        }
        *self.checksum.get_or_init(|| match hash_file(&self.abs_path()) {
            Ok(h) => Some(h),
            Err(e) => {
                log::warn!("cannot checksum {}: {:#}", self.rel_path, e);
                None
            }
        })
    }
}

/// Snapshot of an item in the remote repository.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteState {
    /// Remote folder mirrored by the local root.
    pub root: String,
    /// `/`-separated, relative to `root`, no trailing separator.
    pub rel_path: String,
    pub object: RemoteObject,
}

impl RemoteState {
    /// Last modification time (files only).
    pub fn mtime_ns(&self) -> Option<i64> {
        match self.object.kind {
            ItemKind::File => self.object.mtime_ns,
            ItemKind::Folder => None,
        }
    }
}

/// Last synchronized state recorded in the ledger. Both paths are always resolved; a row
/// with only one side known is not represented at all.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerState {
    pub local_rel: String,
    pub remote_rel: String,
    pub kind: ItemKind,
    pub checksum: Option<Checksum>,
    pub remote_mtime: Option<i64>,
}

/// Side of a semi-triplet that has not been looked at yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Local,
    Remote,
}

/// The triplet: one item's local, remote and ledger state.
#[derive(Clone, Debug)]
pub struct SyncItem {
    /// Identity: remote-relative path, trailing `/` for folders.
    pub name: String,
    pub kind: ItemKind,
    pub local: Option<LocalState>,
    pub remote: Option<RemoteState>,
    pub ledger: Option<LedgerState>,
    /// Set when a folder delete is parked until the rest of the pass has run.
    pub delayed: bool,
    pending: Option<Side>,
    /// Local spelling of an item the ledger has no row for, derived from a recorded ancestor.
    planned_local: Option<String>,
}

impl SyncItem {
    pub(crate) fn semi(
        name: String,
        kind: ItemKind,
        local: Option<LocalState>,
        remote: Option<RemoteState>,
        ledger: Option<LedgerState>,
        pending: Option<Side>,
    ) -> Self {
        Self {
            name,
            kind,
            local,
            remote,
            ledger,
            delayed: false,
            pending,
            planned_local: None,
        }
    }

    /// Fully resolved triplet (used by tests and by callers that already know every side).
    pub fn new(
        name: impl Into<String>,
        kind: ItemKind,
        local: Option<LocalState>,
        remote: Option<RemoteState>,
        ledger: Option<LedgerState>,
    ) -> Self {
        Self::semi(name.into(), kind, local, remote, ledger, None)
    }

    /// The side still to be resolved, or None once the triplet is complete.
    pub fn pending_side(&self) -> Option<Side> {
        self.pending
    }

    pub fn is_complete(&self) -> bool {
        self.pending.is_none()
    }

    /// Attach the remote side (None means confirmed absent).
    pub fn resolve_remote(&mut self, remote: Option<RemoteState>) {
        self.remote = remote;
        if self.pending == Some(Side::Remote) {
            self.pending = None;
        }
    }

    /// Attach the local side (None means confirmed absent).
    pub fn resolve_local(&mut self, local: Option<LocalState>) {
        self.local = local;
        if self.pending == Some(Side::Local) {
            self.pending = None;
        }
    }

    pub(crate) fn with_planned_local(mut self, local_rel: String) -> Self {
        self.planned_local = Some(local_rel);
        self
    }

    /// Identity without the folder marker, usable as a relative path.
    pub fn rel_name(&self) -> &str {
        self.name.trim_end_matches('/')
    }

    /// Where this item lives (or should live) on disk: the local snapshot, then the ledger,
    /// then the path grafted under a recorded ancestor, then the identity.
    pub fn local_target(&self) -> &str {
        if let Some(local) = &self.local {
            return &local.rel_path;
        }
        if let Some(ledger) = &self.ledger {
            return &ledger.local_rel;
        }
        if let Some(planned) = &self.planned_local {
            return planned;
        }
        self.rel_name()
    }

    /// Where this item lives (or should live) in the remote repository, relative to its root.
    pub fn remote_target(&self) -> &str {
        if let Some(remote) = &self.remote {
            return &remote.rel_path;
        }
        if let Some(ledger) = &self.ledger {
            return &ledger.remote_rel;
        }
        self.rel_name()
    }

    pub fn local_matches_ledger(&self) -> bool {
        match (&self.local, &self.ledger) {
            (None, None) => true,
            (Some(local), Some(ledger)) => {
                if local.rel_path != ledger.local_rel {
                    return false;
                }
                match self.kind {
                    ItemKind::Folder => true,
                    ItemKind::File => local
                        .checksum()
                        .is_some_and(|sum| Some(sum) == ledger.checksum),
                }
            }
            _ => false,
        }
    }

    pub fn remote_matches_ledger(&self) -> bool {
        match (&self.remote, &self.ledger) {
            (None, None) => true,
            (Some(remote), Some(ledger)) => {
                if remote.rel_path != ledger.remote_rel {
                    return false;
                }
                match self.kind {
                    ItemKind::Folder => true,
                    ItemKind::File => remote.mtime_ns() == ledger.remote_mtime,
                }
            }
            _ => false,
        }
    }
}
