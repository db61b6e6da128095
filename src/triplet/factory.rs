//! Builds semi-triplets from each producer's view and completes missing local sides.
//!
//! Identity is the remote-relative path: an item seen locally takes the remote path the ledger
//! maps it to. An item the ledger does not know keeps the spelling of its nearest recorded
//! ancestor folder on the other side, so `Docs/new.txt` under a `Docs` <-> `docs` row is
//! `docs/new.txt` remotely.

use anyhow::{Result, anyhow};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{ItemKind, LedgerState, LocalState, RemoteState, Side, SyncItem};
use crate::engine::tools::{item_name, strip_remote_root};
use crate::ledger::{Ledger, LedgerRow};
use crate::local::LocalTree;
use crate::remote::RemoteObject;

#[derive(Clone)]
pub struct TripletFactory {
    local_root: PathBuf,
    remote_root: String,
    ledger: Arc<dyn Ledger>,
}

impl TripletFactory {
    pub fn new(local_root: &Path, remote_root: &str, ledger: Arc<dyn Ledger>) -> Self {
        Self {
            local_root: local_root.to_path_buf(),
            remote_root: remote_root.to_string(),
            ledger,
        }
    }

    pub fn remote_root(&self) -> &str {
        &self.remote_root
    }

    /// Item found on disk during the local crawl. Remote side is pending.
    pub fn from_local_path(&self, rel_path: &str, kind: ItemKind) -> Result<SyncItem> {
        let ledger = self.ledger_from_local(rel_path, kind)?;
        let name = match &ledger {
            Some(state) => item_name(&state.remote_rel, kind),
            None => item_name(&self.graft_remote(rel_path)?, kind),
        };
        let local = LocalState::new(self.local_root.clone(), rel_path, kind);
        Ok(SyncItem::semi(
            name,
            kind,
            Some(local),
            None,
            ledger,
            Some(Side::Remote),
        ))
    }

    /// Item seen in the remote repository (crawl or change log). Local side is pending.
    pub fn from_remote_object(&self, object: RemoteObject) -> Result<SyncItem> {
        let rel = strip_remote_root(&self.remote_root, &object.path).ok_or_else(|| {
            anyhow!(
                "remote object {} lies outside {}",
                object.path,
                self.remote_root
            )
        })?;
        let kind = object.kind;
        let ledger = self.ledger_from_remote(&rel, kind)?;
        let planned = match &ledger {
            Some(_) => None,
            None => Some(self.graft_local(&rel)?),
        };
        let remote = RemoteState {
            root: self.remote_root.clone(),
            rel_path: rel.clone(),
            object,
        };
        let item = SyncItem::semi(
            item_name(&rel, kind),
            kind,
            None,
            Some(remote),
            ledger,
            Some(Side::Local),
        );
        Ok(match planned {
            Some(local_rel) => item.with_planned_local(local_rel),
            None => item,
        })
    }

    /// Item the change log reports as deleted remotely. Remote side is known absent, local
    /// side is pending.
    pub fn from_remote_deletion(&self, remote_rel: &str, kind: ItemKind) -> Result<SyncItem> {
        let ledger = self.ledger_from_remote(remote_rel, kind)?;
        let planned = match &ledger {
            Some(_) => None,
            None => Some(self.graft_local(remote_rel)?),
        };
        let item = SyncItem::semi(
            item_name(remote_rel, kind),
            kind,
            None,
            None,
            ledger,
            Some(Side::Local),
        );
        Ok(match planned {
            Some(local_rel) => item.with_planned_local(local_rel),
            None => item,
        })
    }

    /// Ledger row whose local path no longer exists. Local side is known absent, remote side is
    /// pending.
    pub fn from_ledger_row(&self, row: &LedgerRow) -> SyncItem {
        let ledger = LedgerState {
            local_rel: row.local_path.clone(),
            remote_rel: row.remote_path.clone(),
            kind: row.kind,
            checksum: row.checksum,
            remote_mtime: row.remote_mtime,
        };
        SyncItem::semi(
            item_name(&row.remote_path, row.kind),
            row.kind,
            None,
            None,
            Some(ledger),
            Some(Side::Remote),
        )
    }

    /// A local item moved from `old_rel` to `new_rel`. Keyed by the old identity so the ledger
    /// row is found; the local side points at the new location.
    pub fn from_rename(&self, old_rel: &str, new_rel: &str, kind: ItemKind) -> Result<SyncItem> {
        let ledger = self.ledger_from_local(old_rel, kind)?;
        let name = match &ledger {
            Some(state) => item_name(&state.remote_rel, kind),
            None => item_name(&self.graft_remote(old_rel)?, kind),
        };
        let local = LocalState::new(self.local_root.clone(), new_rel, kind);
        Ok(SyncItem::semi(
            name,
            kind,
            Some(local),
            None,
            ledger,
            Some(Side::Remote),
        ))
    }

    /// Resolve the local side by looking at the disk. An entry of the other kind counts as
    /// absent. A path that cannot be examined is an error and leaves the item unresolved.
    pub fn attach_local_from_disk(&self, item: &mut SyncItem) -> Result<()> {
        let rel = item.local_target().to_string();
        let present = LocalTree::new(&self.local_root).exists(&rel, item.kind)?;
        let local = present.then(|| LocalState::new(self.local_root.clone(), rel, item.kind));
        item.resolve_local(local);
        Ok(())
    }

    /// Remote spelling of a local path with no ledger row of its own.
    fn graft_remote(&self, local_rel: &str) -> Result<String> {
        graft(local_rel, |ancestor| {
            self.ledger.local_to_remote(ancestor, ItemKind::Folder)
        })
    }

    /// Local spelling of a remote path with no ledger row of its own.
    fn graft_local(&self, remote_rel: &str) -> Result<String> {
        graft(remote_rel, |ancestor| {
            self.ledger.remote_to_local(ancestor, ItemKind::Folder)
        })
    }

    fn ledger_from_local(&self, local_rel: &str, kind: ItemKind) -> Result<Option<LedgerState>> {
        let Some(remote_rel) = self.ledger.local_to_remote(local_rel, kind)? else {
            return Ok(None);
        };
        self.ledger_state(local_rel.to_string(), remote_rel, kind).map(Some)
    }

    fn ledger_from_remote(&self, remote_rel: &str, kind: ItemKind) -> Result<Option<LedgerState>> {
        let Some(local_rel) = self.ledger.remote_to_local(remote_rel, kind)? else {
            return Ok(None);
        };
        self.ledger_state(local_rel, remote_rel.to_string(), kind).map(Some)
    }

    fn ledger_state(
        &self,
        local_rel: String,
        remote_rel: String,
        kind: ItemKind,
    ) -> Result<LedgerState> {
        let (checksum, remote_mtime) = match kind {
            ItemKind::Folder => (None, None),
            ItemKind::File => (
                self.ledger.checksum(&local_rel)?,
                self.ledger.remote_mtime(&remote_rel)?,
            ),
        };
        Ok(LedgerState {
            local_rel,
            remote_rel,
            kind,
            checksum,
            remote_mtime,
        })
    }
}

/// Replace the longest ancestor of `rel` that `translate` knows with its translation, keeping
/// the rest of the path. Returns `rel` unchanged when no ancestor is recorded.
fn graft<F>(rel: &str, translate: F) -> Result<String>
where
    F: Fn(&str) -> Result<Option<String>>,
{
    let mut end = rel.len();
    while let Some(cut) = rel[..end].rfind('/') {
        if let Some(mapped) = translate(&rel[..cut])? {
            return Ok(format!("{mapped}{}", &rel[cut..]));
        }
        end = cut;
    }
    Ok(rel.to_string())
}
