//! Classification of triplets and the side effects that bring both sides back in sync.

mod conflict;
pub mod pool;

pub use pool::{ItemProcessor, ItemReport, WorkerPool};

use anyhow::{Context, Result, bail};
use log::{debug, info};
use std::sync::Arc;

use crate::engine::tools::join_remote;
use crate::ledger::{Ledger, LedgerRow};
use crate::local::LocalTree;
use crate::pipeline::Scheduled;
use crate::remote::{RemoteError, RemoteRepository};
use crate::triplet::{ItemKind, SyncItem};
use crate::types::ItemOutcome;

/// What a triplet needs, derived only from the two ledger predicates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Synced,
    /// Remote changed, local did not.
    Pull,
    /// Local changed, remote did not.
    Push,
    /// Both sides changed.
    Conflict,
}

impl Decision {
    pub fn classify(item: &SyncItem) -> Self {
        match (item.local_matches_ledger(), item.remote_matches_ledger()) {
            (true, true) => Decision::Synced,
            (true, false) => Decision::Pull,
            (false, true) => Decision::Push,
            (false, false) => Decision::Conflict,
        }
    }
}

/// Concrete operation chosen for a triplet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    None,
    /// Push needed but local changes are not propagated.
    Skip,
    CreateLocal,
    UpdateLocal,
    DeleteLocal,
    CreateRemote,
    UpdateRemote,
    /// Local item was moved; recreate it at the new remote path.
    MoveRemote,
    DeleteRemote,
    /// Both sides are gone; only the ledger row is left.
    PurgeLedger,
    ResolveConflict,
}

impl Action {
    pub fn plan(item: &SyncItem, bidirectional: bool) -> Self {
        match Decision::classify(item) {
            Decision::Synced => Action::None,
            Decision::Pull => match (&item.local, &item.remote) {
                (None, None) => Action::PurgeLedger,
                (None, Some(_)) => Action::CreateLocal,
                (Some(_), None) => Action::DeleteLocal,
                (Some(_), Some(_)) => Action::UpdateLocal,
            },
            Decision::Push if !bidirectional => Action::Skip,
            Decision::Push => match (&item.local, &item.remote, &item.ledger) {
                (None, None, _) => Action::PurgeLedger,
                (None, Some(_), _) => Action::DeleteRemote,
                (Some(_), None, _) => Action::CreateRemote,
                (Some(local), Some(_), Some(ledger)) if local.rel_path != ledger.local_rel => {
                    Action::MoveRemote
                }
                (Some(_), Some(_), _) => Action::UpdateRemote,
            },
            Decision::Conflict => match (&item.local, &item.remote) {
                (None, None) => Action::PurgeLedger,
                _ => Action::ResolveConflict,
            },
        }
    }

    /// Folder deletes wait until the rest of the pass has run.
    pub fn is_folder_delete(self, kind: ItemKind) -> bool {
        kind.is_folder() && matches!(self, Action::DeleteLocal | Action::DeleteRemote)
    }

    pub fn creates_folder(self, kind: ItemKind) -> bool {
        kind.is_folder()
            && matches!(
                self,
                Action::CreateLocal | Action::CreateRemote | Action::MoveRemote
            )
    }

    /// Actions that put something inside the parent folder.
    pub fn needs_parent(self) -> bool {
        matches!(
            self,
            Action::CreateLocal
                | Action::CreateRemote
                | Action::MoveRemote
                | Action::ResolveConflict
        )
    }
}

/// Applies planned actions to the local tree, the remote repository and the ledger.
pub struct Reconciler {
    local: LocalTree,
    remote: Arc<dyn RemoteRepository>,
    ledger: Arc<dyn Ledger>,
    remote_root: String,
}

impl Reconciler {
    pub fn new(
        local: LocalTree,
        remote: Arc<dyn RemoteRepository>,
        ledger: Arc<dyn Ledger>,
        remote_root: &str,
    ) -> Self {
        Self {
            local,
            remote,
            ledger,
            remote_root: remote_root.to_string(),
        }
    }

    fn remote_path(&self, rel: &str) -> String {
        join_remote(&self.remote_root, rel)
    }

    fn apply(&self, item: &SyncItem, action: Action) -> Result<ItemOutcome> {
        match action {
            Action::None | Action::Skip => Ok(ItemOutcome::Unchanged),
            Action::CreateLocal | Action::UpdateLocal => {
                self.pull(item, item.local_target())?;
                Ok(ItemOutcome::Succeeded)
            }
            Action::DeleteLocal => self.delete_local(item),
            Action::CreateRemote => self.create_remote(item),
            Action::UpdateRemote => self.update_remote(item),
            Action::MoveRemote => self.move_remote(item),
            Action::DeleteRemote => self.delete_remote(item),
            Action::PurgeLedger => {
                self.forget(item)?;
                Ok(ItemOutcome::Succeeded)
            }
            Action::ResolveConflict => self.resolve_conflict(item),
        }
    }

    /// Bring the remote version to `local_rel` and record it.
    fn pull(&self, item: &SyncItem, local_rel: &str) -> Result<()> {
        let Some(remote) = &item.remote else {
            bail!("nothing to download for {}", item.name);
        };
        let row = match item.kind {
            ItemKind::Folder => {
                self.local.create_dir(local_rel)?;
                LedgerRow::folder(local_rel, &remote.rel_path)
            }
            ItemKind::File => {
                let partial = self.local.write_partial(local_rel, |sink| {
                    self.remote
                        .download(&remote.object.path, sink)
                        .with_context(|| format!("download {}", remote.object.path))
                })?;
                let checksum = self.local.commit_partial(partial, local_rel)?;
                LedgerRow::file(local_rel, &remote.rel_path, checksum, remote.mtime_ns())
            }
        };
        if let Some(ledger) = &item.ledger
            && ledger.local_rel != local_rel
        {
            self.ledger.remove(&ledger.local_rel, item.kind)?;
        }
        self.ledger.record(&row)?;
        debug!("pulled {}", item.name);
        Ok(())
    }

    fn delete_local(&self, item: &SyncItem) -> Result<ItemOutcome> {
        if let Some(local) = &item.local {
            self.local.delete(&local.rel_path, item.kind)?;
        }
        self.forget(item)?;
        info!("deleted local {}", item.local_target());
        Ok(ItemOutcome::Succeeded)
    }

    fn create_remote(&self, item: &SyncItem) -> Result<ItemOutcome> {
        let Some(local) = &item.local else {
            bail!("nothing to upload for {}", item.name);
        };
        let remote_rel = item.rel_name().to_string();
        self.upload_new(item, &local.rel_path, &remote_rel)?;
        Ok(ItemOutcome::Succeeded)
    }

    /// Create `remote_rel` from the local item at `local_rel` and record the pair.
    fn upload_new(&self, item: &SyncItem, local_rel: &str, remote_rel: &str) -> Result<()> {
        let path = self.remote_path(remote_rel);
        let row = match item.kind {
            ItemKind::Folder => {
                self.remote
                    .create_folder(&path)
                    .with_context(|| format!("create remote folder {path}"))?;
                LedgerRow::folder(local_rel, remote_rel)
            }
            ItemKind::File => {
                let checksum = self.local.checksum(local_rel)?;
                let mut file = self.local.open(local_rel)?;
                let object = self
                    .remote
                    .create_document(&path, &mut file)
                    .with_context(|| format!("upload {path}"))?;
                LedgerRow::file(local_rel, remote_rel, checksum, object.mtime_ns)
            }
        };
        self.ledger.record(&row)?;
        debug!("pushed {}", remote_rel);
        Ok(())
    }

    fn update_remote(&self, item: &SyncItem) -> Result<ItemOutcome> {
        let (Some(local), Some(remote)) = (&item.local, &item.remote) else {
            bail!("update needs both sides of {}", item.name);
        };
        let row = match item.kind {
            ItemKind::Folder => LedgerRow::folder(&local.rel_path, &remote.rel_path),
            ItemKind::File => {
                let checksum = self.local.checksum(&local.rel_path)?;
                let mut file = self.local.open(&local.rel_path)?;
                let object = self
                    .remote
                    .update_document(&remote.object.path, &mut file)
                    .with_context(|| format!("upload {}", remote.object.path))?;
                LedgerRow::file(&local.rel_path, &remote.rel_path, checksum, object.mtime_ns)
            }
        };
        self.ledger.record(&row)?;
        Ok(ItemOutcome::Succeeded)
    }

    /// A moved folder is created at its new place and its old row is kept, so the old remote
    /// folder is removed by the deletion scan once its children have moved.
    fn move_remote(&self, item: &SyncItem) -> Result<ItemOutcome> {
        let (Some(local), Some(remote)) = (&item.local, &item.remote) else {
            bail!("move needs both sides of {}", item.name);
        };
        let new_rel = local.rel_path.clone();
        match item.kind {
            ItemKind::Folder => {
                self.upload_new(item, &new_rel, &new_rel)?;
            }
            ItemKind::File => {
                self.upload_new(item, &new_rel, &new_rel)?;
                self.forget(item)?;
                match self.remote.delete_object(&remote.object.path) {
                    Ok(()) | Err(RemoteError::NotFound(_)) => {}
                    Err(e) => {
                        return Err(e)
                            .with_context(|| format!("delete moved {}", remote.object.path));
                    }
                }
            }
        }
        info!("moved {} to {}", item.name, new_rel);
        Ok(ItemOutcome::Succeeded)
    }

    fn delete_remote(&self, item: &SyncItem) -> Result<ItemOutcome> {
        if let Some(remote) = &item.remote {
            match self.remote.delete_object(&remote.object.path) {
                Ok(()) | Err(RemoteError::NotFound(_)) => {}
                Err(e) => {
                    return Err(e).with_context(|| format!("delete {}", remote.object.path));
                }
            }
        }
        self.forget(item)?;
        info!("deleted remote {}", item.remote_target());
        Ok(ItemOutcome::Succeeded)
    }

    fn forget(&self, item: &SyncItem) -> Result<()> {
        if let Some(ledger) = &item.ledger {
            self.ledger.remove(&ledger.local_rel, item.kind)?;
        }
        Ok(())
    }
}

impl ItemProcessor for Reconciler {
    fn process(&self, scheduled: &Scheduled) -> Result<ItemOutcome> {
        self.apply(&scheduled.item, scheduled.action)
    }
}
