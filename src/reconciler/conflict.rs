//! Conflict handling: both sides changed since the last sync.
//!
//! The local copy is renamed aside and the remote version is pulled into its place. Two
//! folders, or two files with identical content, are simply adopted into the ledger.

use anyhow::Result;
use log::{debug, warn};

use super::Reconciler;
use crate::ledger::LedgerRow;
use crate::triplet::{ItemKind, SyncItem};
use crate::types::ItemOutcome;

impl Reconciler {
    pub(super) fn resolve_conflict(&self, item: &SyncItem) -> Result<ItemOutcome> {
        match (&item.local, &item.remote) {
            (Some(local), Some(remote)) if item.kind == ItemKind::Folder => {
                self.ledger
                    .record(&LedgerRow::folder(&local.rel_path, &remote.rel_path))?;
                debug!("adopted folder {}", item.name);
                Ok(ItemOutcome::Succeeded)
            }
            (Some(local), Some(remote)) => {
                let target = local.rel_path.clone();
                let partial = self.local.write_partial(&target, |sink| {
                    self.remote.download(&remote.object.path, sink)?;
                    Ok(())
                })?;
                let downloaded = partial.checksum;
                if local.checksum() == Some(downloaded) {
                    self.local.discard_partial(partial);
                    self.ledger.record(&LedgerRow::file(
                        &target,
                        &remote.rel_path,
                        downloaded,
                        remote.mtime_ns(),
                    ))?;
                    debug!("adopted identical {}", item.name);
                    return Ok(ItemOutcome::Succeeded);
                }
                let aside = self.local.conflict_name(&target)?;
                self.local.rename(&target, &aside)?;
                let checksum = self.local.commit_partial(partial, &target)?;
                self.ledger.record(&LedgerRow::file(
                    &target,
                    &remote.rel_path,
                    checksum,
                    remote.mtime_ns(),
                ))?;
                warn!("conflict on {}: local copy kept as {}", item.name, aside);
                Ok(ItemOutcome::Conflicted)
            }
            (Some(local), None) => {
                let aside = self.local.conflict_name(&local.rel_path)?;
                self.local.rename(&local.rel_path, &aside)?;
                self.forget(item)?;
                warn!(
                    "conflict on {}: deleted remotely, local copy kept as {}",
                    item.name, aside
                );
                Ok(ItemOutcome::Conflicted)
            }
            (None, Some(_)) => {
                self.pull(item, item.local_target())?;
                warn!(
                    "conflict on {}: deleted locally but changed remotely, restored",
                    item.name
                );
                Ok(ItemOutcome::Conflicted)
            }
            (None, None) => {
                self.forget(item)?;
                Ok(ItemOutcome::Succeeded)
            }
        }
    }
}
