use std::{marker::PhantomData, path::PathBuf};

use crate::disk::Disk;

/// What a build has to undo if it does not finish.
pub enum RollbackOperation {
    RemoveFile(PathBuf),
    RemoveDir(PathBuf),
    /// A file that existed before the build, moved aside to `backup`.
    Restore { backup: PathBuf, path: PathBuf },
}
/// Build in progress
pub struct Active;
/// Build finished
pub struct Committed;
/// Tells whether dropping the transaction undoes its operations.
pub trait TransactionState {
    const SHOULD_ROLLBACK: bool;
}
impl TransactionState for Active {
    const SHOULD_ROLLBACK: bool = true;
}
impl TransactionState for Committed {
    const SHOULD_ROLLBACK: bool = false;
}
/// Files and directories created while materializing a folder.
///
/// A `Transaction<Active>` dropped before [`Transaction::commit`] (an error
/// propagated with `?` mid-build) removes everything it recorded, newest
/// first, through the same [`Disk`] the build wrote to. Files that existed
/// before the build are moved back from their backup; committing deletes the
/// backups instead.
pub struct Transaction<'a, State: TransactionState> {
    disk: &'a dyn Disk,
    rollback_operations: Vec<RollbackOperation>,
    state: PhantomData<State>,
}
impl<'a> Transaction<'a, Active> {
    pub fn new(disk: &'a dyn Disk) -> Self {
        Transaction {
            disk,
            rollback_operations: vec![],
            state: PhantomData,
        }
    }
    pub fn add_operation(&mut self, operation: RollbackOperation) {
        self.rollback_operations.push(operation);
    }
    /// Keeps everything written so far.
    pub fn commit(mut self) -> Transaction<'a, Committed> {
        for operation in self.rollback_operations.drain(..) {
            if let RollbackOperation::Restore { backup, .. } = operation {
                if let Err(error) = self.disk.remove_path(&backup) {
                    log::warn!("cannot remove backup {}: {}", backup.display(), error);
                }
            }
        }

        Transaction {
            disk: self.disk,
            rollback_operations: vec![],
            state: PhantomData,
        }
    }
}
impl<S: TransactionState> Drop for Transaction<'_, S> {
    fn drop(&mut self) {
        if S::SHOULD_ROLLBACK && !self.rollback_operations.is_empty() {
            log::debug!("rolling back {} operations", self.rollback_operations.len());
            while let Some(operation) = self.rollback_operations.pop() {
                let (path, undone) = match operation {
                    RollbackOperation::RemoveDir(path) => {
                        log::debug!("removing dir: {}", path.display());
                        let undone = self.disk.remove_path(&path);
                        (path, undone)
                    }
                    RollbackOperation::RemoveFile(path) => {
                        log::debug!("removing file: {}", path.display());
                        let undone = self.disk.remove_path(&path);
                        (path, undone)
                    }
                    RollbackOperation::Restore { backup, path } => {
                        log::debug!("restoring file: {}", path.display());
                        let undone = self.disk.rename(&backup, &path);
                        (path, undone)
                    }
                };
                if let Err(error) = undone {
                    log::warn!("rollback failed for {}: {}", path.display(), error);
                }
            }
        } else if !S::SHOULD_ROLLBACK {
            log::debug!("committing transaction");
        }
    }
}
