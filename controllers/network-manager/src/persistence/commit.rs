//! Store-then-cache writes.
//!
//! The store is written first; the cache only changes once the store accepted the
//! record. A cache failure rolls the store back (a created record is deleted, an
//! updated record is restored to its previous version) so that the two never
//! disagree about a committed resource. Rollback failures are logged and the
//! original error is returned.

use super::{Persisted, ResourceStore};
use crate::error::ManagerError;
use crate::repository::{Indexed, Repository};
use tracing::{debug, error};

impl ResourceStore {
    /// Persist a new record, then cache it
    pub async fn commit_new<T>(&self, repo: &Repository<T>, record: &T) -> Result<(), ManagerError>
    where
        T: Persisted + Indexed,
    {
        self.save_record(record).await?;
        if let Err(e) = repo.add(record.clone()) {
            error!("Caching {} {} failed, removing it from the store: {}", T::KIND, record.key(), e);
            if let Err(rollback) = self.delete_record(record).await {
                error!("Store rollback of {} {} failed: {}", T::KIND, record.key(), rollback);
            }
            return Err(e);
        }
        debug!("Committed {} {}", T::KIND, record.key());
        Ok(())
    }

    /// Persist a changed record, then replace the cached copy
    pub async fn commit_update<T>(&self, repo: &Repository<T>, previous: &T, record: &T) -> Result<(), ManagerError>
    where
        T: Persisted + Indexed,
    {
        self.save_record(record).await?;
        if let Err(e) = repo.update(record.clone()) {
            error!("Caching {} {} failed, restoring previous version: {}", T::KIND, record.key(), e);
            if let Err(rollback) = self.save_record(previous).await {
                error!("Store rollback of {} {} failed: {}", T::KIND, record.key(), rollback);
            }
            return Err(e);
        }
        debug!("Committed update of {} {}", T::KIND, record.key());
        Ok(())
    }

    /// Delete a record from the store (absent is fine), then from the cache
    pub async fn commit_delete<T>(&self, repo: &Repository<T>, record: &T) -> Result<(), ManagerError>
    where
        T: Persisted + Indexed,
    {
        match self.delete_record(record).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => debug!("{} {} already gone from the store", T::KIND, record.key()),
            Err(e) => return Err(e),
        }
        repo.del(record.key());
        Ok(())
    }
}
