//! Cross-aggregate rules shared by every backend.
//!
//! Backends load the stored row inside their transaction and run it through
//! these checks before writing, so both backends reject the same requests with
//! the same error class.
use migration_manager_shared::{Instance, MigrationStatus};

use crate::errors::RepositoryError;

/// The stored instance may be rewritten by a full-record update.
pub(crate) fn ensure_updatable(stored: &Instance) -> Result<(), RepositoryError> {
    if stored.batch_id.is_some() {
        return Err(RepositoryError::not_permitted(format!(
            "instance {} is assigned to a batch and can not be modified",
            stored.uuid
        )));
    }
    if stored.is_migrating() {
        return Err(RepositoryError::not_permitted(format!(
            "instance {} is migrating and can not be modified",
            stored.uuid
        )));
    }
    Ok(())
}

pub(crate) fn ensure_deletable(stored: &Instance) -> Result<(), RepositoryError> {
    if stored.batch_id.is_some() {
        return Err(RepositoryError::not_permitted(format!(
            "instance {} is assigned to a batch and can not be deleted",
            stored.uuid
        )));
    }
    if stored.is_migrating() {
        return Err(RepositoryError::not_permitted(format!(
            "instance {} is migrating and can not be deleted",
            stored.uuid
        )));
    }
    if stored.overrides.is_some() {
        return Err(RepositoryError::constraint(format!(
            "instance {} still has overrides",
            stored.uuid
        )));
    }
    Ok(())
}

pub(crate) fn ensure_assignable(stored: &Instance) -> Result<(), RepositoryError> {
    if stored.batch_id.is_some() {
        return Err(RepositoryError::not_permitted(format!(
            "instance {} is already assigned to a batch",
            stored.uuid
        )));
    }
    if stored.is_migration_disabled() {
        return Err(RepositoryError::not_permitted(format!(
            "migration of instance {} is disabled",
            stored.uuid
        )));
    }
    if stored.migration_status != MigrationStatus::NotAssignedBatch {
        return Err(RepositoryError::StaleState {
            uuid: stored.uuid,
            expected: MigrationStatus::NotAssignedBatch,
            found: stored.migration_status,
        });
    }
    Ok(())
}

pub(crate) fn ensure_unassignable(stored: &Instance) -> Result<(), RepositoryError> {
    match stored.migration_status {
        MigrationStatus::AssignedBatch | MigrationStatus::Error => Ok(()),
        status => Err(RepositoryError::not_permitted(format!(
            "instance {} can not leave its batch while {:?}",
            stored.uuid, status
        ))),
    }
}

/// Error for a compare-and-set that matched no row although the row exists.
pub(crate) fn stale(stored: &Instance, expected: MigrationStatus) -> RepositoryError {
    RepositoryError::StaleState {
        uuid: stored.uuid,
        expected,
        found: stored.migration_status,
    }
}

/// No member of a batch may be mid-migration when the batch is rewritten or removed.
pub(crate) fn ensure_no_member_migrating(
    batch: &str,
    members: &[Instance],
) -> Result<(), RepositoryError> {
    match members.iter().find(|i| i.is_migrating()) {
        Some(member) => Err(RepositoryError::not_permitted(format!(
            "batch {batch} has instance {} in status {:?}",
            member.uuid, member.migration_status
        ))),
        None => Ok(()),
    }
}

/// A batch may only be removed once every member is `Migrated`, `Error` or `Disabled`.
pub(crate) fn ensure_members_settled(
    batch: &str,
    members: &[Instance],
) -> Result<(), RepositoryError> {
    let unsettled = members.iter().find(|i| {
        !i.migration_status.is_terminal() && i.migration_status != MigrationStatus::Disabled
    });
    match unsettled {
        Some(member) => Err(RepositoryError::not_permitted(format!(
            "batch {batch} has instance {} in status {:?}",
            member.uuid, member.migration_status
        ))),
        None => Ok(()),
    }
}
