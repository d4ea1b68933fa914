//! Table-kind reconciliation ahead of create-or-replace DDL.
//!
//! Warehouses refuse a replace DDL across registration kinds (a native table
//! cannot be replaced by `CREATE OR REPLACE EXTERNAL TABLE` and vice versa).
//! There is no atomic kind-agnostic replace, so the guard here inspects the
//! existing registration and drops it first when its kind blocks the intended
//! operation. It must run immediately before every create-or-replace whose
//! target kind might have changed between runs.

use tracing::{info, warn};

use crate::error::SyncResult;
use crate::warehouse::{TableKind, Warehouse};

/// What [`ensure_replaceable`] decided to do about an existing registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    /// No registration exists; the create DDL starts from scratch.
    NoTable,
    /// The existing kind matches the intended operation; the replace DDL
    /// proceeds over it.
    LeaveInPlace,
    /// The existing kind blocks the intended operation and must be dropped.
    DropFirst,
}

/// Decides how an existing registration interacts with an intended
/// create-or-replace of `intended` kind.
pub fn reconcile_action(existing: Option<TableKind>, intended: TableKind) -> ReconcileAction {
    match existing {
        None => ReconcileAction::NoTable,
        Some(kind) if kind == intended => ReconcileAction::LeaveInPlace,
        Some(_) => ReconcileAction::DropFirst,
    }
}

/// Guards a create-or-replace of `intended` kind on `table_id`.
///
/// Returns the action taken so callers can log or assert on the recovery path.
/// A failed drop is surfaced as-is: at that point the conflicting registration
/// still exists and the create-or-replace would fail anyway.
pub async fn ensure_replaceable<W: Warehouse>(
    warehouse: &W,
    table_id: &str,
    intended: TableKind,
) -> SyncResult<ReconcileAction> {
    let existing = warehouse.table_kind(table_id).await?;
    let action = reconcile_action(existing, intended);

    match action {
        ReconcileAction::NoTable => {
            info!(table_id, %intended, "table does not exist yet, creating from scratch");
        }
        ReconcileAction::LeaveInPlace => {
            info!(table_id, %intended, "existing table kind is compatible, replacing in place");
        }
        ReconcileAction::DropFirst => {
            if let Some(existing) = existing {
                warn!(
                    table_id,
                    %existing,
                    %intended,
                    "existing table kind blocks the intended replace, dropping it first"
                );
            }
            warehouse.drop_table(table_id).await?;
        }
    }

    Ok(action)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_table_needs_no_reconciliation() {
        assert_eq!(
            reconcile_action(None, TableKind::External),
            ReconcileAction::NoTable
        );
        assert_eq!(
            reconcile_action(None, TableKind::Native),
            ReconcileAction::NoTable
        );
    }

    #[test]
    fn matching_kind_is_left_for_the_replace_ddl() {
        assert_eq!(
            reconcile_action(Some(TableKind::Native), TableKind::Native),
            ReconcileAction::LeaveInPlace
        );
        assert_eq!(
            reconcile_action(Some(TableKind::External), TableKind::External),
            ReconcileAction::LeaveInPlace
        );
    }

    #[test]
    fn conflicting_kind_is_dropped_first() {
        assert_eq!(
            reconcile_action(Some(TableKind::Native), TableKind::External),
            ReconcileAction::DropFirst
        );
        assert_eq!(
            reconcile_action(Some(TableKind::External), TableKind::Native),
            ReconcileAction::DropFirst
        );
        assert_eq!(
            reconcile_action(Some(TableKind::Other), TableKind::Native),
            ReconcileAction::DropFirst
        );
        assert_eq!(
            reconcile_action(Some(TableKind::Other), TableKind::External),
            ReconcileAction::DropFirst
        );
    }
}
