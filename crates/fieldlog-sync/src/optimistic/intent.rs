//! Derives the optimistic delta an operation produces.

use fieldlog_core::models::{AppState, EntityData, OperationKind, UpdateOperation};

/// What the UI should see for an operation before it is confirmed.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimisticIntent {
    pub operation: UpdateOperation,
    pub previous: Option<EntityData>,
    pub data: EntityData,
}

/// Compare the state before and after an operation for the entity it
/// touches. List and cursor edits (`AddressesSet`, `ActiveIndexSet`, ...)
/// have no optimistic entry.
pub fn intent_for(kind: &OperationKind, before: &AppState, after: &AppState) -> Option<OptimisticIntent> {
    let (previous, next) = match kind {
        OperationKind::CompletionCreate { completion } => (
            None,
            after.completion(&completion.id).cloned().map(EntityData::Completion),
        ),
        OperationKind::CompletionUpdate { id, .. } | OperationKind::CompletionDelete { id } => (
            before.completion(id).cloned().map(EntityData::Completion),
            after.completion(id).cloned().map(EntityData::Completion),
        ),
        OperationKind::ArrangementCreate { arrangement } => (
            None,
            after.arrangement(&arrangement.id).cloned().map(EntityData::Arrangement),
        ),
        OperationKind::ArrangementUpdate { id, .. } | OperationKind::ArrangementDelete { id } => (
            before.arrangement(id).cloned().map(EntityData::Arrangement),
            after.arrangement(id).cloned().map(EntityData::Arrangement),
        ),
        OperationKind::SessionStart { session } => (
            None,
            after.session(session.date).cloned().map(EntityData::Session),
        ),
        OperationKind::SessionEnd { date, .. } => (
            before.session(*date).cloned().map(EntityData::Session),
            after.session(*date).cloned().map(EntityData::Session),
        ),
        OperationKind::AddressesSet { .. }
        | OperationKind::AddressAdd { .. }
        | OperationKind::ActiveIndexSet { .. }
        | OperationKind::ConflictResolve { .. } => return None,
    };

    match (previous, next) {
        (None, Some(data)) => Some(OptimisticIntent {
            operation: UpdateOperation::Create,
            previous: None,
            data,
        }),
        (Some(previous), Some(data)) if previous != data => Some(OptimisticIntent {
            operation: UpdateOperation::Update,
            previous: Some(previous),
            data,
        }),
        (Some(previous), None) => Some(OptimisticIntent {
            operation: UpdateOperation::Delete,
            data: previous.clone(),
            previous: Some(previous),
        }),
        _ => None,
    }
}
