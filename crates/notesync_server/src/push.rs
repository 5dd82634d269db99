//! Push Pipeline.
//!
//! A batch is validated as a whole first; a single malformed entry fails
//! the batch before any entity is touched. Valid batches are then applied
//! entry by entry in submitted order. Each entry ends up in exactly one of
//! `applied`, `conflicts` or `failed`.

use crate::error::{ServerError, ServerResult};
use notesync_core::{ApplyOutcome, ChangeRequest, OwnerDomain};
use notesync_protocol::{FailedEntry, PushRequest, PushResponse};
use tracing::{debug, warn};

/// Validates every entry of `request` and returns the change requests.
///
/// # Errors
///
/// [`ServerError::InvalidBatch`] for the first entry that is missing a
/// required field or carries an invalid payload.
pub fn validate_batch(request: &PushRequest) -> ServerResult<Vec<ChangeRequest>> {
    if request.client_id.is_blank() {
        return Err(ServerError::InvalidRequest("client id is required".into()));
    }
    request
        .entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            entry
                .to_request(index, &request.client_id)
                .map_err(|e| ServerError::InvalidBatch {
                    index,
                    message: e.to_string(),
                })?
                .validated()
                .map_err(|e| ServerError::InvalidBatch {
                    index,
                    message: e.to_string(),
                })
        })
        .collect()
}

/// Runs a push against one owner's domain.
///
/// # Errors
///
/// Returns a batch-level error for oversized or malformed batches. Storage
/// failures never surface here; they are reported per entry.
pub fn run_push(
    domain: &OwnerDomain,
    request: &PushRequest,
    max_batch: usize,
) -> ServerResult<PushResponse> {
    if request.entries.len() > max_batch {
        return Err(ServerError::BatchTooLarge {
            len: request.entries.len(),
            max: max_batch,
        });
    }
    let changes = validate_batch(request)?;

    let mut response = PushResponse::default();
    for (index, change) in changes.into_iter().enumerate() {
        let kind = change.kind;
        let entity_id = change.entity_id.clone();
        match domain.apply(change) {
            Ok(ApplyOutcome::Applied(applied)) => response.applied.push(applied),
            Ok(ApplyOutcome::Conflict(conflict)) => response.conflicts.push(conflict),
            Err(err) => {
                warn!(
                    owner = %domain.owner(),
                    index,
                    entity = %entity_id,
                    error = %err,
                    "push entry failed"
                );
                response.failed.push(FailedEntry {
                    index,
                    entity_kind: kind,
                    entity_id,
                    retryable: err.is_transient(),
                    error: err.to_string(),
                });
            }
        }
    }

    debug!(
        owner = %domain.owner(),
        client = %request.client_id,
        applied = response.applied.len(),
        conflicts = response.conflicts.len(),
        failed = response.failed.len(),
        "push complete"
    );
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use notesync_core::{EntityKind, NotePayload, TagPayload};
    use notesync_protocol::PushEntry;

    fn domain() -> OwnerDomain {
        OwnerDomain::in_memory("alice".into()).unwrap()
    }

    fn push(entries: Vec<ChangeRequest>) -> PushRequest {
        PushRequest::new("laptop", entries.into_iter().map(PushEntry::from).collect())
    }

    #[test]
    fn applies_in_order() {
        let d = domain();
        let response = run_push(
            &d,
            &push(vec![
                ChangeRequest::create("n1", NotePayload::new("draft", ""), "laptop"),
                ChangeRequest::update("n1", NotePayload::new("final", ""), 1, "laptop"),
            ]),
            100,
        )
        .unwrap();
        let versions: Vec<u64> = response.applied.iter().map(|a| a.version).collect();
        assert_eq!(versions, vec![1, 2]);
        assert!(response.is_clean());
    }

    #[test]
    fn malformed_entry_fails_whole_batch() {
        let d = domain();
        let mut bad = PushEntry::from(ChangeRequest::create(
            "n2",
            NotePayload::new("x", ""),
            "laptop",
        ));
        bad.entity_id = None;
        let request = PushRequest::new(
            "laptop",
            vec![
                ChangeRequest::create("n1", NotePayload::new("ok", ""), "laptop").into(),
                bad,
            ],
        );
        let err = run_push(&d, &request, 100).unwrap_err();
        assert!(matches!(err, ServerError::InvalidBatch { index: 1, .. }));
        assert_eq!(d.head(), 0);
    }

    #[test]
    fn blank_title_fails_whole_batch() {
        let d = domain();
        let err = run_push(
            &d,
            &push(vec![ChangeRequest::create(
                "n1",
                NotePayload::new("  ", ""),
                "laptop",
            )]),
            100,
        )
        .unwrap_err();
        assert!(err.is_client_error());
        assert_eq!(d.head(), 0);
    }

    #[test]
    fn oversized_batch_rejected() {
        let d = domain();
        let entries = (0..3)
            .map(|i| ChangeRequest::create(format!("t{i}"), TagPayload::default(), "laptop"))
            .collect();
        let err = run_push(&d, &push(entries), 2).unwrap_err();
        assert!(matches!(err, ServerError::BatchTooLarge { len: 3, max: 2 }));
    }

    #[test]
    fn conflicts_do_not_stop_the_batch() {
        let d = domain();
        run_push(
            &d,
            &push(vec![ChangeRequest::create("n1", NotePayload::new("a", ""), "laptop")]),
            100,
        )
        .unwrap();
        let response = run_push(
            &d,
            &push(vec![
                ChangeRequest::create("n1", NotePayload::new("dup", ""), "laptop"),
                ChangeRequest::delete(EntityKind::Note, "n1", 1, "laptop"),
            ]),
            100,
        )
        .unwrap();
        assert_eq!(response.conflicts.len(), 1);
        assert_eq!(response.applied.len(), 1);
        assert_eq!(response.applied[0].version, 2);
    }
}
