//! Conflict Resolver.
//!
//! Every strategy is expressed as ordinary changes through the same
//! apply primitive the Push Pipeline uses:
//!
//! - `takeRemote` changes nothing
//! - `takeLocal` re-submits the local change against the current version
//! - `keepBoth` creates a new entity holding the local payload

use crate::error::{ServerError, ServerResult};
use notesync_core::{
    ApplyOutcome, ChangeRequest, ClientId, ConflictReason, ConflictRecord, EntityId, Operation,
    OwnerDomain,
};
use notesync_protocol::{ResolveResponse, ResolveStrategy};
use tracing::{debug, info};

/// How many times `takeLocal` re-reads the version after losing a race.
pub const TAKE_LOCAL_ATTEMPTS: usize = 3;

/// Resolves `conflict` in `domain` with `strategy`.
///
/// `takeLocal` against an entity that no longer exists degrades to
/// `keepBoth`, since there is no version left to overwrite.
///
/// # Errors
///
/// - [`ServerError::Contended`] if `takeLocal` loses every attempt
/// - core errors from the underlying apply
pub fn resolve(
    domain: &OwnerDomain,
    conflict: &ConflictRecord,
    strategy: ResolveStrategy,
    client: &ClientId,
) -> ServerResult<ResolveResponse> {
    let response = match strategy {
        ResolveStrategy::TakeRemote => ResolveResponse {
            strategy,
            applied: None,
        },
        ResolveStrategy::TakeLocal => take_local(domain, conflict, client)?,
        ResolveStrategy::KeepBoth => keep_both(domain, conflict, client)?,
    };
    info!(
        owner = %domain.owner(),
        entity = %conflict.key(),
        requested = %strategy,
        applied = %response.strategy,
        "conflict resolved"
    );
    Ok(response)
}

fn take_local(
    domain: &OwnerDomain,
    conflict: &ConflictRecord,
    client: &ClientId,
) -> ServerResult<ResolveResponse> {
    let key = conflict.key();
    for attempt in 1..=TAKE_LOCAL_ATTEMPTS {
        let current = match domain.get(&key) {
            Some(entity) if entity.is_live() => entity,
            _ if conflict.operation == Operation::Delete => {
                // The local intent was a delete and the entity is already gone.
                return Ok(ResolveResponse {
                    strategy: ResolveStrategy::TakeLocal,
                    applied: None,
                });
            }
            _ => return keep_both(domain, conflict, client),
        };

        let request = match (conflict.operation, conflict.local_payload.clone()) {
            (Operation::Delete, _) | (_, None) => {
                ChangeRequest::delete(conflict.kind, key.id.clone(), current.version, client.clone())
            }
            (_, Some(payload)) => {
                ChangeRequest::update(key.id.clone(), payload, current.version, client.clone())
            }
        };

        match domain.apply(request)? {
            ApplyOutcome::Applied(applied) => {
                return Ok(ResolveResponse {
                    strategy: ResolveStrategy::TakeLocal,
                    applied: Some(applied),
                })
            }
            ApplyOutcome::Conflict(lost) if lost.reason == ConflictReason::VersionMismatch => {
                debug!(entity = %key, attempt, "takeLocal lost a race, retrying");
            }
            ApplyOutcome::Conflict(_) => return keep_both(domain, conflict, client),
        }
    }
    Err(ServerError::Contended(key))
}

fn keep_both(
    domain: &OwnerDomain,
    conflict: &ConflictRecord,
    client: &ClientId,
) -> ServerResult<ResolveResponse> {
    let Some(payload) = conflict.local_payload.clone() else {
        // A local delete has nothing to keep.
        return Ok(ResolveResponse {
            strategy: ResolveStrategy::KeepBoth,
            applied: None,
        });
    };
    let request = ChangeRequest::create(EntityId::generate(), payload, client.clone());
    match domain.apply(request)? {
        ApplyOutcome::Applied(applied) => Ok(ResolveResponse {
            strategy: ResolveStrategy::KeepBoth,
            applied: Some(applied),
        }),
        ApplyOutcome::Conflict(c) => Err(ServerError::Internal(format!(
            "fresh id {} collided: {}",
            c.entity_id, c.reason
        ))),
    }
}
