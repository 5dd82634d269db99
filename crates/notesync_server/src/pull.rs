//! Pull Pipeline.
//!
//! A recognized token continues from its `last_sequence`. No token, or a
//! token this server cannot vouch for, yields a cold start: every live
//! entity as a synthetic `create` entry. Both paths page; a page's token
//! covers only what that page returned.

use crate::error::ServerResult;
use notesync_core::{ChangeLogEntry, ClientId, Entity, EntityKind, Operation, OwnerDomain};
use notesync_protocol::{PullRequest, PullResponse, SyncToken, TokenCodec};
use tracing::{debug, warn};

/// Origin reported for synthetic entries whose log entry is unavailable.
const SNAPSHOT_ORIGIN: &str = "server";

/// Decodes `raw` and checks it against the current state of the domain.
fn accept_token(domain: &OwnerDomain, codec: &TokenCodec, raw: &str) -> Result<SyncToken, String> {
    let token = codec.decode(raw).map_err(|e| e.to_string())?;
    if &token.owner != domain.owner() {
        return Err(format!("token issued for owner {}", token.owner));
    }
    let head = domain.head();
    if token.last_sequence > head {
        return Err(format!(
            "token at sequence {} is ahead of log head {head}",
            token.last_sequence
        ));
    }
    if let Some((key, version)) = token
        .versions
        .iter()
        .find(|(key, version)| **version > domain.version(key))
    {
        return Err(format!("token knows {key} at version {version}, store is behind"));
    }
    Ok(token)
}

/// Runs a pull against one owner's domain.
///
/// # Errors
///
/// Returns [`crate::ServerError::Protocol`] if the next token cannot be
/// encoded.
pub fn run_pull(
    domain: &OwnerDomain,
    codec: &TokenCodec,
    request: &PullRequest,
    page_size: usize,
) -> ServerResult<PullResponse> {
    let kinds = request.entity_kinds.as_deref();
    match request.token.as_deref() {
        None => cold_start(domain, codec, kinds, page_size, false),
        Some(raw) => match accept_token(domain, codec, raw) {
            Ok(token) => incremental(domain, codec, token, kinds, page_size),
            Err(reason) => {
                warn!(owner = %domain.owner(), %reason, "sync token rejected, full resync");
                cold_start(domain, codec, kinds, page_size, true)
            }
        },
    }
}

fn wanted(kinds: Option<&[EntityKind]>, kind: EntityKind) -> bool {
    kinds.map_or(true, |kinds| kinds.contains(&kind))
}

fn incremental(
    domain: &OwnerDomain,
    codec: &TokenCodec,
    mut token: SyncToken,
    kinds: Option<&[EntityKind]>,
    page_size: usize,
) -> ServerResult<PullResponse> {
    let mut scanned = domain.entries_after(token.last_sequence, page_size + 1);
    let has_more = scanned.len() > page_size;
    scanned.truncate(page_size);

    let mut entries = Vec::with_capacity(scanned.len());
    for entry in &scanned {
        token.last_sequence = entry.sequence;
        if wanted(kinds, entry.kind) {
            token.observe(entry);
            entries.push(ChangeLogEntry::clone(entry));
        }
    }

    debug!(
        owner = %domain.owner(),
        from = scanned.first().map_or(0, |e| e.sequence),
        to = token.last_sequence,
        returned = entries.len(),
        has_more,
        "incremental pull"
    );
    Ok(PullResponse {
        entries,
        next_token: codec.encode(&token)?,
        has_more,
        resync_required: false,
        head_sequence: domain.head(),
    })
}

fn synthetic_create(domain: &OwnerDomain, entity: Entity) -> ChangeLogEntry {
    let origin = domain
        .log()
        .get(entity.last_sequence)
        .map_or_else(|| ClientId::new(SNAPSHOT_ORIGIN), |e| e.origin.clone());
    ChangeLogEntry {
        sequence: entity.last_sequence,
        kind: entity.kind,
        entity_id: entity.id,
        operation: Operation::Create,
        before: None,
        after: entity.payload,
        resulting_version: entity.version,
        origin,
        applied_at: entity.updated_at,
    }
}

fn cold_start(
    domain: &OwnerDomain,
    codec: &TokenCodec,
    kinds: Option<&[EntityKind]>,
    page_size: usize,
    resync_required: bool,
) -> ServerResult<PullResponse> {
    let head = domain.head();
    let mut snapshot: Vec<ChangeLogEntry> = domain
        .live_entities()
        .into_iter()
        .filter(|e| wanted(kinds, e.kind))
        .map(|e| synthetic_create(domain, e))
        .collect();
    snapshot.sort_by_key(|e| e.sequence);

    let has_more = snapshot.len() > page_size;
    snapshot.truncate(page_size);

    let mut token = SyncToken::new(domain.owner().clone());
    for entry in &snapshot {
        token.observe(entry);
    }
    token.last_sequence = match snapshot.last() {
        Some(last) if has_more => last.sequence.min(head),
        _ => head,
    };

    debug!(
        owner = %domain.owner(),
        head,
        returned = snapshot.len(),
        has_more,
        resync_required,
        "cold start pull"
    );
    Ok(PullResponse {
        entries: snapshot,
        next_token: codec.encode(&token)?,
        has_more,
        resync_required,
        head_sequence: head,
    })
}
