//! Sync tokens.
//!
//! A token records how far a client has read an owner's change log and
//! which entity versions it has seen. Clients treat it as opaque.
//!
//! ## Token Format
//!
//! ```text
//! base64url( CBOR body | HMAC-SHA256(body) (32) )
//! ```
//!
//! The signature lets the server reject tokens it did not issue, or that
//! were issued under a different secret, without keeping per-client state.
//! Encoding is deterministic: the same position yields the same string.

use crate::error::{ProtocolError, ProtocolResult};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use notesync_core::{ChangeLogEntry, EntityId, EntityKey, EntityKind, OwnerId};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::BTreeMap;

type HmacSha256 = Hmac<Sha256>;

const MAC_SIZE: usize = 32;
const TOKEN_FORMAT: u8 = 1;

/// Decoded sync token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncToken {
    /// Owner the token was issued for.
    pub owner: OwnerId,
    /// Highest sequence the client has received.
    pub last_sequence: u64,
    /// Entity versions known to the client at issuance.
    pub versions: BTreeMap<EntityKey, u64>,
}

impl SyncToken {
    /// Creates a token positioned before the first entry.
    pub fn new(owner: OwnerId) -> Self {
        Self {
            owner,
            last_sequence: 0,
            versions: BTreeMap::new(),
        }
    }

    /// Folds a delivered entry into the token.
    pub fn observe(&mut self, entry: &ChangeLogEntry) {
        self.last_sequence = self.last_sequence.max(entry.sequence);
        let version = self.versions.entry(entry.key()).or_default();
        *version = (*version).max(entry.resulting_version);
    }

    /// Version of `key` known to the client.
    #[must_use]
    pub fn known_version(&self, key: &EntityKey) -> Option<u64> {
        self.versions.get(key).copied()
    }
}

#[derive(Serialize, Deserialize)]
struct TokenBody {
    format: u8,
    owner: OwnerId,
    last_sequence: u64,
    versions: Vec<(EntityKind, EntityId, u64)>,
}

/// Signs and verifies sync tokens.
#[derive(Clone)]
pub struct TokenCodec {
    secret: Vec<u8>,
}

impl TokenCodec {
    /// Creates a codec with the server's signing secret.
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Encodes and signs a token.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Encode`] if the body cannot be serialized.
    pub fn encode(&self, token: &SyncToken) -> ProtocolResult<String> {
        let body = TokenBody {
            format: TOKEN_FORMAT,
            owner: token.owner.clone(),
            last_sequence: token.last_sequence,
            versions: token
                .versions
                .iter()
                .map(|(key, version)| (key.kind, key.id.clone(), *version))
                .collect(),
        };
        let mut bytes = Vec::new();
        ciborium::into_writer(&body, &mut bytes).map_err(|e| ProtocolError::Encode(e.to_string()))?;
        let signature = self.mac()?.chain_update(&bytes).finalize().into_bytes();
        bytes.extend_from_slice(&signature);
        Ok(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Verifies and decodes a token.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidToken`] for anything this codec
    /// did not sign.
    pub fn decode(&self, token: &str) -> ProtocolResult<SyncToken> {
        let raw = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|_| ProtocolError::InvalidToken("not base64url".into()))?;
        if raw.len() <= MAC_SIZE {
            return Err(ProtocolError::InvalidToken("too short".into()));
        }
        let (body, signature) = raw.split_at(raw.len() - MAC_SIZE);
        self.mac()?
            .chain_update(body)
            .verify_slice(signature)
            .map_err(|_| ProtocolError::InvalidToken("bad signature".into()))?;

        let body: TokenBody = ciborium::from_reader(body)
            .map_err(|e| ProtocolError::InvalidToken(format!("undecodable body: {e}")))?;
        if body.format != TOKEN_FORMAT {
            return Err(ProtocolError::InvalidToken(format!(
                "unsupported format {}",
                body.format
            )));
        }

        Ok(SyncToken {
            owner: body.owner,
            last_sequence: body.last_sequence,
            versions: body
                .versions
                .into_iter()
                .map(|(kind, id, version)| (EntityKey::new(kind, id), version))
                .collect(),
        })
    }

    fn mac(&self) -> ProtocolResult<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret).map_err(|e| ProtocolError::Encode(e.to_string()))
    }
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notesync_core::{NotePayload, Operation};

    fn token() -> SyncToken {
        let mut token = SyncToken::new("alice".into());
        token.observe(&ChangeLogEntry {
            sequence: 7,
            kind: EntityKind::Note,
            entity_id: "n1".into(),
            operation: Operation::Update,
            before: None,
            after: Some(NotePayload::new("x", "").into()),
            resulting_version: 3,
            origin: "c1".into(),
            applied_at: 0,
        });
        token
    }

    #[test]
    fn signed_token_decodes() {
        let codec = TokenCodec::new(b"secret".to_vec());
        let encoded = codec.encode(&token()).unwrap();
        assert!(encoded
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        let decoded = codec.decode(&encoded).unwrap();
        assert_eq!(decoded, token());
        assert_eq!(
            decoded.known_version(&EntityKey::new(EntityKind::Note, "n1")),
            Some(3)
        );
    }

    #[test]
    fn foreign_secret_rejected() {
        let encoded = TokenCodec::new(b"one".to_vec()).encode(&token()).unwrap();
        let err = TokenCodec::new(b"two".to_vec()).decode(&encoded).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidToken(_)));
    }

    #[test]
    fn tampered_token_rejected() {
        let codec = TokenCodec::new(b"secret".to_vec());
        let mut raw = URL_SAFE_NO_PAD.decode(codec.encode(&token()).unwrap()).unwrap();
        raw[3] ^= 0x01;
        assert!(codec.decode(&URL_SAFE_NO_PAD.encode(raw)).is_err());
    }

    #[test]
    fn garbage_rejected() {
        let codec = TokenCodec::new(b"secret".to_vec());
        assert!(codec.decode("").is_err());
        assert!(codec.decode("not a token!").is_err());
        assert!(codec.decode("AAAA").is_err());
    }

    #[test]
    fn observe_keeps_highest() {
        let mut t = token();
        let mut older = ChangeLogEntry {
            sequence: 2,
            kind: EntityKind::Note,
            entity_id: "n1".into(),
            operation: Operation::Create,
            before: None,
            after: None,
            resulting_version: 1,
            origin: "c1".into(),
            applied_at: 0,
        };
        t.observe(&older);
        assert_eq!(t.last_sequence, 7);
        older.entity_id = "n2".into();
        t.observe(&older);
        assert_eq!(t.versions.len(), 2);
    }

    proptest::proptest! {
        #[test]
        fn any_flipped_byte_is_rejected(index in 0usize..512, bit in 0u8..8) {
            let codec = TokenCodec::new(b"secret".to_vec());
            let mut raw = URL_SAFE_NO_PAD.decode(codec.encode(&token()).unwrap()).unwrap();
            let index = index % raw.len();
            raw[index] ^= 1 << bit;
            proptest::prop_assert!(codec.decode(&URL_SAFE_NO_PAD.encode(raw)).is_err());
        }
    }
}
