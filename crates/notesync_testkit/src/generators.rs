//! Property-based test generators using proptest.
//!
//! Strategies produce payloads that survive normalization, so a generated
//! change is only rejected for the reason a test sets up on purpose.

use notesync_core::{
    ChangeRequest, EntityId, EntityKind, EntityPayload, FolderPayload, NotePayload,
    NotebookPayload, TagPayload,
};
use proptest::prelude::*;

/// Strategy for generating valid entity IDs.
pub fn entity_id_strategy() -> impl Strategy<Value = EntityId> {
    prop::string::string_regex("[a-z][a-z0-9-]{0,15}")
        .expect("Invalid regex")
        .prop_map(EntityId::new)
}

/// Strategy for non-blank titles and names.
pub fn title_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z0-9][A-Za-z0-9 ]{0,22}[A-Za-z0-9]")
        .expect("Invalid regex")
}

/// Strategy for entity kinds.
pub fn kind_strategy() -> impl Strategy<Value = EntityKind> {
    prop::sample::select(EntityKind::ALL.to_vec())
}

/// Strategy for note payloads.
pub fn note_payload_strategy() -> impl Strategy<Value = NotePayload> {
    (
        title_strategy(),
        ".{0,64}",
        prop::collection::vec("[a-z]{1,8}", 0..3),
        any::<bool>(),
        any::<bool>(),
    )
        .prop_map(|(title, content, tags, is_pinned, is_favorite)| NotePayload {
            tags: tags.into_iter().map(Into::into).collect(),
            is_pinned,
            is_favorite,
            ..NotePayload::new(title, content)
        })
}

/// Strategy for tag payloads with a hex color.
pub fn tag_payload_strategy() -> impl Strategy<Value = TagPayload> {
    (title_strategy(), "#[0-9A-F]{6}").prop_map(|(name, color)| TagPayload { name, color })
}

/// Strategy for a payload of the given kind.
pub fn payload_strategy(kind: EntityKind) -> BoxedStrategy<EntityPayload> {
    match kind {
        EntityKind::Note => note_payload_strategy().prop_map(EntityPayload::from).boxed(),
        EntityKind::Folder => title_strategy()
            .prop_map(|name| {
                EntityPayload::from(FolderPayload {
                    name,
                    ..FolderPayload::default()
                })
            })
            .boxed(),
        EntityKind::Notebook => title_strategy()
            .prop_map(|name| {
                EntityPayload::from(NotebookPayload {
                    name,
                    ..NotebookPayload::default()
                })
            })
            .boxed(),
        EntityKind::Tag => tag_payload_strategy().prop_map(EntityPayload::from).boxed(),
    }
}

/// Strategy for a payload of any kind.
pub fn any_payload_strategy() -> impl Strategy<Value = EntityPayload> {
    kind_strategy().prop_flat_map(payload_strategy)
}

/// A single step of a generated edit history.
#[derive(Debug, Clone)]
pub enum EditStep {
    /// Create note `slot` with the payload.
    Create(usize, NotePayload),
    /// Replace the payload of note `slot`.
    Update(usize, NotePayload),
    /// Delete note `slot`.
    Delete(usize),
}

impl EditStep {
    /// Note slot touched by this step.
    pub fn slot(&self) -> usize {
        match self {
            Self::Create(slot, _) | Self::Update(slot, _) | Self::Delete(slot) => *slot,
        }
    }

    /// Entity id used for a slot.
    pub fn slot_id(slot: usize) -> EntityId {
        EntityId::new(format!("note-{slot}"))
    }

    /// Turns the step into a change request against `base_version`.
    pub fn to_request(&self, base_version: u64, origin: &str) -> ChangeRequest {
        match self {
            Self::Create(slot, payload) => {
                ChangeRequest::create(Self::slot_id(*slot), payload.clone(), origin)
            }
            Self::Update(slot, payload) => {
                ChangeRequest::update(Self::slot_id(*slot), payload.clone(), base_version, origin)
            }
            Self::Delete(slot) => {
                ChangeRequest::delete(EntityKind::Note, Self::slot_id(*slot), base_version, origin)
            }
        }
    }
}

/// Strategy for one edit step over `slots` notes.
pub fn edit_step_strategy(slots: usize) -> impl Strategy<Value = EditStep> {
    let slots = slots.max(1);
    prop_oneof![
        (0..slots, note_payload_strategy()).prop_map(|(s, p)| EditStep::Create(s, p)),
        (0..slots, note_payload_strategy()).prop_map(|(s, p)| EditStep::Update(s, p)),
        (0..slots).prop_map(EditStep::Delete),
    ]
}

/// Strategy for an edit history of up to `max_len` steps.
pub fn edit_sequence_strategy(slots: usize, max_len: usize) -> impl Strategy<Value = Vec<EditStep>> {
    prop::collection::vec(edit_step_strategy(slots), 1..=max_len.max(1))
}
