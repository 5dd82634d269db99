//! Entity model: identifiers, kinds, payloads and stored records.

mod id;
mod kind;
mod payload;
mod record;

pub use id::{EntityId, EntityKey};
pub use kind::EntityKind;
pub use payload::{
    EntityPayload, FolderPayload, NotePayload, NotebookPayload, TagPayload, DEFAULT_TAG_COLOR,
};
pub use record::Entity;
