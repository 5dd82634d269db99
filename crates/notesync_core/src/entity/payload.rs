//! Kind-specific entity payloads.

use crate::entity::{EntityId, EntityKind};
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

/// Color assigned to tags created without one.
pub const DEFAULT_TAG_COLOR: &str = "#3B82F6";

/// Note body and flags.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotePayload {
    /// Title; required and stored trimmed.
    pub title: String,
    /// Rich-text content, stored verbatim.
    pub content: String,
    /// Containing folder.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<EntityId>,
    /// Tag ids.
    pub tags: Vec<EntityId>,
    /// Pinned to the top of lists.
    pub is_pinned: bool,
    /// Hidden from the default list.
    pub is_archived: bool,
    /// Marked as favorite.
    pub is_favorite: bool,
}

impl NotePayload {
    /// Creates a note with a title and content.
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            ..Self::default()
        }
    }
}

/// A folder, optionally nested.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FolderPayload {
    /// Display name.
    pub name: String,
    /// Parent folder.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<EntityId>,
    /// Display color.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// A notebook.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotebookPayload {
    /// Display name.
    pub name: String,
    /// Free-form description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TagPayload {
    /// Display name.
    pub name: String,
    /// Display color.
    pub color: String,
}

impl Default for TagPayload {
    fn default() -> Self {
        Self {
            name: String::new(),
            color: DEFAULT_TAG_COLOR.to_string(),
        }
    }
}

/// The payload of an entity, tagged with its kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EntityPayload {
    /// Note payload.
    Note(NotePayload),
    /// Folder payload.
    Folder(FolderPayload),
    /// Notebook payload.
    Notebook(NotebookPayload),
    /// Tag payload.
    Tag(TagPayload),
}

impl EntityPayload {
    /// Returns the kind this payload belongs to.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityPayload::Note(_) => EntityKind::Note,
            EntityPayload::Folder(_) => EntityKind::Folder,
            EntityPayload::Notebook(_) => EntityKind::Notebook,
            EntityPayload::Tag(_) => EntityKind::Tag,
        }
    }

    /// Validates required fields and returns the stored form.
    ///
    /// Titles and names are trimmed; a blank tag color falls back to
    /// [`DEFAULT_TAG_COLOR`].
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidPayload`] if a required field is blank.
    pub fn normalized(self) -> CoreResult<Self> {
        match self {
            EntityPayload::Note(mut note) => {
                note.title = required(&note.title, "note title")?;
                Ok(EntityPayload::Note(note))
            }
            EntityPayload::Folder(mut folder) => {
                folder.name = required(&folder.name, "folder name")?;
                Ok(EntityPayload::Folder(folder))
            }
            EntityPayload::Notebook(mut notebook) => {
                notebook.name = required(&notebook.name, "notebook name")?;
                Ok(EntityPayload::Notebook(notebook))
            }
            EntityPayload::Tag(mut tag) => {
                tag.name = required(&tag.name, "tag name")?;
                if tag.color.trim().is_empty() {
                    tag.color = DEFAULT_TAG_COLOR.to_string();
                }
                Ok(EntityPayload::Tag(tag))
            }
        }
    }

    /// Short human-readable label (title or name).
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            EntityPayload::Note(note) => &note.title,
            EntityPayload::Folder(folder) => &folder.name,
            EntityPayload::Notebook(notebook) => &notebook.name,
            EntityPayload::Tag(tag) => &tag.name,
        }
    }
}

fn required(value: &str, field: &str) -> CoreResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CoreError::invalid_payload(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

impl From<NotePayload> for EntityPayload {
    fn from(value: NotePayload) -> Self {
        EntityPayload::Note(value)
    }
}

impl From<FolderPayload> for EntityPayload {
    fn from(value: FolderPayload) -> Self {
        EntityPayload::Folder(value)
    }
}

impl From<NotebookPayload> for EntityPayload {
    fn from(value: NotebookPayload) -> Self {
        EntityPayload::Notebook(value)
    }
}

impl From<TagPayload> for EntityPayload {
    fn from(value: TagPayload) -> Self {
        EntityPayload::Tag(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_title_is_trimmed() {
        let payload = EntityPayload::from(NotePayload::new("  Groceries \n", "milk"))
            .normalized()
            .unwrap();
        assert_eq!(payload.label(), "Groceries");
    }

    #[test]
    fn blank_note_title_rejected() {
        let err = EntityPayload::from(NotePayload::new("   ", "body"))
            .normalized()
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn tag_color_defaults() {
        let tag = TagPayload {
            name: "work".into(),
            color: " ".into(),
        };
        let EntityPayload::Tag(tag) = EntityPayload::from(tag).normalized().unwrap() else {
            panic!("expected tag");
        };
        assert_eq!(tag.color, DEFAULT_TAG_COLOR);
        assert_eq!(TagPayload::default().color, DEFAULT_TAG_COLOR);
    }

    #[test]
    fn kind_matches_variant() {
        assert_eq!(
            EntityPayload::from(FolderPayload::default()).kind(),
            EntityKind::Folder
        );
        assert_eq!(
            EntityPayload::from(NotebookPayload::default()).kind(),
            EntityKind::Notebook
        );
    }

    #[test]
    fn cbor_carries_kind_tag() {
        let payload = EntityPayload::from(NotePayload {
            folder_id: Some(EntityId::new("f1")),
            is_pinned: true,
            ..NotePayload::new("draft", "")
        });
        let mut bytes = Vec::new();
        ciborium::into_writer(&payload, &mut bytes).unwrap();
        let decoded: EntityPayload = ciborium::from_reader(bytes.as_slice()).unwrap();
        assert_eq!(decoded, payload);
    }
}
