//! Entity kinds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kinds of entity subject to versioned synchronization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// A note.
    Note,
    /// A folder (may nest under another folder).
    Folder,
    /// A notebook.
    Notebook,
    /// A tag.
    Tag,
}

impl EntityKind {
    /// Every kind, in wire order.
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Note,
        EntityKind::Folder,
        EntityKind::Notebook,
        EntityKind::Tag,
    ];

    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            EntityKind::Note => "note",
            EntityKind::Folder => "folder",
            EntityKind::Notebook => "notebook",
            EntityKind::Tag => "tag",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "note" | "notes" => Ok(EntityKind::Note),
            "folder" | "folders" => Ok(EntityKind::Folder),
            "notebook" | "notebooks" => Ok(EntityKind::Notebook),
            "tag" | "tags" => Ok(EntityKind::Tag),
            other => Err(format!("unknown entity kind: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_plurals() {
        assert_eq!("notes".parse::<EntityKind>(), Ok(EntityKind::Note));
        assert_eq!("Folder".parse::<EntityKind>(), Ok(EntityKind::Folder));
        assert!("page".parse::<EntityKind>().is_err());
    }

    #[test]
    fn display_matches_wire_name() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.to_string().parse::<EntityKind>(), Ok(kind));
        }
    }
}
