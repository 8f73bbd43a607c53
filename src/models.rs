use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;

use crate::error::{AppError, AppResult};

pub const DEFAULT_FOLDER_COLOR: &str = "#3B82F6";

// An active note
#[derive(Serialize, FromRow, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub pinned: bool,
    pub tags: String, // comma-separated, stored as given
    pub folder_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, FromRow, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub id: i64,
    pub name: String,
    pub color: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Tombstone left behind when a note is deleted
#[derive(Serialize, FromRow, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeletedNote {
    pub id: i64,
    pub original_id: i64,
    pub title: String,
    pub content: String,
    pub pinned: bool,
    pub tags: String,
    pub folder_id: Option<i64>,
    pub deleted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// The content fields a note carries through delete and restore.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteSnapshot {
    pub title: String,
    pub content: String,
    pub pinned: bool,
    pub tags: String,
    pub folder_id: Option<i64>,
}

impl Note {
    pub fn snapshot(&self) -> NoteSnapshot {
        NoteSnapshot {
            title: self.title.clone(),
            content: self.content.clone(),
            pinned: self.pinned,
            tags: self.tags.clone(),
            folder_id: self.folder_id,
        }
    }

    /// Case-insensitive substring match over title, content and tags.
    /// `needle` must already be lowercased.
    pub fn matches(&self, needle: &str) -> bool {
        [&self.title, &self.content, &self.tags]
            .iter()
            .any(|field| field.to_lowercase().contains(needle))
    }
}

impl DeletedNote {
    pub fn snapshot(&self) -> NoteSnapshot {
        NoteSnapshot {
            title: self.title.clone(),
            content: self.content.clone(),
            pinned: self.pinned,
            tags: self.tags.clone(),
            folder_id: self.folder_id,
        }
    }
}

// Single-note responses embed the folder the note lives in
#[derive(Serialize, Debug)]
pub struct NoteWithFolder {
    #[serde(flatten)]
    pub note: Note,
    pub folder: Option<Folder>,
}

#[derive(Serialize, Debug)]
pub struct DeletedNoteWithFolder {
    #[serde(flatten)]
    pub deleted_note: DeletedNote,
    pub folder: Option<Folder>,
}

#[derive(Serialize, Debug)]
pub struct FolderWithNotes {
    #[serde(flatten)]
    pub folder: Folder,
    pub notes: Vec<Note>,
}

// Request bodies. Required fields are still `Option` so that a missing
// field becomes a 400 with our own message instead of a body rejection.

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreateNotePayload {
    pub title: Option<String>,
    pub content: Option<String>,
    pub pinned: Option<bool>,
    pub tags: Option<String>,
    pub folder_id: Option<i64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateNotePayload {
    pub title: Option<String>,
    pub content: Option<String>,
    pub pinned: Option<bool>,
    pub tags: Option<String>,
    /// Outer `None`: field absent, keep the folder. `Some(None)`: explicit null.
    #[serde(default, deserialize_with = "present")]
    pub folder_id: Option<Option<i64>>,
}

#[derive(Deserialize, Debug, Default)]
pub struct FolderPayload {
    pub name: Option<String>,
    pub color: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct ListNotesQuery {
    pub folder: Option<String>,
    pub q: Option<String>,
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// --- validated inputs ---

/// Field changes accepted by an update, after validation.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteChanges {
    pub title: String,
    pub content: String,
    pub pinned: Option<bool>,
    pub tags: Option<String>,
    pub folder_id: Option<Option<i64>>,
}

impl NoteChanges {
    /// Resolve the changes against the stored note.
    pub fn apply_to(&self, note: &Note) -> NoteSnapshot {
        NoteSnapshot {
            title: self.title.clone(),
            content: self.content.clone(),
            pinned: self.pinned.unwrap_or(note.pinned),
            tags: self.tags.clone().unwrap_or_else(|| note.tags.clone()),
            folder_id: self.folder_id.unwrap_or(note.folder_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FolderChanges {
    pub name: String,
    pub color: Option<String>,
}

fn required(field: &str, value: Option<String>) -> AppResult<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(AppError::Validation(format!("{field} cannot be empty"))),
    }
}

impl CreateNotePayload {
    pub fn validate(self) -> AppResult<NoteSnapshot> {
        let title = required("title", self.title)?;
        let content = required("content", self.content)?;
        Ok(NoteSnapshot {
            title,
            content,
            pinned: self.pinned.unwrap_or(false),
            tags: self.tags.unwrap_or_default(),
            folder_id: self.folder_id,
        })
    }
}

impl UpdateNotePayload {
    pub fn validate(self) -> AppResult<NoteChanges> {
        let title = required("title", self.title)?;
        let content = required("content", self.content)?;
        Ok(NoteChanges {
            title,
            content,
            pinned: self.pinned,
            tags: self.tags,
            folder_id: self.folder_id,
        })
    }
}

impl FolderPayload {
    pub fn validate(self) -> AppResult<FolderChanges> {
        let name = required("name", self.name)?;
        Ok(FolderChanges { name, color: self.color })
    }
}

/// Which notes a listing covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderFilter {
    All,
    Uncategorized,
    Folder(i64),
}

impl FolderFilter {
    pub fn parse(raw: Option<&str>) -> AppResult<Self> {
        match raw.map(str::trim) {
            None | Some("") => Ok(FolderFilter::All),
            Some("uncategorized") => Ok(FolderFilter::Uncategorized),
            Some(id) => id
                .parse()
                .map(FolderFilter::Folder)
                .map_err(|_| AppError::Validation(format!("invalid folder filter: {id}"))),
        }
    }
}
