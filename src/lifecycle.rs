//! Note lifecycle: an active note becomes a tombstone when deleted, and a
//! tombstone becomes a brand new note when restored within the retention
//! window. Expiry is lazy: nothing sweeps tombstones, every read checks the
//! deadline instead.
//!
//! Every multi-step transition runs in a single store transaction. Dropping
//! the transaction on an early return rolls it back.

use chrono::{DateTime, Duration, Utc};
use sqlx::SqliteConnection;

use crate::db::{self, DbPool};
use crate::error::{AppError, AppResult};
use crate::models::{CreateNotePayload, DeletedNote, Folder, Note, UpdateNotePayload};

pub const RETENTION_DAYS: i64 = 30;

pub fn retention() -> Duration {
    Duration::days(RETENTION_DAYS)
}

/// Deadline for a note deleted at `deleted_at`.
pub fn expiry_for(deleted_at: DateTime<Utc>) -> DateTime<Utc> {
    deleted_at + retention()
}

/// A tombstone as seen at a particular instant.
#[derive(Debug, Clone, PartialEq)]
pub enum TombstoneState {
    /// Still restorable.
    Pending(DeletedNote),
    /// Past `expires_at`. Logically gone even while the row exists.
    Expired(DeletedNote),
}

impl TombstoneState {
    pub fn classify(tombstone: DeletedNote, now: DateTime<Utc>) -> Self {
        if tombstone.expires_at < now {
            TombstoneState::Expired(tombstone)
        } else {
            TombstoneState::Pending(tombstone)
        }
    }

    /// The tombstone to restore from, or `Expired` if the window has closed.
    pub fn into_restorable(self) -> AppResult<DeletedNote> {
        match self {
            TombstoneState::Pending(tombstone) => Ok(tombstone),
            TombstoneState::Expired(tombstone) => Err(AppError::Expired {
                id: tombstone.id,
                expired_at: tombstone.expires_at,
            }),
        }
    }
}

/// Outcome of deleting a folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FolderCascade {
    pub folder_id: i64,
    pub reassigned_notes: u64,
    pub released_tombstones: u64,
}

async fn ensure_folder(conn: &mut SqliteConnection, folder_id: i64) -> AppResult<Folder> {
    db::get_folder_db(&mut *conn, folder_id)
        .await?
        .ok_or_else(|| AppError::not_found("Folder", folder_id))
}

#[tracing::instrument(skip_all)]
pub async fn create_note(pool: &DbPool, payload: CreateNotePayload) -> AppResult<Note> {
    let snapshot = payload.validate()?;

    // the folder check lives in the insert itself
    let note = db::create_note_db(pool, &snapshot, Utc::now())
        .await?
        .ok_or_else(|| AppError::not_found("Folder", snapshot.folder_id.unwrap_or_default()))?;

    tracing::info!(note_id = note.id, folder_id = ?note.folder_id, "Note created");
    Ok(note)
}

/// Title and content are always required; the optional fields overwrite
/// only when present.
#[tracing::instrument(skip(pool, payload))]
pub async fn update_note(pool: &DbPool, note_id: i64, payload: UpdateNotePayload) -> AppResult<Note> {
    let changes = payload.validate()?;
    let now = Utc::now();

    // Each transition opens with a write so the transaction holds the write
    // lock before it reads. A deferred SQLite transaction that reads first
    // cannot upgrade while another writer is active and fails as busy.
    let mut tx = pool.begin().await?;
    if !db::touch_note_db(&mut *tx, note_id, now).await? {
        return Err(AppError::not_found("Note", note_id));
    }

    let existing = db::get_note_db(&mut *tx, note_id)
        .await?
        .ok_or_else(|| AppError::not_found("Note", note_id))?;

    let resolved = changes.apply_to(&existing);
    if let Some(folder_id) = resolved.folder_id {
        ensure_folder(&mut tx, folder_id).await?;
    }

    let note = db::update_note_db(&mut *tx, note_id, &resolved, now)
        .await?
        .ok_or_else(|| AppError::not_found("Note", note_id))?;
    tx.commit().await?;

    tracing::debug!(note_id, "Note updated");
    Ok(note)
}

pub async fn delete_note(pool: &DbPool, note_id: i64) -> AppResult<DeletedNote> {
    delete_note_at(pool, note_id, Utc::now()).await
}

/// Replace the note with a tombstone deleted at `now`.
///
/// Of two concurrent deletes of the same note, the loser gets `NotFound`.
#[tracing::instrument(skip(pool))]
pub async fn delete_note_at(pool: &DbPool, note_id: i64, now: DateTime<Utc>) -> AppResult<DeletedNote> {
    let mut tx = pool.begin().await?;

    let note = db::take_note_db(&mut *tx, note_id)
        .await?
        .ok_or_else(|| AppError::not_found("Note", note_id))?;

    let tombstone =
        db::insert_deleted_note_db(&mut *tx, note.id, &note.snapshot(), now, expiry_for(now)).await?;
    tx.commit().await?;

    tracing::info!(
        note_id,
        tombstone_id = tombstone.id,
        expires_at = %tombstone.expires_at,
        "Note moved to history"
    );
    Ok(tombstone)
}

pub async fn restore_note(pool: &DbPool, deleted_note_id: i64) -> AppResult<Note> {
    restore_note_at(pool, deleted_note_id, Utc::now()).await
}

/// Re-create a note from a tombstone. The note gets a new id and fresh
/// timestamps; the tombstone is removed.
///
/// The tombstone is claimed by deleting it first. An expired one is put
/// back by the rollback when the transaction drops.
#[tracing::instrument(skip(pool))]
pub async fn restore_note_at(pool: &DbPool, deleted_note_id: i64, now: DateTime<Utc>) -> AppResult<Note> {
    let mut tx = pool.begin().await?;

    let tombstone = db::take_deleted_note_db(&mut *tx, deleted_note_id)
        .await?
        .ok_or_else(|| AppError::not_found("DeletedNote", deleted_note_id))?;

    let tombstone = TombstoneState::classify(tombstone, now)
        .into_restorable()
        .inspect_err(|_| tracing::warn!(deleted_note_id, "Restore rejected, note expired"))?;

    let folder_id = tombstone.folder_id.unwrap_or_default();
    let note = db::create_note_db(&mut *tx, &tombstone.snapshot(), now)
        .await?
        .ok_or_else(|| AppError::not_found("Folder", folder_id))?;
    tx.commit().await?;

    tracing::info!(
        deleted_note_id,
        original_id = tombstone.original_id,
        note_id = note.id,
        "Note restored"
    );
    Ok(note)
}

pub async fn list_deleted(pool: &DbPool) -> AppResult<Vec<DeletedNote>> {
    list_deleted_at(pool, Utc::now()).await
}

pub async fn list_deleted_at(pool: &DbPool, now: DateTime<Utc>) -> AppResult<Vec<DeletedNote>> {
    Ok(db::get_unexpired_deleted_notes_db(pool, now).await?)
}

pub async fn purge_expired(pool: &DbPool) -> AppResult<u64> {
    purge_expired_at(pool, Utc::now()).await
}

/// Physically remove tombstones that are already logically gone.
#[tracing::instrument(skip(pool))]
pub async fn purge_expired_at(pool: &DbPool, now: DateTime<Utc>) -> AppResult<u64> {
    let purged = db::purge_expired_deleted_notes_db(pool, now).await?;
    tracing::info!(purged, "Expired notes purged");
    Ok(purged)
}

/// Move the folder's notes to uncategorized, then delete the folder.
///
/// Tombstones pointing at the folder are released too, so a later restore
/// cannot produce a note that references a folder which no longer exists.
#[tracing::instrument(skip(pool))]
pub async fn delete_folder(pool: &DbPool, folder_id: i64) -> AppResult<FolderCascade> {
    let mut tx = pool.begin().await?;

    // reassignment is the opening write; an unknown folder rolls it back below
    let reassigned_notes = db::clear_folder_from_notes_db(&mut *tx, folder_id, Utc::now()).await?;
    let released_tombstones = db::clear_folder_from_deleted_notes_db(&mut *tx, folder_id).await?;

    if !db::delete_folder_db(&mut *tx, folder_id).await? {
        return Err(AppError::not_found("Folder", folder_id));
    }
    tx.commit().await?;

    tracing::info!(folder_id, reassigned_notes, released_tombstones, "Folder deleted");
    Ok(FolderCascade {
        folder_id,
        reassigned_notes,
        released_tombstones,
    })
}
