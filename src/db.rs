// src/db.rs
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqliteExecutor, SqlitePool};

use crate::models::{DeletedNote, Folder, FolderChanges, FolderFilter, Note, NoteSnapshot};

// --- connection ---
pub type DbPool = SqlitePool;

// --- column lists ---
const NOTE_COLUMNS: &str = "id, title, content, pinned, tags, folder_id, created_at, updated_at";
const FOLDER_COLUMNS: &str = "id, name, color, created_at, updated_at";
const DELETED_NOTE_COLUMNS: &str =
    "id, original_id, title, content, pinned, tags, folder_id, deleted_at, expires_at";

// pinned first, then newest; id breaks ties between notes created in the same instant
const NOTE_ORDER: &str = "ORDER BY pinned DESC, created_at DESC, id DESC";

// --- init ---
pub async fn init_db(database_url: &str) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool_options = if is_in_memory(database_url) {
        // each connection to :memory: opens its own empty database, so keep exactly one alive
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(8)
    };

    tracing::info!(database_url, "Connecting to database");
    pool_options.connect_with(options).await
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

pub async fn migrate(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database migrations applied");
    Ok(())
}

// --- notes ---

/// Insert a note. Returns `None` when `folder_id` names a folder that does not exist.
pub async fn create_note_db<'e, E>(
    executor: E,
    snapshot: &NoteSnapshot,
    now: DateTime<Utc>,
) -> Result<Option<Note>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let query = format!(
        "INSERT INTO notes (title, content, pinned, tags, folder_id, created_at, updated_at)
         SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?6
         WHERE ?5 IS NULL OR EXISTS (SELECT 1 FROM folders WHERE id = ?5)
         RETURNING {NOTE_COLUMNS}"
    );
    sqlx::query_as::<_, Note>(&query)
        .bind(&snapshot.title)
        .bind(&snapshot.content)
        .bind(snapshot.pinned)
        .bind(&snapshot.tags)
        .bind(snapshot.folder_id)
        .bind(now)
        .fetch_optional(executor)
        .await
}

pub async fn get_note_db<'e, E>(executor: E, note_id: i64) -> Result<Option<Note>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let query = format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = ?1");
    sqlx::query_as::<_, Note>(&query)
        .bind(note_id)
        .fetch_optional(executor)
        .await
}

pub async fn get_notes_db<'e, E>(
    executor: E,
    filter: FolderFilter,
    search: Option<&str>,
) -> Result<Vec<Note>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let mut builder = QueryBuilder::<Sqlite>::new(format!("SELECT {NOTE_COLUMNS} FROM notes WHERE 1=1"));

    match filter {
        FolderFilter::All => {}
        FolderFilter::Uncategorized => {
            builder.push(" AND folder_id IS NULL");
        }
        FolderFilter::Folder(folder_id) => {
            builder.push(" AND folder_id = ").push_bind(folder_id);
        }
    }

    builder.push(" ").push(NOTE_ORDER);
    let notes = builder.build_query_as::<Note>().fetch_all(executor).await?;

    // SQLite folds case for ASCII only, so the substring match happens here
    Ok(match search.map(str::trim).filter(|q| !q.is_empty()) {
        Some(q) => {
            let needle = q.to_lowercase();
            notes.into_iter().filter(|note| note.matches(&needle)).collect()
        }
        None => notes,
    })
}

pub async fn update_note_db<'e, E>(
    executor: E,
    note_id: i64,
    snapshot: &NoteSnapshot,
    now: DateTime<Utc>,
) -> Result<Option<Note>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let query = format!(
        "UPDATE notes
         SET title = ?1, content = ?2, pinned = ?3, tags = ?4, folder_id = ?5, updated_at = ?6
         WHERE id = ?7
         RETURNING {NOTE_COLUMNS}"
    );
    sqlx::query_as::<_, Note>(&query)
        .bind(&snapshot.title)
        .bind(&snapshot.content)
        .bind(snapshot.pinned)
        .bind(&snapshot.tags)
        .bind(snapshot.folder_id)
        .bind(now)
        .bind(note_id)
        .fetch_optional(executor)
        .await
}

/// Refresh `updated_at`. Returns `false` if the note does not exist.
///
/// Run first in a transaction, it takes the write lock before anything is read.
pub async fn touch_note_db<'e, E>(executor: E, note_id: i64, now: DateTime<Utc>) -> Result<bool, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query("UPDATE notes SET updated_at = ?1 WHERE id = ?2")
        .bind(now)
        .bind(note_id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Delete a note and hand back the removed row. Of two concurrent callers
/// only one gets the row; the other sees `None`.
pub async fn take_note_db<'e, E>(executor: E, note_id: i64) -> Result<Option<Note>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let query = format!("DELETE FROM notes WHERE id = ?1 RETURNING {NOTE_COLUMNS}");
    sqlx::query_as::<_, Note>(&query)
        .bind(note_id)
        .fetch_optional(executor)
        .await
}

/// Move every note of a folder to uncategorized. Returns the number of notes moved.
pub async fn clear_folder_from_notes_db<'e, E>(
    executor: E,
    folder_id: i64,
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query("UPDATE notes SET folder_id = NULL, updated_at = ?1 WHERE folder_id = ?2")
        .bind(now)
        .bind(folder_id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

// --- folders ---

pub async fn create_folder_db<'e, E>(
    executor: E,
    name: &str,
    color: &str,
    now: DateTime<Utc>,
) -> Result<Folder, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let query = format!(
        "INSERT INTO folders (name, color, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?3)
         RETURNING {FOLDER_COLUMNS}"
    );
    sqlx::query_as::<_, Folder>(&query)
        .bind(name)
        .bind(color)
        .bind(now)
        .fetch_one(executor)
        .await
}

pub async fn get_folder_db<'e, E>(executor: E, folder_id: i64) -> Result<Option<Folder>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let query = format!("SELECT {FOLDER_COLUMNS} FROM folders WHERE id = ?1");
    sqlx::query_as::<_, Folder>(&query)
        .bind(folder_id)
        .fetch_optional(executor)
        .await
}

pub async fn get_folders_db<'e, E>(executor: E) -> Result<Vec<Folder>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let query = format!("SELECT {FOLDER_COLUMNS} FROM folders ORDER BY created_at DESC, id DESC");
    sqlx::query_as::<_, Folder>(&query).fetch_all(executor).await
}

/// Rename and optionally recolor a folder. An absent color keeps the current one.
pub async fn update_folder_db<'e, E>(
    executor: E,
    folder_id: i64,
    changes: &FolderChanges,
    now: DateTime<Utc>,
) -> Result<Option<Folder>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let query = format!(
        "UPDATE folders
         SET name = ?1, color = COALESCE(?2, color), updated_at = ?3
         WHERE id = ?4
         RETURNING {FOLDER_COLUMNS}"
    );
    sqlx::query_as::<_, Folder>(&query)
        .bind(&changes.name)
        .bind(changes.color.as_deref())
        .bind(now)
        .bind(folder_id)
        .fetch_optional(executor)
        .await
}

pub async fn delete_folder_db<'e, E>(executor: E, folder_id: i64) -> Result<bool, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query("DELETE FROM folders WHERE id = ?1")
        .bind(folder_id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

// --- deleted notes ---

pub async fn insert_deleted_note_db<'e, E>(
    executor: E,
    original_id: i64,
    snapshot: &NoteSnapshot,
    deleted_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Result<DeletedNote, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let query = format!(
        "INSERT INTO deleted_notes
            (original_id, title, content, pinned, tags, folder_id, deleted_at, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         RETURNING {DELETED_NOTE_COLUMNS}"
    );
    sqlx::query_as::<_, DeletedNote>(&query)
        .bind(original_id)
        .bind(&snapshot.title)
        .bind(&snapshot.content)
        .bind(snapshot.pinned)
        .bind(&snapshot.tags)
        .bind(snapshot.folder_id)
        .bind(deleted_at)
        .bind(expires_at)
        .fetch_one(executor)
        .await
}

/// Fetch a tombstone regardless of expiry; callers decide what an expired one means.
pub async fn get_deleted_note_db<'e, E>(
    executor: E,
    deleted_note_id: i64,
) -> Result<Option<DeletedNote>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let query = format!("SELECT {DELETED_NOTE_COLUMNS} FROM deleted_notes WHERE id = ?1");
    sqlx::query_as::<_, DeletedNote>(&query)
        .bind(deleted_note_id)
        .fetch_optional(executor)
        .await
}

/// Tombstones still inside their retention window, most recently deleted first.
pub async fn get_unexpired_deleted_notes_db<'e, E>(
    executor: E,
    now: DateTime<Utc>,
) -> Result<Vec<DeletedNote>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let query = format!(
        "SELECT {DELETED_NOTE_COLUMNS} FROM deleted_notes
         WHERE expires_at > ?1
         ORDER BY deleted_at DESC, id DESC"
    );
    sqlx::query_as::<_, DeletedNote>(&query)
        .bind(now)
        .fetch_all(executor)
        .await
}

/// Delete a tombstone and hand back the removed row, expired or not.
pub async fn take_deleted_note_db<'e, E>(
    executor: E,
    deleted_note_id: i64,
) -> Result<Option<DeletedNote>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let query = format!("DELETE FROM deleted_notes WHERE id = ?1 RETURNING {DELETED_NOTE_COLUMNS}");
    sqlx::query_as::<_, DeletedNote>(&query)
        .bind(deleted_note_id)
        .fetch_optional(executor)
        .await
}

pub async fn purge_expired_deleted_notes_db<'e, E>(
    executor: E,
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query("DELETE FROM deleted_notes WHERE expires_at <= ?1")
        .bind(now)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

pub async fn clear_folder_from_deleted_notes_db<'e, E>(
    executor: E,
    folder_id: i64,
) -> Result<u64, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query("UPDATE deleted_notes SET folder_id = NULL WHERE folder_id = ?1")
        .bind(folder_id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_urls_are_detected() {
        assert!(is_in_memory("sqlite::memory:"));
        assert!(is_in_memory("sqlite://file:notes?mode=memory&cache=shared"));
        assert!(!is_in_memory("sqlite://notes.db"));
    }
}
