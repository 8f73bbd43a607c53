use std::collections::HashMap;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;

pub mod config;
pub mod db;
pub mod error;
pub mod lifecycle;
pub mod models;

use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::{
    CreateNotePayload, DEFAULT_FOLDER_COLOR, DeletedNoteWithFolder, Folder, FolderFilter, FolderPayload,
    FolderWithNotes, ListNotesQuery, Note, NoteWithFolder, UpdateNotePayload,
};

/// Build the HTTP router. CORS is left to the caller since it depends on config.
pub fn app(pool: DbPool) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/notes", get(get_notes).post(create_note))
        .route("/api/notes/:id", get(get_note).put(update_note).delete(delete_note))
        .route("/api/history", get(get_history))
        .route("/api/history/expired", delete(purge_history))
        .route("/api/history/:id", post(restore_note))
        .route("/api/folders", get(get_folders).post(create_folder))
        .route(
            "/api/folders/:id",
            get(get_folder).put(update_folder).delete(delete_folder),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(pool)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// --- notes ---

async fn get_notes(
    State(pool): State<DbPool>,
    query: Result<Query<ListNotesQuery>, QueryRejection>,
) -> AppResult<Json<Vec<Note>>> {
    let Query(query) = query?;
    let filter = FolderFilter::parse(query.folder.as_deref())?;
    let notes = db::get_notes_db(&pool, filter, query.q.as_deref()).await?;
    Ok(Json(notes))
}

async fn get_note(State(pool): State<DbPool>, Path(id): Path<i64>) -> AppResult<Json<NoteWithFolder>> {
    let note = db::get_note_db(&pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Note", id))?;
    Ok(Json(with_folder(&pool, note).await?))
}

async fn create_note(
    State(pool): State<DbPool>,
    payload: Result<Json<CreateNotePayload>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Note>)> {
    let Json(payload) = payload?;
    let note = lifecycle::create_note(&pool, payload).await?;
    Ok((StatusCode::CREATED, Json(note)))
}

async fn update_note(
    State(pool): State<DbPool>,
    Path(id): Path<i64>,
    payload: Result<Json<UpdateNotePayload>, JsonRejection>,
) -> AppResult<Json<NoteWithFolder>> {
    let Json(payload) = payload?;
    let note = lifecycle::update_note(&pool, id, payload).await?;
    Ok(Json(with_folder(&pool, note).await?))
}

async fn delete_note(State(pool): State<DbPool>, Path(id): Path<i64>) -> AppResult<StatusCode> {
    lifecycle::delete_note(&pool, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn with_folder(pool: &DbPool, note: Note) -> AppResult<NoteWithFolder> {
    let folder = match note.folder_id {
        Some(folder_id) => db::get_folder_db(pool, folder_id).await?,
        None => None,
    };
    Ok(NoteWithFolder { note, folder })
}

// --- history ---

async fn get_history(State(pool): State<DbPool>) -> AppResult<Json<Vec<DeletedNoteWithFolder>>> {
    let folders: HashMap<i64, Folder> = db::get_folders_db(&pool)
        .await?
        .into_iter()
        .map(|folder| (folder.id, folder))
        .collect();

    let response = lifecycle::list_deleted(&pool)
        .await?
        .into_iter()
        .map(|deleted_note| {
            let folder = deleted_note.folder_id.and_then(|id| folders.get(&id).cloned());
            DeletedNoteWithFolder { deleted_note, folder }
        })
        .collect();
    Ok(Json(response))
}

async fn restore_note(State(pool): State<DbPool>, Path(id): Path<i64>) -> AppResult<Json<Note>> {
    Ok(Json(lifecycle::restore_note(&pool, id).await?))
}

async fn purge_history(State(pool): State<DbPool>) -> AppResult<Json<Value>> {
    let purged = lifecycle::purge_expired(&pool).await?;
    Ok(Json(json!({ "purged": purged })))
}

// --- folders ---

async fn get_folders(State(pool): State<DbPool>) -> AppResult<Json<Vec<FolderWithNotes>>> {
    let folders = db::get_folders_db(&pool).await?;
    let mut by_folder: HashMap<i64, Vec<Note>> = HashMap::new();
    for note in db::get_notes_db(&pool, FolderFilter::All, None).await? {
        if let Some(folder_id) = note.folder_id {
            // already in listing order, pushing keeps it
            by_folder.entry(folder_id).or_default().push(note);
        }
    }

    let response = folders
        .into_iter()
        .map(|folder| {
            let notes = by_folder.remove(&folder.id).unwrap_or_default();
            FolderWithNotes { folder, notes }
        })
        .collect();
    Ok(Json(response))
}

async fn get_folder(State(pool): State<DbPool>, Path(id): Path<i64>) -> AppResult<Json<FolderWithNotes>> {
    let folder = db::get_folder_db(&pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Folder", id))?;
    let notes = db::get_notes_db(&pool, FolderFilter::Folder(id), None).await?;
    Ok(Json(FolderWithNotes { folder, notes }))
}

async fn create_folder(
    State(pool): State<DbPool>,
    payload: Result<Json<FolderPayload>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Folder>)> {
    let Json(payload) = payload?;
    let changes = payload.validate()?;
    let color = changes.color.as_deref().unwrap_or(DEFAULT_FOLDER_COLOR);
    let folder = db::create_folder_db(&pool, &changes.name, color, chrono::Utc::now()).await?;
    tracing::info!(folder_id = folder.id, "Folder created");
    Ok((StatusCode::CREATED, Json(folder)))
}

async fn update_folder(
    State(pool): State<DbPool>,
    Path(id): Path<i64>,
    payload: Result<Json<FolderPayload>, JsonRejection>,
) -> AppResult<Json<Folder>> {
    let Json(payload) = payload?;
    let changes = payload.validate()?;
    let folder = db::update_folder_db(&pool, id, &changes, chrono::Utc::now())
        .await?
        .ok_or_else(|| AppError::not_found("Folder", id))?;
    Ok(Json(folder))
}

async fn delete_folder(State(pool): State<DbPool>, Path(id): Path<i64>) -> AppResult<StatusCode> {
    lifecycle::delete_folder(&pool, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
