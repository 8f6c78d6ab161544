use std::path::Path as FsPath;

use axum::extract::{Json, Multipart, Path, State};
use axum::http::StatusCode;
use chrono::{NaiveDateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::audit::{self, UPDATE_TYPE_DOCUMENT};
use crate::auth::{guard::authorize, Requester};
use crate::error::{AppError, AppResult};
use crate::models::{Document, NewDocument};
use crate::response::{to_iso, DataResponse, ListResponse, MessageResponse};
use crate::routes::cases::find_case;
use crate::schema::documents;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct UpdateDocumentRequest {
    pub title: Option<String>,
    pub document_type: Option<String>,
}

#[derive(AsChangeset)]
#[diesel(table_name = documents)]
struct DocumentChangeset {
    title: Option<String>,
    document_type: Option<String>,
    updated_at: NaiveDateTime,
}

#[derive(Serialize)]
pub struct DocumentResponse {
    pub id: Uuid,
    pub case_id: Uuid,
    pub title: String,
    pub document_type: String,
    pub file_url: String,
    pub storage_key: String,
    pub uploaded_by: Uuid,
    pub created_at: String,
    pub updated_at: String,
}

struct AttachRequest {
    bytes: Vec<u8>,
    extension: String,
    title: String,
    document_type: String,
}

pub async fn upload_document(
    State(state): State<AppState>,
    Path(case_id): Path<Uuid>,
    requester: Requester,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<DataResponse<DocumentResponse>>)> {
    let request = read_attach_request(&mut multipart).await?;

    {
        let mut conn = state.db()?;
        let case = find_case(&mut conn, case_id)?;
        authorize(
            &requester,
            case.owner_id,
            "Not authorized to upload to this case",
        )?;
    }

    // Hardened attach: the durable secure URL is resolved before any metadata
    // is written, so a Document row never holds a transient locator. Each
    // failure below leaves an enumerated state; an orphaned blob is logged
    // with its key for the reconciliation sweep.
    let namespace = format!("cases/{case_id}/documents");
    let blob = state
        .storage
        .put(request.bytes, &namespace, &request.extension)
        .await
        .map_err(|err| {
            error!(error = %err, case_id = %case_id, "blob upload failed");
            AppError::store("Failed to store document")
        })?;

    let secure_url = state
        .storage
        .resolve_secure_url(&blob.opaque_id)
        .await
        .map_err(|err| {
            error!(
                error = %err,
                storage_key = %blob.opaque_id,
                "secure URL resolution failed, blob orphaned pending sweep"
            );
            AppError::store("Failed to store document")
        })?;

    let doc_id = Uuid::new_v4();
    let title = request.title.clone();
    let mut conn = state.db()?;
    let document = conn
        .transaction::<Document, AppError, _>(|conn| {
            let new_document = NewDocument {
                id: doc_id,
                case_id,
                title: request.title,
                document_type: request.document_type,
                file_url: secure_url,
                storage_key: blob.opaque_id.clone(),
                uploaded_by: requester.id,
            };
            diesel::insert_into(documents::table)
                .values(&new_document)
                .execute(conn)?;

            audit::record_event(
                conn,
                case_id,
                &format!("New document uploaded: {title}"),
                UPDATE_TYPE_DOCUMENT,
                requester.id,
                true,
            )?;

            Ok(documents::table.find(doc_id).first(conn)?)
        })
        .map_err(|err| {
            error!(
                error = %err,
                storage_key = %blob.opaque_id,
                "metadata write failed after upload, blob orphaned pending sweep"
            );
            AppError::store("Failed to store document")
        })?;

    info!(
        document_id = %document.id,
        case_id = %case_id,
        storage_key = %document.storage_key,
        "document attached"
    );

    Ok((
        StatusCode::CREATED,
        Json(DataResponse::new(to_document_response(document))),
    ))
}

pub async fn list_case_documents(
    State(state): State<AppState>,
    Path(case_id): Path<Uuid>,
    requester: Requester,
) -> AppResult<Json<ListResponse<DocumentResponse>>> {
    let mut conn = state.db()?;
    let case = find_case(&mut conn, case_id)?;
    authorize(
        &requester,
        case.owner_id,
        "Not authorized to view documents for this case",
    )?;

    let rows: Vec<Document> = documents::table
        .filter(documents::case_id.eq(case_id))
        .order(documents::created_at.desc())
        .load(&mut conn)?;

    Ok(Json(ListResponse::new(
        rows.into_iter().map(to_document_response).collect(),
    )))
}

pub async fn get_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    requester: Requester,
) -> AppResult<Json<DataResponse<DocumentResponse>>> {
    let mut conn = state.db()?;
    let document = find_document(&mut conn, document_id)?;
    let case = find_case(&mut conn, document.case_id)?;
    authorize(
        &requester,
        case.owner_id,
        "Not authorized to view this document",
    )?;

    Ok(Json(DataResponse::new(to_document_response(document))))
}

pub async fn update_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    requester: Requester,
    Json(payload): Json<UpdateDocumentRequest>,
) -> AppResult<Json<DataResponse<DocumentResponse>>> {
    let mut conn = state.db()?;
    let document = find_document(&mut conn, document_id)?;
    let case = find_case(&mut conn, document.case_id)?;
    authorize(
        &requester,
        case.owner_id,
        "Not authorized to update this document",
    )?;

    // Metadata only; the stored bytes are immutable after upload.
    let changeset = DocumentChangeset {
        title: payload
            .title
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned),
        document_type: payload
            .document_type
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned),
        updated_at: Utc::now().naive_utc(),
    };

    let updated = conn.transaction::<Document, AppError, _>(|conn| {
        diesel::update(documents::table.find(document_id))
            .set(&changeset)
            .execute(conn)?;

        audit::record_event(
            conn,
            document.case_id,
            "Document details updated",
            UPDATE_TYPE_DOCUMENT,
            requester.id,
            true,
        )?;

        Ok(documents::table.find(document_id).first(conn)?)
    })?;

    Ok(Json(DataResponse::new(to_document_response(updated))))
}

pub async fn delete_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    requester: Requester,
) -> AppResult<Json<MessageResponse>> {
    let mut conn = state.db()?;
    let document = find_document(&mut conn, document_id)?;
    let case = find_case(&mut conn, document.case_id)?;
    authorize(
        &requester,
        case.owner_id,
        "Not authorized to delete this document",
    )?;

    // Metadata-first removal: the row and its trail entry go together, and a
    // blob-store failure afterwards can only strand a blob, never a row that
    // points at nothing.
    conn.transaction::<(), AppError, _>(|conn| {
        diesel::delete(documents::table.find(document_id)).execute(conn)?;

        audit::record_event(
            conn,
            document.case_id,
            &format!("Document deleted: {}", document.title),
            UPDATE_TYPE_DOCUMENT,
            requester.id,
            true,
        )?;

        Ok(())
    })?;
    drop(conn);

    if let Err(err) = state.storage.delete(&document.storage_key).await {
        error!(
            error = %err,
            storage_key = %document.storage_key,
            "blob delete failed after metadata removal, blob orphaned pending sweep"
        );
    } else {
        info!(
            document_id = %document_id,
            storage_key = %document.storage_key,
            "document removed"
        );
    }

    Ok(Json(MessageResponse::new("Document removed successfully")))
}

async fn read_attach_request(multipart: &mut Multipart) -> AppResult<AttachRequest> {
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut original_name: Option<String> = None;
    let mut title: Option<String> = None;
    let mut document_type: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        error!(error = %err, "invalid multipart data");
        AppError::validation(format!("invalid multipart data: {err}"))
    })? {
        let name = field.name().map(|n| n.to_string());
        match name.as_deref() {
            Some("file") => {
                original_name = field.file_name().map(|n| n.to_string());
                let data = field.bytes().await.map_err(|err| {
                    error!(error = %err, "failed to read file bytes");
                    AppError::validation(format!("failed to read file bytes: {err}"))
                })?;
                file_bytes = Some(data.to_vec());
            }
            Some("title") => {
                title = Some(field.text().await.map_err(|err| {
                    AppError::validation(format!("invalid title field: {err}"))
                })?);
            }
            Some("document_type") => {
                document_type = Some(field.text().await.map_err(|err| {
                    AppError::validation(format!("invalid document_type field: {err}"))
                })?);
            }
            _ => {}
        }
    }

    let bytes = file_bytes
        .filter(|data| !data.is_empty())
        .ok_or_else(|| AppError::validation("No file uploaded"))?;

    let title = title
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned);
    let document_type = document_type
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned);

    let (title, document_type) = match (title, document_type) {
        (Some(title), Some(document_type)) => (title, document_type),
        _ => return Err(AppError::validation("Missing required fields")),
    };

    // The stream arrives pre-validated; the declared extension is trusted.
    let extension = original_name
        .as_deref()
        .and_then(|name| FsPath::new(name).extension())
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .unwrap_or_default();

    Ok(AttachRequest {
        bytes,
        extension,
        title,
        document_type,
    })
}

fn find_document(conn: &mut PgConnection, document_id: Uuid) -> AppResult<Document> {
    documents::table
        .find(document_id)
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::not_found("Document not found"))
}

fn to_document_response(document: Document) -> DocumentResponse {
    DocumentResponse {
        id: document.id,
        case_id: document.case_id,
        title: document.title,
        document_type: document.document_type,
        file_url: document.file_url,
        storage_key: document.storage_key,
        uploaded_by: document.uploaded_by,
        created_at: to_iso(document.created_at),
        updated_at: to_iso(document.updated_at),
    }
}
