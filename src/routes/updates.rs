use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audit::{self, UPDATE_TYPE_GENERAL};
use crate::auth::{guard::authorize, Requester};
use crate::error::{AppError, AppResult};
use crate::models::Update;
use crate::response::{to_iso, DataResponse, ListResponse, MessageResponse};
use crate::routes::cases::find_case;
use crate::schema::updates;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateUpdateRequest {
    #[serde(default)]
    pub message: String,
    pub update_type: Option<String>,
}

#[derive(Serialize)]
pub struct UpdateResponse {
    pub id: Uuid,
    pub case_id: Uuid,
    pub message: String,
    pub update_type: String,
    pub created_by: Uuid,
    pub is_automatic: bool,
    pub created_at: String,
}

pub async fn create_update(
    State(state): State<AppState>,
    Path(case_id): Path<Uuid>,
    requester: Requester,
    Json(payload): Json<CreateUpdateRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<UpdateResponse>>)> {
    let mut conn = state.db()?;
    let case = find_case(&mut conn, case_id)?;
    authorize(
        &requester,
        case.owner_id,
        "Not authorized to create updates for this case",
    )?;

    let update_type = payload
        .update_type
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(UPDATE_TYPE_GENERAL);

    let update = audit::record_event(
        &mut conn,
        case_id,
        &payload.message,
        update_type,
        requester.id,
        false,
    )?;

    Ok((
        StatusCode::CREATED,
        Json(DataResponse::new(to_update_response(update))),
    ))
}

pub async fn list_case_updates(
    State(state): State<AppState>,
    Path(case_id): Path<Uuid>,
    requester: Requester,
) -> AppResult<Json<ListResponse<UpdateResponse>>> {
    let mut conn = state.db()?;
    let case = find_case(&mut conn, case_id)?;
    authorize(
        &requester,
        case.owner_id,
        "Not authorized to view updates for this case",
    )?;

    let entries = audit::list_events(&mut conn, case_id)?;

    Ok(Json(ListResponse::new(
        entries.into_iter().map(to_update_response).collect(),
    )))
}

pub async fn delete_update(
    State(state): State<AppState>,
    Path(update_id): Path<Uuid>,
    requester: Requester,
) -> AppResult<Json<MessageResponse>> {
    let mut conn = state.db()?;

    let update: Update = updates::table
        .find(update_id)
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::not_found("Update not found"))?;

    // Deletion rights follow the parent case, not the entry's author.
    let case = find_case(&mut conn, update.case_id)?;
    authorize(
        &requester,
        case.owner_id,
        "Not authorized to delete this update",
    )?;

    // Hard removal, no tombstone.
    diesel::delete(updates::table.find(update_id)).execute(&mut conn)?;

    Ok(Json(MessageResponse::new("Update deleted successfully")))
}

fn to_update_response(update: Update) -> UpdateResponse {
    UpdateResponse {
        id: update.id,
        case_id: update.case_id,
        message: update.message,
        update_type: update.update_type,
        created_by: update.created_by,
        is_automatic: update.is_automatic,
        created_at: to_iso(update.created_at),
    }
}
