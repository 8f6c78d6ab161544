use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use chrono::{Datelike, NaiveDateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::audit::{self, UPDATE_TYPE_GENERAL, UPDATE_TYPE_STATUS};
use crate::auth::{guard::authorize, Requester, Role};
use crate::error::{AppError, AppResult};
use crate::models::{Case, CourtInfo, NewCase};
use crate::response::{to_iso, DataResponse, ListResponse};
use crate::schema::{case_sequences, cases};
use crate::state::AppState;

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_IN_PROGRESS: &str = "in-progress";
pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_REJECTED: &str = "rejected";

pub const CASE_STATUSES: &[&str] = &[
    STATUS_PENDING,
    STATUS_IN_PROGRESS,
    STATUS_COMPLETED,
    STATUS_REJECTED,
];

fn is_valid_status(value: &str) -> bool {
    CASE_STATUSES.iter().any(|allowed| *allowed == value)
}

#[derive(Deserialize)]
pub struct CreateCaseRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub court_info: Option<CourtInfo>,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    #[serde(default)]
    pub status: String,
}

#[derive(Deserialize)]
pub struct UpdateCaseRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub court_info: Option<CourtInfo>,
}

#[derive(AsChangeset)]
#[diesel(table_name = cases)]
struct CaseDetailsChangeset {
    title: Option<String>,
    description: Option<String>,
    court_info: Option<serde_json::Value>,
    updated_at: NaiveDateTime,
}

#[derive(Serialize)]
pub struct CaseResponse {
    pub id: Uuid,
    pub case_number: String,
    pub owner_id: Uuid,
    pub title: String,
    pub description: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub court_info: Option<CourtInfo>,
    pub created_at: String,
    pub updated_at: String,
}

pub async fn create_case(
    State(state): State<AppState>,
    requester: Requester,
    Json(payload): Json<CreateCaseRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<CaseResponse>>)> {
    let title = payload.title.trim().to_string();
    let description = payload.description.trim().to_string();
    if title.is_empty() || description.is_empty() {
        return Err(AppError::validation("Title and description are required"));
    }
    let court_info = payload.court_info.map(serde_json::to_value).transpose()?;

    let case_id = Uuid::new_v4();
    let year = Utc::now().year();
    let mut conn = state.db()?;

    // The filing and its originating trail entry commit or roll back together,
    // and the sequence row lock keeps same-year numbers collision-free.
    let case = conn.transaction::<Case, AppError, _>(|conn| {
        let case_number = allocate_case_number(conn, year)?;
        let new_case = NewCase {
            id: case_id,
            case_number,
            owner_id: requester.id,
            title: title.clone(),
            description: description.clone(),
            status: STATUS_PENDING.to_string(),
            court_info: court_info.clone(),
        };

        match diesel::insert_into(cases::table)
            .values(&new_case)
            .execute(conn)
        {
            Ok(_) => {}
            Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                return Err(AppError::Duplicate(
                    "Case number was already allocated".to_string(),
                ));
            }
            Err(err) => return Err(AppError::from(err)),
        }

        audit::record_event(
            conn,
            case_id,
            "Case filing initiated",
            UPDATE_TYPE_STATUS,
            requester.id,
            true,
        )?;

        let case = cases::table.find(case_id).first(conn)?;
        Ok(case)
    })?;

    info!(case_id = %case.id, case_number = %case.case_number, "case filed");

    Ok((
        StatusCode::CREATED,
        Json(DataResponse::new(to_case_response(case)?)),
    ))
}

pub async fn list_cases(
    State(state): State<AppState>,
    requester: Requester,
) -> AppResult<Json<ListResponse<CaseResponse>>> {
    let mut conn = state.db()?;

    let mut query = cases::table.into_boxed();
    if requester.role != Role::Admin {
        query = query.filter(cases::owner_id.eq(requester.id));
    }

    let rows: Vec<Case> = query.order(cases::created_at.desc()).load(&mut conn)?;
    let data = rows
        .into_iter()
        .map(to_case_response)
        .collect::<AppResult<Vec<_>>>()?;

    Ok(Json(ListResponse::new(data)))
}

pub async fn get_case(
    State(state): State<AppState>,
    Path(case_id): Path<Uuid>,
    requester: Requester,
) -> AppResult<Json<DataResponse<CaseResponse>>> {
    let mut conn = state.db()?;
    let case = find_case(&mut conn, case_id)?;
    authorize(&requester, case.owner_id, "Not authorized to view this case")?;
    Ok(Json(DataResponse::new(to_case_response(case)?)))
}

pub async fn update_case_status(
    State(state): State<AppState>,
    Path(case_id): Path<Uuid>,
    requester: Requester,
    Json(payload): Json<UpdateStatusRequest>,
) -> AppResult<Json<DataResponse<CaseResponse>>> {
    let status = payload.status.trim().to_string();
    if !is_valid_status(&status) {
        return Err(AppError::validation(format!(
            "Invalid case status '{status}'. Allowed statuses: {}",
            CASE_STATUSES.join(", ")
        )));
    }

    let mut conn = state.db()?;
    let case = find_case(&mut conn, case_id)?;
    authorize(&requester, case.owner_id, "Not authorized to update this case")?;

    // No transition graph: any authorized requester may move any status to
    // any other, including out of completed/rejected.
    let updated = conn.transaction::<Case, AppError, _>(|conn| {
        diesel::update(cases::table.find(case_id))
            .set((
                cases::status.eq(&status),
                cases::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;

        audit::record_event(
            conn,
            case_id,
            &format!("Case status updated to {status}"),
            UPDATE_TYPE_STATUS,
            requester.id,
            true,
        )?;

        Ok(cases::table.find(case_id).first(conn)?)
    })?;

    info!(case_id = %case_id, status = %status, "case status changed");

    Ok(Json(DataResponse::new(to_case_response(updated)?)))
}

pub async fn update_case_details(
    State(state): State<AppState>,
    Path(case_id): Path<Uuid>,
    requester: Requester,
    Json(payload): Json<UpdateCaseRequest>,
) -> AppResult<Json<DataResponse<CaseResponse>>> {
    let mut conn = state.db()?;
    let case = find_case(&mut conn, case_id)?;
    authorize(&requester, case.owner_id, "Not authorized to update this case")?;

    // Present, non-empty fields replace; everything else stays. court_info
    // replaces wholesale when supplied.
    let changeset = CaseDetailsChangeset {
        title: payload
            .title
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned),
        description: payload
            .description
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned),
        court_info: payload.court_info.map(serde_json::to_value).transpose()?,
        updated_at: Utc::now().naive_utc(),
    };

    let updated = conn.transaction::<Case, AppError, _>(|conn| {
        diesel::update(cases::table.find(case_id))
            .set(&changeset)
            .execute(conn)?;

        audit::record_event(
            conn,
            case_id,
            "Case details updated",
            UPDATE_TYPE_GENERAL,
            requester.id,
            true,
        )?;

        Ok(cases::table.find(case_id).first(conn)?)
    })?;

    Ok(Json(DataResponse::new(to_case_response(updated)?)))
}

/// Next number for the year via an upsert on the per-year sequence row. The
/// returned value is unique even under concurrent filings because the row
/// stays locked until the surrounding transaction commits.
fn allocate_case_number(conn: &mut PgConnection, year: i32) -> AppResult<String> {
    let sequence: i64 = diesel::insert_into(case_sequences::table)
        .values((case_sequences::year.eq(year), case_sequences::value.eq(1_i64)))
        .on_conflict(case_sequences::year)
        .do_update()
        .set(case_sequences::value.eq(case_sequences::value + 1))
        .returning(case_sequences::value)
        .get_result(conn)?;

    Ok(format_case_number(year, sequence))
}

fn format_case_number(year: i32, sequence: i64) -> String {
    format!("CASE-{year}-{sequence:05}")
}

pub(crate) fn find_case(conn: &mut PgConnection, case_id: Uuid) -> AppResult<Case> {
    cases::table
        .find(case_id)
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::not_found("Case not found"))
}

fn to_case_response(case: Case) -> AppResult<CaseResponse> {
    let court_info = case
        .court_info
        .map(serde_json::from_value::<CourtInfo>)
        .transpose()?;

    Ok(CaseResponse {
        id: case.id,
        case_number: case.case_number,
        owner_id: case.owner_id,
        title: case.title,
        description: case.description,
        status: case.status,
        court_info,
        created_at: to_iso(case.created_at),
        updated_at: to_iso(case.updated_at),
    })
}
