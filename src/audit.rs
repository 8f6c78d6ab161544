use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{NewUpdate, Update};
use crate::schema::updates;

pub const UPDATE_TYPE_STATUS: &str = "status";
pub const UPDATE_TYPE_DOCUMENT: &str = "document";
pub const UPDATE_TYPE_COURT: &str = "court";
pub const UPDATE_TYPE_GENERAL: &str = "general";

pub const UPDATE_TYPES: &[&str] = &[
    UPDATE_TYPE_STATUS,
    UPDATE_TYPE_DOCUMENT,
    UPDATE_TYPE_COURT,
    UPDATE_TYPE_GENERAL,
];

const MIN_MESSAGE_CHARS: usize = 3;

pub fn is_valid_update_type(value: &str) -> bool {
    UPDATE_TYPES.iter().any(|allowed| *allowed == value)
}

/// Append one entry to a case's audit trail on an open connection, so callers
/// can make the entry durably atomic with the mutation it describes by
/// invoking this inside the same transaction.
pub fn record_event(
    conn: &mut PgConnection,
    case_id: Uuid,
    message: &str,
    update_type: &str,
    author_id: Uuid,
    is_automatic: bool,
) -> AppResult<Update> {
    let message = message.trim();
    if message.chars().count() < MIN_MESSAGE_CHARS {
        return Err(AppError::validation(
            "Message must be at least 3 characters long",
        ));
    }
    if !is_valid_update_type(update_type) {
        return Err(AppError::validation(format!(
            "Invalid update type '{update_type}'. Allowed types: {}",
            UPDATE_TYPES.join(", ")
        )));
    }

    let new_update = NewUpdate {
        id: Uuid::new_v4(),
        case_id,
        message: message.to_string(),
        update_type: update_type.to_string(),
        created_by: author_id,
        is_automatic,
    };

    diesel::insert_into(updates::table)
        .values(&new_update)
        .execute(conn)?;

    let update = updates::table.find(new_update.id).first(conn)?;
    Ok(update)
}

/// Trail entries for a case, newest first.
pub fn list_events(conn: &mut PgConnection, case_id: Uuid) -> AppResult<Vec<Update>> {
    let entries = updates::table
        .filter(updates::case_id.eq(case_id))
        .order(updates::created_at.desc())
        .load(conn)?;
    Ok(entries)
}
