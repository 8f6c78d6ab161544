use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::*;

/// Court metadata attached to a case. Stored as jsonb because courts are
/// described free-form by the filer and carry no referential constraints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourtInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub court_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hearing_date: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = cases)]
pub struct Case {
    pub id: Uuid,
    pub case_number: String,
    pub owner_id: Uuid,
    pub title: String,
    pub description: String,
    pub status: String,
    pub court_info: Option<serde_json::Value>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = cases)]
pub struct NewCase {
    pub id: Uuid,
    pub case_number: String,
    pub owner_id: Uuid,
    pub title: String,
    pub description: String,
    pub status: String,
    pub court_info: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = documents)]
#[diesel(belongs_to(Case))]
pub struct Document {
    pub id: Uuid,
    pub case_id: Uuid,
    pub title: String,
    pub document_type: String,
    pub file_url: String,
    pub storage_key: String,
    pub uploaded_by: Uuid,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = documents)]
pub struct NewDocument {
    pub id: Uuid,
    pub case_id: Uuid,
    pub title: String,
    pub document_type: String,
    pub file_url: String,
    pub storage_key: String,
    pub uploaded_by: Uuid,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = updates)]
#[diesel(belongs_to(Case))]
pub struct Update {
    pub id: Uuid,
    pub case_id: Uuid,
    pub message: String,
    pub update_type: String,
    pub created_by: Uuid,
    pub is_automatic: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = updates)]
pub struct NewUpdate {
    pub id: Uuid,
    pub case_id: Uuid,
    pub message: String,
    pub update_type: String,
    pub created_by: Uuid,
    pub is_automatic: bool,
}
