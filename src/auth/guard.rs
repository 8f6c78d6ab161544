use uuid::Uuid;

use crate::auth::{Requester, Role};
use crate::error::{AppError, AppResult};

/// The single capability check applied before every read or mutation.
/// Documents and updates carry no ownership of their own; callers resolve
/// the parent case first and pass its `owner_id` here.
pub fn authorize(requester: &Requester, owner_id: Uuid, denial: &str) -> AppResult<()> {
    if requester.role == Role::Admin || requester.id == owner_id {
        Ok(())
    } else {
        Err(AppError::forbidden(denial))
    }
}
