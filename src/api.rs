use crate::errors::AppError;
use crate::model::AssignmentRef;
use crate::service::GroupAssignmentService;
use tracing::warn;
use uuid::Uuid;

pub mod admin;
pub mod groups;
pub mod learner;

/// Parses an assignment id in either accepted form and resolves it to the block id.
async fn resolve_assignment(
    service: &GroupAssignmentService,
    raw: &str,
) -> Result<Uuid, AppError> {
    let assignment = raw.parse::<AssignmentRef>().map_err(|e| {
        warn!("Rejecting malformed assignment id: {}", e);
        AppError::BadRequest(e.to_string())
    })?;
    Ok(service.resolve_assignment_id(assignment).await?)
}
