use crate::SharedService;
use crate::errors::AppError;
use crate::model::LearnerListing;
use crate::payloads::learner::ListLearnerAssignmentsParams;
use crate::response::ApiResponse;
use axum::extract::{Query, State};
use tracing::{info, instrument, warn};

/// Lists the group assignments of the learner's courses, each merged with the learner's
/// group and its submission.
///
/// Query Parameters: `ListLearnerAssignmentsParams`
///
/// Returns (wrapped in `ApiResponse`)
/// * `LearnerListing`: the assignments (200 OK). If the store fails, the list is empty and
///   `error` carries a generic message.
#[instrument(skip(service))]
pub async fn list_assignments(
    State(service): State<SharedService>,
    Query(params): Query<ListLearnerAssignmentsParams>,
) -> Result<ApiResponse<LearnerListing>, AppError> {
    info!("Listing assignments for learner {}", params.user_id);

    let listing = service.list_assignments_for_user(params.user_id).await;
    if let Some(message) = &listing.error {
        warn!(
            "Assignment list for learner {} degraded: {}",
            params.user_id, message
        );
    }
    Ok(ApiResponse::ok(listing))
}
