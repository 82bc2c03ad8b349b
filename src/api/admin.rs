use crate::SharedService;
use crate::errors::AppError;
use crate::model::{AssignmentListing, ManagedGroup};
use crate::payloads::admin::ListAssignmentsParams;
use crate::payloads::groups::CreateConsultantGroupPayload;
use crate::response::ApiResponse;
use axum::Json;
use axum::extract::{Query, State};
use tracing::{debug, info, instrument, warn};

/// Lists the group assignments an administrator or consultant may oversee, with submission
/// statistics and the community each assignment is shown under.
///
/// Query Parameters: `ListAssignmentsParams`
///
/// Returns (wrapped in `ApiResponse`)
/// * `AssignmentListing`: the requested page and the post-filter total (200 OK).
///   Users without an admin or consultant role receive an empty listing. If the store
///   fails, the listing is empty and `error` carries a generic message.
#[instrument(skip(service))]
pub async fn list_assignments(
    State(service): State<SharedService>,
    Query(params): Query<ListAssignmentsParams>,
) -> Result<ApiResponse<AssignmentListing>, AppError> {
    info!("Listing assignment overview for user {}", params.user_id);
    debug!("List assignments params: {:?}", params);

    let listing = service
        .list_assignments_for_admin(
            params.user_id,
            &params.filters(),
            params.limit,
            params.offset.unwrap_or(0),
        )
        .await;

    match &listing.error {
        Some(message) => warn!(
            "Assignment overview for user {} degraded: {}",
            params.user_id, message
        ),
        None => info!(
            "Returning {} of {} assignment(s) to user {}",
            listing.assignments.len(),
            listing.total,
            params.user_id
        ),
    }
    Ok(ApiResponse::ok(listing))
}

/// Creates a consultant-managed group in a community and places the given users in it.
///
/// Request Body: `CreateConsultantGroupPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `ManagedGroup`: the new group and its memberships (201 Created).
/// * `400 Bad Request`: If the assignment id is malformed.
/// * `403 Forbidden`: If the actor is neither an admin nor a consultant.
/// * `404 Not Found`: If the assignment or community does not exist.
/// * `409 Conflict`: If the community already has a group, a user is already grouped, or the
///   member list exceeds the group capacity.
/// * `500 Internal Server Error`: If a store error occurs.
#[instrument(skip(service, payload))]
pub async fn create_consultant_group(
    State(service): State<SharedService>,
    Json(payload): Json<CreateConsultantGroupPayload>,
) -> Result<ApiResponse<ManagedGroup>, AppError> {
    info!(
        "User {} creating managed group for assignment {} in community {}",
        payload.actor_id, payload.assignment_id, payload.community_id
    );
    debug!("Create consultant group payload: {:?}", payload);

    let assignment_id = super::resolve_assignment(&service, &payload.assignment_id).await?;
    let managed = service
        .create_consultant_group(
            payload.actor_id,
            assignment_id,
            payload.community_id,
            payload.name,
            &payload.member_ids,
        )
        .await?;

    info!(
        "Managed group {} created with {} member(s)",
        managed.group.id,
        managed.members.len()
    );
    Ok(ApiResponse::created(managed))
}
