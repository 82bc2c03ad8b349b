use crate::SharedService;
use crate::errors::AppError;
use crate::model::{Group, GroupMember, Membership, Submission, UserSummary};
use crate::payloads::groups::{
    AddMembersPayload, EligibleClassmatesParams, GetOrCreateGroupPayload, GroupMembersParams,
    RemoveMemberPayload, SubmitWorkPayload,
};
use crate::response::ApiResponse;
use axum::Json;
use axum::extract::{Query, State};
use tracing::{debug, info, instrument};

/// Returns the caller's group for an assignment, joining the group of the caller's community
/// (and creating it if needed) on the first call.
///
/// Request Body: `GetOrCreateGroupPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `Group`: the caller's group (200 OK). Concurrent calls for the same user and assignment
///   all return the same group.
/// * `400 Bad Request`: If the assignment id is malformed.
/// * `403 Forbidden`: If the assignment or the community's group is consultant-managed, or the
///   store denies access.
/// * `404 Not Found`: If the caller has no community, or the assignment id matches no block.
/// * `500 Internal Server Error`: If a store error occurs.
#[instrument(skip(service, payload))]
pub async fn get_or_create(
    State(service): State<SharedService>,
    Json(payload): Json<GetOrCreateGroupPayload>,
) -> Result<ApiResponse<Group>, AppError> {
    info!(
        "Resolving group of user {} for assignment {}",
        payload.user_id, payload.assignment_id
    );

    let assignment_id = super::resolve_assignment(&service, &payload.assignment_id).await?;
    let group = service
        .get_or_create_group(assignment_id, payload.user_id)
        .await?;

    info!("User {} is in group {}", payload.user_id, group.id);
    Ok(ApiResponse::ok(group))
}

/// Adds classmates to a self-service group.
///
/// Request Body: `AddMembersPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `Vec<Membership>`: the created memberships (200 OK).
/// * `400 Bad Request`: If the assignment id is malformed.
/// * `403 Forbidden`: If the group is consultant-managed, or the actor is neither a member of
///   the group nor an admin or consultant.
/// * `404 Not Found`: If the group does not exist for this assignment.
/// * `409 Conflict`: If the group would exceed its capacity, or a user is already grouped.
/// * `500 Internal Server Error`: If a store error occurs.
#[instrument(skip(service, payload))]
pub async fn add_members(
    State(service): State<SharedService>,
    Json(payload): Json<AddMembersPayload>,
) -> Result<ApiResponse<Vec<Membership>>, AppError> {
    info!(
        "User {} adding {} user(s) to group {}",
        payload.actor_id,
        payload.user_ids.len(),
        payload.group_id
    );
    debug!("Add members payload: {:?}", payload);

    let assignment_id = super::resolve_assignment(&service, &payload.assignment_id).await?;
    let members = service
        .add_members(
            payload.group_id,
            assignment_id,
            &payload.user_ids,
            payload.actor_id,
        )
        .await?;

    Ok(ApiResponse::ok(members))
}

/// Removes a user from a self-service group.
///
/// Request Body: `RemoveMemberPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `bool`: true once the user is no longer a member (200 OK).
/// * `403 Forbidden`: If the group is consultant-managed.
/// * `404 Not Found`: If the group does not exist.
/// * `500 Internal Server Error`: If a store error occurs.
#[instrument(skip(service, payload))]
pub async fn remove_member(
    State(service): State<SharedService>,
    Json(payload): Json<RemoveMemberPayload>,
) -> Result<ApiResponse<bool>, AppError> {
    info!(
        "Removing user {} from group {}",
        payload.user_id, payload.group_id
    );

    service
        .remove_member(payload.group_id, payload.user_id)
        .await?;

    Ok(ApiResponse::ok(true))
}

/// Lists the members of a group.
///
/// Query Parameters: `GroupMembersParams`
///
/// Returns (wrapped in `ApiResponse`)
/// * `Vec<GroupMember>`: members in joining order (200 OK).
/// * `404 Not Found`: If the group does not exist.
/// * `500 Internal Server Error`: If a store error occurs.
#[instrument(skip(service))]
pub async fn members(
    State(service): State<SharedService>,
    Query(params): Query<GroupMembersParams>,
) -> Result<ApiResponse<Vec<GroupMember>>, AppError> {
    let members = service.group_members(params.group_id).await?;
    debug!(
        "Group {} has {} member(s)",
        params.group_id,
        members.len()
    );
    Ok(ApiResponse::ok(members))
}

/// Submits (or re-submits) the group's work for an assignment.
///
/// Request Body: `SubmitWorkPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `Submission`: the group's submission (200 OK).
/// * `400 Bad Request`: If the assignment id is malformed.
/// * `403 Forbidden`: If the caller is not a member of the group.
/// * `500 Internal Server Error`: If a store error occurs.
#[instrument(skip(service, payload))]
pub async fn submit(
    State(service): State<SharedService>,
    Json(payload): Json<SubmitWorkPayload>,
) -> Result<ApiResponse<Submission>, AppError> {
    info!(
        "User {} submitting for group {} on assignment {}",
        payload.user_id, payload.group_id, payload.assignment_id
    );

    let assignment_id = super::resolve_assignment(&service, &payload.assignment_id).await?;
    let submission = service
        .submit_work(
            assignment_id,
            payload.group_id,
            payload.user_id,
            payload.content,
        )
        .await?;

    Ok(ApiResponse::ok(submission))
}

/// Lists classmates the caller may invite to their group.
///
/// Query Parameters: `EligibleClassmatesParams`
///
/// Returns (wrapped in `ApiResponse`)
/// * `Vec<UserSummary>`: ungrouped classmates from the caller's school and course (200 OK).
/// * `400 Bad Request`: If the assignment id is malformed.
/// * `403 Forbidden`: If the caller is not in the given group, the group is consultant-managed,
///   or the caller has no school.
/// * `404 Not Found`: If the assignment or group does not exist.
/// * `500 Internal Server Error`: If a store error occurs.
#[instrument(skip(service))]
pub async fn eligible_classmates(
    State(service): State<SharedService>,
    Query(params): Query<EligibleClassmatesParams>,
) -> Result<ApiResponse<Vec<UserSummary>>, AppError> {
    let assignment_id = super::resolve_assignment(&service, &params.assignment_id).await?;
    let classmates = service
        .eligible_classmates(assignment_id, params.user_id, params.group_id)
        .await?;

    info!(
        "Found {} eligible classmate(s) for user {}",
        classmates.len(),
        params.user_id
    );
    Ok(ApiResponse::ok(classmates))
}
