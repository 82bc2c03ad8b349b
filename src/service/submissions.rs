use super::GroupAssignmentService;
use crate::errors::GroupError;
use crate::model::{GroupMember, NewSubmission, Submission, SubmissionStatus, User};
use crate::notify::{NotificationKind, notify_best_effort};
use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

impl GroupAssignmentService {
    /// Hands in (or re-submits) the group's work. Only members of the group may submit.
    pub async fn submit_work(
        &self,
        assignment_id: Uuid,
        group_id: Uuid,
        user_id: Uuid,
        content: Option<String>,
    ) -> Result<Submission, GroupError> {
        let not_member = || {
            GroupError::PermissionDenied("You are not a member of this group".to_string())
        };
        match self.store.find_membership(user_id, assignment_id).await {
            Ok(membership) if membership.group_id == group_id => {}
            Ok(_) => return Err(not_member()),
            Err(e) if e.is_not_found() => return Err(not_member()),
            Err(e) => return Err(e.into()),
        }

        let submission = self
            .store
            .upsert_submission(NewSubmission {
                group_id,
                assignment_id,
                user_id,
                status: SubmissionStatus::Submitted.as_str().to_string(),
                content,
                submitted_at: Some(Utc::now()),
            })
            .await?;
        info!(
            "User {} submitted work for group {} on assignment {}",
            user_id, group_id, assignment_id
        );

        match self.store.group_memberships(group_id).await {
            Ok(members) => {
                let others: Vec<Uuid> = members
                    .iter()
                    .map(|m| m.user_id)
                    .filter(|id| *id != user_id)
                    .collect();
                notify_best_effort(
                    self.notifier.as_ref(),
                    &others,
                    NotificationKind::SubmissionReceived,
                    json!({
                        "group_id": group_id,
                        "assignment_id": assignment_id,
                        "submitted_by": user_id,
                    }),
                )
                .await;
            }
            Err(e) => warn!(
                "Could not load members of group {} for notification: {:?}",
                group_id, e
            ),
        }

        Ok(submission)
    }

    /// Members of a group, oldest first, with their profile names.
    pub async fn group_members(&self, group_id: Uuid) -> Result<Vec<GroupMember>, GroupError> {
        self.store.find_group(group_id).await?;
        let memberships = self.store.group_memberships(group_id).await?;
        let user_ids: Vec<Uuid> = memberships.iter().map(|m| m.user_id).collect();
        let users = if user_ids.is_empty() {
            Vec::new()
        } else {
            self.store.users_by_ids(&user_ids).await?
        };

        Ok(memberships
            .iter()
            .map(|membership| {
                let user = users.iter().find(|u| u.id == membership.user_id);
                GroupMember {
                    user_id: membership.user_id,
                    full_name: user
                        .map(User::full_name)
                        .unwrap_or_else(|| "Unknown user".to_string()),
                    email: user.map(|u| u.email.clone()).unwrap_or_default(),
                    avatar_url: user.and_then(|u| u.avatar_url.clone()),
                    role: membership.role.clone(),
                    joined_at: membership.joined_at,
                }
            })
            .collect())
    }
}
