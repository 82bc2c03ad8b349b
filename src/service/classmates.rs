use super::{GroupAssignmentService, dedup_preserving_order};
use crate::errors::GroupError;
use crate::model::{RoleGrant, UserSummary};
use crate::store::StoreError;
use std::collections::HashSet;
use tracing::debug;
use uuid::Uuid;

impl GroupAssignmentService {
    /// Classmates the caller may invite: actively enrolled in the assignment's course, from the
    /// caller's school, and not yet in any group for the assignment.
    pub async fn eligible_classmates(
        &self,
        assignment_id: Uuid,
        user_id: Uuid,
        group_id: Option<Uuid>,
    ) -> Result<Vec<UserSummary>, GroupError> {
        if let Some(group_id) = group_id {
            let group = self.store.find_group(group_id).await?;
            let members = self.store.group_memberships(group_id).await?;
            if !members.iter().any(|m| m.user_id == user_id) {
                return Err(GroupError::PermissionDenied(
                    "You are not a member of this group".to_string(),
                ));
            }
            if group.is_consultant_managed {
                return Err(GroupError::ConsultantManaged);
            }
        }

        let caller_roles = self.store.active_roles(user_id).await?;
        let caller_schools: HashSet<Uuid> = self
            .role_schools(&caller_roles)
            .await?
            .into_iter()
            .map(|(_, school_id)| school_id)
            .collect();
        if caller_schools.is_empty() {
            return Err(GroupError::PermissionDenied(
                "Your account is not linked to a school".to_string(),
            ));
        }

        let block = self.store.find_block(assignment_id).await?;
        let lesson = self.store.find_lesson(block.lesson_id).await?;
        let grouped: HashSet<Uuid> = self
            .store
            .assignment_member_ids(assignment_id)
            .await?
            .into_iter()
            .collect();
        let candidates = dedup_preserving_order(
            self.store
                .active_enrolled_user_ids(lesson.course_id)
                .await?
                .into_iter()
                .filter(|id| *id != user_id && !grouped.contains(id)),
        );
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let candidate_roles = self.store.active_roles_for_users(&candidates).await?;
        let same_school = dedup_preserving_order(
            self.role_schools(&candidate_roles)
                .await?
                .into_iter()
                .filter(|(_, school_id)| caller_schools.contains(school_id))
                .map(|(user_id, _)| user_id),
        );
        debug!(
            "{} of {} ungrouped classmate(s) share a school with user {}",
            same_school.len(),
            candidates.len(),
            user_id
        );
        if same_school.is_empty() {
            return Ok(Vec::new());
        }

        let users = self.store.users_by_ids(&same_school).await?;
        Ok(users.iter().map(UserSummary::from).collect())
    }

    /// `(user_id, school_id)` for each grant that names a school directly or through its
    /// community.
    async fn role_schools(&self, roles: &[RoleGrant]) -> Result<Vec<(Uuid, Uuid)>, StoreError> {
        let community_ids = dedup_preserving_order(
            roles
                .iter()
                .filter(|r| r.school_id.is_none())
                .filter_map(|r| r.community_id),
        );
        let communities = if community_ids.is_empty() {
            Vec::new()
        } else {
            self.store.communities_by_ids(&community_ids).await?
        };

        Ok(roles
            .iter()
            .filter_map(|role| {
                let school_id = role.school_id.or_else(|| {
                    role.community_id
                        .and_then(|id| communities.iter().find(|c| c.id == id))
                        .and_then(|c| c.school_id)
                });
                school_id.map(|school_id| (role.user_id, school_id))
            })
            .collect())
    }
}
