use super::formation::default_group_name;
use super::scope::RoleScopeResolver;
use super::{GroupAssignmentService, dedup_preserving_order};
use crate::errors::GroupError;
use crate::model::{ManagedGroup, NewGroup, NewMembership};
use crate::notify::{NotificationKind, notify_best_effort};
use crate::store::CapacityOutcome;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

impl GroupAssignmentService {
    /// Creates a consultant-managed group for a community and places the given users in it.
    ///
    /// The group is kept even when placing the members fails afterwards.
    pub async fn create_consultant_group(
        &self,
        actor_id: Uuid,
        assignment_id: Uuid,
        community_id: Uuid,
        name: Option<String>,
        member_ids: &[Uuid],
    ) -> Result<ManagedGroup, GroupError> {
        let role = RoleScopeResolver::new(self.store.as_ref())
            .highest_role(actor_id)
            .await?;
        if !role.is_privileged() {
            warn!(
                "User {} with role {} tried to create a managed group",
                actor_id,
                role.as_str()
            );
            return Err(GroupError::PermissionDenied(
                "Only consultants and administrators can create managed groups".to_string(),
            ));
        }

        self.store.find_block(assignment_id).await?;
        if self
            .store
            .communities_by_ids(&[community_id])
            .await?
            .is_empty()
        {
            return Err(GroupError::NotFound(format!(
                "Community {} not found",
                community_id
            )));
        }

        let max_members = self.config.default_group_capacity;
        let member_ids = dedup_preserving_order(member_ids.iter().copied());
        if member_ids.len() > max_members as usize {
            return Err(GroupError::CapacityExceeded { max_members });
        }

        let new_group = NewGroup {
            assignment_id,
            community_id,
            name: name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(default_group_name),
            max_members,
            is_consultant_managed: true,
        };
        let group = match self.store.insert_group(new_group).await {
            Ok(group) => group,
            Err(e) if e.is_unique_violation() => {
                return Err(GroupError::AlreadyGrouped(
                    "This community already has a group for this assignment".to_string(),
                ));
            }
            Err(e) => return Err(e.into()),
        };
        info!(
            "User {} created managed group {} for assignment {} in community {}",
            actor_id, group.id, assignment_id, community_id
        );

        if member_ids.is_empty() {
            return Ok(ManagedGroup {
                group,
                members: Vec::new(),
            });
        }

        let batch = member_ids
            .iter()
            .map(|user_id| NewMembership::member(group.id, assignment_id, *user_id))
            .collect();
        let members = match self
            .store
            .insert_memberships_within_capacity(&group, batch)
            .await
        {
            Ok(CapacityOutcome::Added(members)) => members,
            Ok(CapacityOutcome::Full { max_members, .. }) => {
                return Err(GroupError::CapacityExceeded { max_members });
            }
            Err(e) if e.is_unique_violation() => {
                return Err(GroupError::AlreadyGrouped(
                    "One or more users already belong to a group for this assignment".to_string(),
                ));
            }
            Err(e) => return Err(e.into()),
        };

        notify_best_effort(
            self.notifier.as_ref(),
            &member_ids,
            NotificationKind::AddedToGroup,
            json!({
                "group_id": group.id,
                "group_name": group.name,
                "assignment_id": assignment_id,
                "added_by": actor_id,
            }),
        )
        .await;

        Ok(ManagedGroup { group, members })
    }
}
