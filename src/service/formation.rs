//! Group formation.
//!
//! Membership is acquired with optimistic inserts: the store's `(assignment_id, community_id)`
//! and `(user_id, assignment_id)` uniqueness constraints reject the losing side of a race, and
//! the loser re-reads what the winner wrote. No locks are taken across requests.

use super::dedup_preserving_order;
use super::scope::RoleScopeResolver;
use crate::errors::GroupError;
use crate::model::{Group, Membership, NewGroup, NewMembership};
use crate::notify::{NotificationKind, NotificationSink, notify_best_effort};
use crate::store::{CapacityOutcome, EntityStore, SettingsLookup};
use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub(crate) fn default_group_name() -> String {
    format!("Group {}", Utc::now().timestamp_millis())
}

pub struct GroupFormationManager<'a> {
    store: &'a dyn EntityStore,
    settings: &'a dyn SettingsLookup,
    notifier: &'a dyn NotificationSink,
    group_capacity: i32,
}

impl<'a> GroupFormationManager<'a> {
    pub fn new(
        store: &'a dyn EntityStore,
        settings: &'a dyn SettingsLookup,
        notifier: &'a dyn NotificationSink,
        group_capacity: i32,
    ) -> Self {
        GroupFormationManager {
            store,
            settings,
            notifier,
            group_capacity,
        }
    }

    /// Returns the user's group for the assignment, joining (and if needed creating) the
    /// group of the user's community on the first call.
    ///
    /// Joining does not check `max_members`: every learner of a community lands in the one
    /// community group, and the capacity only limits [`Self::add_members`]. A community group
    /// created by a consultant is never joined this way.
    pub async fn get_or_create_group(
        &self,
        assignment_id: Uuid,
        user_id: Uuid,
    ) -> Result<Group, GroupError> {
        match self.store.find_membership(user_id, assignment_id).await {
            Ok(membership) => {
                debug!(
                    "User {} already in group {} for assignment {}",
                    user_id, membership.group_id, assignment_id
                );
                return Ok(self.store.find_group(membership.group_id).await?);
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }

        let settings = self.settings.assignment_settings(assignment_id).await?;
        if settings.consultant_managed {
            info!(
                "Assignment {} is consultant-managed; not creating a group for user {}",
                assignment_id, user_id
            );
            return Err(GroupError::ConsultantManaged);
        }

        let community_id = RoleScopeResolver::new(self.store)
            .resolve_user_community(user_id)
            .await?
            .ok_or_else(|| {
                GroupError::NotFound(format!("User {} does not belong to a community", user_id))
            })?;

        let group = self.find_or_create_group(assignment_id, community_id).await?;
        if group.is_consultant_managed {
            info!(
                "Group {} is consultant-managed; not adding user {} to it",
                group.id, user_id
            );
            return Err(GroupError::ConsultantManaged);
        }

        match self
            .store
            .insert_membership(NewMembership::member(group.id, assignment_id, user_id))
            .await
        {
            Ok(_) => {
                info!(
                    "User {} joined group {} for assignment {}",
                    user_id, group.id, assignment_id
                );
                Ok(group)
            }
            Err(e) if e.is_unique_violation() => {
                info!(
                    "User {} joined assignment {} concurrently; reusing the existing membership",
                    user_id, assignment_id
                );
                let existing = self.store.find_membership(user_id, assignment_id).await?;
                if existing.group_id == group.id {
                    Ok(group)
                } else {
                    Ok(self.store.find_group(existing.group_id).await?)
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_or_create_group(
        &self,
        assignment_id: Uuid,
        community_id: Uuid,
    ) -> Result<Group, GroupError> {
        match self
            .store
            .find_group_for_community(assignment_id, community_id)
            .await
        {
            Ok(group) => return Ok(group),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }

        let new_group = NewGroup {
            assignment_id,
            community_id,
            name: default_group_name(),
            max_members: self.group_capacity,
            is_consultant_managed: false,
        };
        match self.store.insert_group(new_group).await {
            Ok(group) => {
                info!(
                    "Created group {} for assignment {} in community {}",
                    group.id, assignment_id, community_id
                );
                Ok(group)
            }
            Err(e) if e.is_unique_violation() => {
                info!(
                    "Group for assignment {} in community {} was created concurrently; re-reading",
                    assignment_id, community_id
                );
                Ok(self
                    .store
                    .find_group_for_community(assignment_id, community_id)
                    .await?)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Adds users to a self-service group. The actor must be a member of the group or hold an
    /// admin or consultant role. The batch is all-or-nothing.
    pub async fn add_members(
        &self,
        group_id: Uuid,
        assignment_id: Uuid,
        user_ids: &[Uuid],
        actor_id: Uuid,
    ) -> Result<Vec<Membership>, GroupError> {
        let group = self.load_group(group_id, assignment_id).await?;
        if group.is_consultant_managed {
            warn!(
                "User {} tried to add members to consultant-managed group {}",
                actor_id, group_id
            );
            return Err(GroupError::ConsultantManaged);
        }
        self.ensure_can_manage(&group, actor_id).await?;

        let user_ids = dedup_preserving_order(user_ids.iter().copied());
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        let batch = user_ids
            .iter()
            .map(|user_id| NewMembership::member(group.id, assignment_id, *user_id))
            .collect();
        let added = match self
            .store
            .insert_memberships_within_capacity(&group, batch)
            .await
        {
            Ok(CapacityOutcome::Added(added)) => added,
            Ok(CapacityOutcome::Full {
                current,
                max_members,
            }) => {
                warn!(
                    "Group {} has {} of {} members; cannot add {} more",
                    group_id,
                    current,
                    max_members,
                    user_ids.len()
                );
                return Err(GroupError::CapacityExceeded { max_members });
            }
            Err(e) if e.is_unique_violation() => {
                return Err(GroupError::AlreadyGrouped(
                    "One or more users already belong to a group for this assignment".to_string(),
                ));
            }
            Err(e) => return Err(e.into()),
        };
        info!(
            "Added {} member(s) to group {} on behalf of {}",
            added.len(),
            group_id,
            actor_id
        );

        notify_best_effort(
            self.notifier,
            &user_ids,
            NotificationKind::AddedToGroup,
            json!({
                "group_id": group.id,
                "group_name": group.name,
                "assignment_id": assignment_id,
                "added_by": actor_id,
            }),
        )
        .await;

        Ok(added)
    }

    /// Removes a user from a self-service group. Removing a non-member is not an error.
    pub async fn remove_member(&self, group_id: Uuid, user_id: Uuid) -> Result<(), GroupError> {
        let group = self.store.find_group(group_id).await?;
        if group.is_consultant_managed {
            warn!(
                "Refusing to remove user {} from consultant-managed group {}",
                user_id, group_id
            );
            return Err(GroupError::ConsultantManaged);
        }

        match self.store.delete_membership(group_id, user_id).await? {
            0 => warn!("User {} was not a member of group {}", user_id, group_id),
            _ => info!("Removed user {} from group {}", user_id, group_id),
        }
        Ok(())
    }

    async fn load_group(&self, group_id: Uuid, assignment_id: Uuid) -> Result<Group, GroupError> {
        let group = self.store.find_group(group_id).await?;
        if group.assignment_id != assignment_id {
            return Err(GroupError::NotFound(format!(
                "Group {} does not belong to assignment {}",
                group_id, assignment_id
            )));
        }
        Ok(group)
    }

    async fn ensure_can_manage(&self, group: &Group, actor_id: Uuid) -> Result<(), GroupError> {
        let role = RoleScopeResolver::new(self.store)
            .highest_role(actor_id)
            .await?;
        if role.is_privileged() {
            return Ok(());
        }

        let members = self.store.group_memberships(group.id).await?;
        if members.iter().any(|m| m.user_id == actor_id) {
            Ok(())
        } else {
            Err(GroupError::PermissionDenied(
                "Only members of this group can add classmates to it".to_string(),
            ))
        }
    }
}
