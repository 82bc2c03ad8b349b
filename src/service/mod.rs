//! The group-assignment engine.
//!
//! [`GroupAssignmentService`] is a stateless facade over the components below. It owns only
//! its collaborators and configuration; every operation is an independent request that
//! delegates mutual exclusion to the store's uniqueness constraints.

use crate::cli::Args;
use crate::errors::GroupError;
use crate::model::{
    AssignmentListing, AssignmentRef, Group, LearnerListing, Membership, OrgFilters,
};
use crate::notify::{LogNotificationSink, NotificationSink};
use crate::store::{EntityStore, SettingsLookup};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

pub mod catalog;
pub mod classmates;
pub mod consultant;
pub mod formation;
pub mod org_filter;
pub mod scope;
pub mod stats;
pub mod submissions;

pub use catalog::AssignmentCatalog;
pub use formation::GroupFormationManager;
pub use org_filter::{CommunityRestriction, OrganizationFilter};
pub use scope::RoleScopeResolver;
pub use stats::SubmissionStatsAggregator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceConfig {
    /// `max_members` of groups created by the service.
    pub default_group_capacity: i32,
    /// Courses sampled by the learner listing when the learner has no course linkage at all.
    pub fallback_course_limit: i64,
    pub default_page_size: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            default_group_capacity: 8,
            fallback_course_limit: 10,
            default_page_size: 50,
        }
    }
}

impl From<&Args> for ServiceConfig {
    fn from(args: &Args) -> Self {
        ServiceConfig {
            default_group_capacity: args.default_group_capacity,
            fallback_course_limit: args.fallback_course_limit,
            default_page_size: args.default_page_size,
        }
    }
}

pub struct GroupAssignmentService {
    store: Arc<dyn EntityStore>,
    settings: Arc<dyn SettingsLookup>,
    notifier: Arc<dyn NotificationSink>,
    config: ServiceConfig,
}

impl GroupAssignmentService {
    pub fn new(
        store: Arc<dyn EntityStore>,
        settings: Arc<dyn SettingsLookup>,
        notifier: Arc<dyn NotificationSink>,
        config: ServiceConfig,
    ) -> Self {
        GroupAssignmentService {
            store,
            settings,
            notifier,
            config,
        }
    }

    /// Uses one backend for both entities and settings, and logs notifications.
    pub fn with_store<S>(store: Arc<S>, config: ServiceConfig) -> Self
    where
        S: EntityStore + SettingsLookup + 'static,
    {
        let entities: Arc<dyn EntityStore> = store.clone();
        let settings: Arc<dyn SettingsLookup> = store;
        Self::new(entities, settings, Arc::new(LogNotificationSink), config)
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    fn catalog(&self) -> AssignmentCatalog<'_> {
        AssignmentCatalog::new(self.store.as_ref(), &self.config)
    }

    fn formation(&self) -> GroupFormationManager<'_> {
        GroupFormationManager::new(
            self.store.as_ref(),
            self.settings.as_ref(),
            self.notifier.as_ref(),
            self.config.default_group_capacity,
        )
    }

    /// Maps either accepted assignment id form to the canonical block id.
    pub async fn resolve_assignment_id(&self, assignment: AssignmentRef) -> Result<Uuid, GroupError> {
        match assignment {
            AssignmentRef::Block(id) => Ok(id),
            AssignmentRef::Legacy { lesson_id, index } => {
                let block = self.store.block_at(lesson_id, index).await?;
                if !block.is_group_assignment() {
                    return Err(GroupError::NotFound(format!(
                        "Block {} of lesson {} is not a group assignment",
                        index, lesson_id
                    )));
                }
                debug!("Resolved legacy assignment id {} to {}", assignment, block.id);
                Ok(block.id)
            }
        }
    }

    pub async fn list_assignments_for_admin(
        &self,
        user_id: Uuid,
        filters: &OrgFilters,
        limit: Option<usize>,
        offset: usize,
    ) -> AssignmentListing {
        self.catalog().list(user_id, filters, limit, offset).await
    }

    pub async fn list_assignments_for_user(&self, user_id: Uuid) -> LearnerListing {
        self.catalog().list_for_user(user_id).await
    }

    pub async fn get_or_create_group(
        &self,
        assignment_id: Uuid,
        user_id: Uuid,
    ) -> Result<Group, GroupError> {
        self.formation()
            .get_or_create_group(assignment_id, user_id)
            .await
    }

    pub async fn add_members(
        &self,
        group_id: Uuid,
        assignment_id: Uuid,
        user_ids: &[Uuid],
        actor_id: Uuid,
    ) -> Result<Vec<Membership>, GroupError> {
        self.formation()
            .add_members(group_id, assignment_id, user_ids, actor_id)
            .await
    }

    pub async fn remove_member(&self, group_id: Uuid, user_id: Uuid) -> Result<(), GroupError> {
        self.formation().remove_member(group_id, user_id).await
    }
}

/// Drops repeated ids, keeping the first occurrence of each.
pub(crate) fn dedup_preserving_order(ids: impl IntoIterator<Item = Uuid>) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}
