//! Persistence seam of the engine.
//!
//! Every query the engine issues goes through [`EntityStore`]. Mutual exclusion between
//! concurrent requests is left entirely to the store's uniqueness guarantees:
//!
//! * at most one group per `(assignment_id, community_id)`
//! * at most one membership per `(user_id, assignment_id)`
//!
//! Callers insert optimistically and reconcile on [`StoreError::UniqueViolation`].

use crate::model::{
    AssignmentSettings, Block, Community, ConsultantAssignment, Group, LessonRecord, Membership,
    NewGroup, NewMembership, NewSubmission, OrgFilters, OrgScope, RoleGrant, Submission, User,
};
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

pub mod memory;
pub mod pg;

pub use memory::{InjectedFailure, MemoryStore};
pub use pg::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Unique Violation: {0}")]
    UniqueViolation(String),

    #[error("Permission Denied: {0}")]
    PermissionDenied(String),

    #[error("Store Error: {0}")]
    Other(#[from] anyhow::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, StoreError::UniqueViolation(_))
    }
}

/// Result of a capacity-checked batch insert.
#[derive(Debug, Clone, PartialEq)]
pub enum CapacityOutcome {
    Added(Vec<Membership>),
    Full { current: i64, max_members: i32 },
}

#[async_trait]
pub trait EntityStore: Send + Sync {
    // users, roles and the organizational hierarchy

    async fn find_user(&self, user_id: Uuid) -> Result<User, StoreError>;

    async fn users_by_ids(&self, user_ids: &[Uuid]) -> Result<Vec<User>, StoreError>;

    async fn active_roles(&self, user_id: Uuid) -> Result<Vec<RoleGrant>, StoreError>;

    async fn active_roles_for_users(&self, user_ids: &[Uuid])
    -> Result<Vec<RoleGrant>, StoreError>;

    /// Users holding an active role grant scoped to the given unit.
    async fn users_in_scope(&self, scope: OrgScope) -> Result<Vec<Uuid>, StoreError>;

    async fn consultant_assignments(
        &self,
        consultant_id: Uuid,
    ) -> Result<Vec<ConsultantAssignment>, StoreError>;

    /// Consultants with an active assignment naming the student or the student's community.
    async fn consultants_serving(
        &self,
        student_id: Uuid,
        community_id: Option<Uuid>,
    ) -> Result<Vec<Uuid>, StoreError>;

    /// Ids of communities matching every supplied filter.
    async fn find_communities(&self, filters: &OrgFilters) -> Result<Vec<Uuid>, StoreError>;

    async fn communities_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Community>, StoreError>;

    // courses and content

    async fn all_course_ids(&self) -> Result<Vec<Uuid>, StoreError>;

    async fn enrolled_course_ids(&self, user_ids: &[Uuid]) -> Result<Vec<Uuid>, StoreError>;

    async fn taught_course_ids(&self, user_ids: &[Uuid]) -> Result<Vec<Uuid>, StoreError>;

    /// Users with course-level access: enrolled students and assigned teachers.
    async fn course_member_ids(&self, course_id: Uuid) -> Result<Vec<Uuid>, StoreError>;

    async fn active_enrolled_user_ids(&self, course_id: Uuid) -> Result<Vec<Uuid>, StoreError>;

    async fn courses_with_lessons(&self, limit: i64) -> Result<Vec<Uuid>, StoreError>;

    /// Lessons of the given courses, ordered by course and then lesson position.
    async fn lessons_for_courses(
        &self,
        course_ids: &[Uuid],
    ) -> Result<Vec<LessonRecord>, StoreError>;

    async fn find_lesson(&self, lesson_id: Uuid) -> Result<LessonRecord, StoreError>;

    /// Group-assignment blocks of the given lessons, ordered by position.
    async fn assignment_blocks(&self, lesson_ids: &[Uuid]) -> Result<Vec<Block>, StoreError>;

    async fn find_block(&self, block_id: Uuid) -> Result<Block, StoreError>;

    async fn block_at(&self, lesson_id: Uuid, position: i32) -> Result<Block, StoreError>;

    // groups and memberships

    async fn find_membership(
        &self,
        user_id: Uuid,
        assignment_id: Uuid,
    ) -> Result<Membership, StoreError>;

    async fn memberships_for_user(
        &self,
        user_id: Uuid,
        assignment_ids: &[Uuid],
    ) -> Result<Vec<Membership>, StoreError>;

    async fn find_group(&self, group_id: Uuid) -> Result<Group, StoreError>;

    async fn find_group_for_community(
        &self,
        assignment_id: Uuid,
        community_id: Uuid,
    ) -> Result<Group, StoreError>;

    async fn groups_for_assignment(&self, assignment_id: Uuid) -> Result<Vec<Group>, StoreError>;

    /// Fails with [`StoreError::UniqueViolation`] when the community already has a group.
    async fn insert_group(&self, new_group: NewGroup) -> Result<Group, StoreError>;

    /// Fails with [`StoreError::UniqueViolation`] when the user is already grouped.
    async fn insert_membership(
        &self,
        new_membership: NewMembership,
    ) -> Result<Membership, StoreError>;

    /// Counts the group's members and inserts the batch as one atomic unit, so concurrent
    /// callers cannot jointly push the group past `max_members`.
    async fn insert_memberships_within_capacity(
        &self,
        group: &Group,
        new_memberships: Vec<NewMembership>,
    ) -> Result<CapacityOutcome, StoreError>;

    async fn group_memberships(&self, group_id: Uuid) -> Result<Vec<Membership>, StoreError>;

    async fn assignment_member_ids(&self, assignment_id: Uuid) -> Result<Vec<Uuid>, StoreError>;

    async fn delete_membership(&self, group_id: Uuid, user_id: Uuid)
    -> Result<usize, StoreError>;

    // submissions

    async fn submissions_for_assignment(
        &self,
        assignment_id: Uuid,
    ) -> Result<Vec<Submission>, StoreError>;

    async fn submissions_for_groups(
        &self,
        group_ids: &[Uuid],
    ) -> Result<Vec<Submission>, StoreError>;

    /// Creates the group's submission or overwrites the existing one.
    async fn upsert_submission(
        &self,
        new_submission: NewSubmission,
    ) -> Result<Submission, StoreError>;
}

#[async_trait]
pub trait SettingsLookup: Send + Sync {
    async fn assignment_settings(
        &self,
        assignment_id: Uuid,
    ) -> Result<AssignmentSettings, StoreError>;
}
