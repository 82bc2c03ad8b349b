use super::dedup_preserving_order;
use crate::model::{Role, RoleGrant};
use crate::store::{EntityStore, StoreError};
use tracing::{debug, warn};
use uuid::Uuid;

/// Courses reachable by a learner, and whether they came from the sampling fallback.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LearnerCourses {
    pub course_ids: Vec<Uuid>,
    pub heuristic: bool,
}

/// Decides which courses a user may see.
pub struct RoleScopeResolver<'a> {
    store: &'a dyn EntityStore,
}

impl<'a> RoleScopeResolver<'a> {
    pub fn new(store: &'a dyn EntityStore) -> Self {
        RoleScopeResolver { store }
    }

    /// Highest-privilege active role; a user without grants is a learner.
    pub async fn highest_role(&self, user_id: Uuid) -> Result<Role, StoreError> {
        let roles = self.store.active_roles(user_id).await?;
        Ok(roles
            .iter()
            .map(RoleGrant::role)
            .max()
            .unwrap_or(Role::Learner))
    }

    /// Courses visible in the assignment overview for a user holding `role`.
    pub async fn visible_courses(&self, user_id: Uuid, role: Role) -> Result<Vec<Uuid>, StoreError> {
        match role {
            Role::Admin => self.store.all_course_ids().await,
            Role::Consultant => self.consultant_courses(user_id).await,
            Role::Teacher | Role::Learner => Ok(Vec::new()),
        }
    }

    async fn consultant_courses(&self, consultant_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        let mut course_ids = self.store.taught_course_ids(&[consultant_id]).await?;

        let assignments = self.store.consultant_assignments(consultant_id).await?;
        let mut students = Vec::new();
        for assignment in &assignments {
            students.extend(assignment.student_id);
            for scope in assignment.scopes() {
                students.extend(self.store.users_in_scope(scope).await?);
            }
        }
        let students = dedup_preserving_order(students);
        debug!(
            "Consultant {} serves {} student(s) through {} assignment(s)",
            consultant_id,
            students.len(),
            assignments.len()
        );

        if !students.is_empty() {
            course_ids.extend(self.store.enrolled_course_ids(&students).await?);
            course_ids.extend(self.store.taught_course_ids(&students).await?);
        }
        Ok(dedup_preserving_order(course_ids))
    }

    /// Courses for the learner listing: enrollments, then taught courses, then courses of the
    /// consultants serving the learner. Only when all three are empty does it sample any
    /// courses that have lessons.
    pub async fn learner_courses(
        &self,
        user_id: Uuid,
        community_id: Option<Uuid>,
        fallback_limit: i64,
    ) -> Result<LearnerCourses, StoreError> {
        let mut course_ids = self.store.enrolled_course_ids(&[user_id]).await?;
        course_ids.extend(self.store.taught_course_ids(&[user_id]).await?);

        let consultants = self.store.consultants_serving(user_id, community_id).await?;
        if !consultants.is_empty() {
            course_ids.extend(self.store.taught_course_ids(&consultants).await?);
        }

        let course_ids = dedup_preserving_order(course_ids);
        if !course_ids.is_empty() {
            return Ok(LearnerCourses {
                course_ids,
                heuristic: false,
            });
        }

        // heuristic: the sample may contain courses unrelated to the learner
        let sampled = self.store.courses_with_lessons(fallback_limit).await?;
        warn!(
            "User {} has no course linkage; falling back to {} sampled course(s)",
            user_id,
            sampled.len()
        );
        Ok(LearnerCourses {
            course_ids: sampled,
            heuristic: true,
        })
    }

    /// The community of the first active role grant naming one, else the profile community.
    pub async fn resolve_user_community(&self, user_id: Uuid) -> Result<Option<Uuid>, StoreError> {
        let roles = self.store.active_roles(user_id).await?;
        if let Some(community_id) = roles.iter().find_map(|r| r.community_id) {
            return Ok(Some(community_id));
        }

        match self.store.find_user(user_id).await {
            Ok(user) => Ok(user.community_id),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}
