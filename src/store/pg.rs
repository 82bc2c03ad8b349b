use super::{CapacityOutcome, EntityStore, SettingsLookup, StoreError};
use crate::model::content::GROUP_ASSIGNMENT_BLOCK_TYPES;
use crate::model::{
    AssignmentSettings, Block, Community, ConsultantAssignment, Group, LessonRecord, Membership,
    NewGroup, NewMembership, NewSubmission, OrgFilters, OrgScope, RoleGrant, Submission, User,
};
use crate::schema::{
    blocks::dsl as blocks_dsl, communities::dsl as comm_dsl,
    consultant_assignments::dsl as ca_dsl, course_assignments::dsl as teach_dsl,
    course_enrollments::dsl as enroll_dsl, courses::dsl as courses_dsl,
    group_assignment_groups::dsl as groups_dsl, group_assignment_members::dsl as members_dsl,
    group_assignment_settings::dsl as settings_dsl, group_assignment_submissions::dsl as sub_dsl,
    lessons::dsl as lessons_dsl, user_roles::dsl as roles_dsl, users::dsl as users_dsl,
};
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use deadpool_diesel::postgres::Pool;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::upsert::excluded;
use tracing::{debug, error, warn};
use uuid::Uuid;

const ACTIVE_ENROLLMENT: &str = "active";

/// Attempts of a SERIALIZABLE capacity transaction before the conflict is reported.
const MAX_SERIALIZABLE_ATTEMPTS: u32 = 3;

impl From<DieselError> for StoreError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => {
                StoreError::NotFound("Resource not found (database query)".to_string())
            }
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                debug!("Unique constraint violated: {}", info.message());
                StoreError::UniqueViolation(info.message().to_string())
            }
            DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, info) => {
                StoreError::NotFound(format!("Referenced row missing: {}", info.message()))
            }
            DieselError::DatabaseError(_, ref info)
                if info.message().starts_with("permission denied") =>
            {
                error!("Database denied access: {}", info.message());
                StoreError::PermissionDenied(info.message().to_string())
            }
            _ => {
                error!("Unhandled Diesel error encountered: {:?}", err);
                StoreError::Other(anyhow::Error::new(err).context("Database query error"))
            }
        }
    }
}

/// [`EntityStore`] backed by PostgreSQL through a deadpool-diesel pool.
#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        PgStore { pool }
    }

    async fn run_query<T, F>(&self, query: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut PgConnection) -> Result<T, DieselError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.pool.get().await.map_err(|pool_err| {
            error!(
                "Failed to get DB connection object from pool: {:?}",
                pool_err
            );
            StoreError::Other(anyhow::Error::new(pool_err).context("Database pool error"))
        })?;
        debug!("DB connection object obtained from pool for interaction");

        match conn.interact(query).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(diesel_err)) => Err(StoreError::from(diesel_err)),
            Err(interact_err) => {
                error!("Deadpool interact error: {:?}", interact_err);
                Err(StoreError::Other(anyhow!(
                    "Database interaction error: {}",
                    interact_err
                )))
            }
        }
    }
}

#[async_trait]
impl EntityStore for PgStore {
    async fn find_user(&self, user_id: Uuid) -> Result<User, StoreError> {
        self.run_query(move |conn| {
            users_dsl::users
                .find(user_id)
                .select(User::as_select())
                .first(conn)
        })
        .await
    }

    async fn users_by_ids(&self, user_ids: &[Uuid]) -> Result<Vec<User>, StoreError> {
        let user_ids = user_ids.to_vec();
        self.run_query(move |conn| {
            users_dsl::users
                .filter(users_dsl::id.eq_any(user_ids))
                .order((users_dsl::last_name.asc(), users_dsl::first_name.asc()))
                .select(User::as_select())
                .load(conn)
        })
        .await
    }

    async fn active_roles(&self, user_id: Uuid) -> Result<Vec<RoleGrant>, StoreError> {
        self.run_query(move |conn| {
            roles_dsl::user_roles
                .filter(roles_dsl::user_id.eq(user_id))
                .filter(roles_dsl::is_active.eq(true))
                .select(RoleGrant::as_select())
                .load(conn)
        })
        .await
    }

    async fn active_roles_for_users(
        &self,
        user_ids: &[Uuid],
    ) -> Result<Vec<RoleGrant>, StoreError> {
        let user_ids = user_ids.to_vec();
        self.run_query(move |conn| {
            roles_dsl::user_roles
                .filter(roles_dsl::user_id.eq_any(user_ids))
                .filter(roles_dsl::is_active.eq(true))
                .select(RoleGrant::as_select())
                .load(conn)
        })
        .await
    }

    async fn users_in_scope(&self, scope: OrgScope) -> Result<Vec<Uuid>, StoreError> {
        self.run_query(move |conn| {
            let query = roles_dsl::user_roles
                .filter(roles_dsl::is_active.eq(true))
                .select(roles_dsl::user_id)
                .distinct()
                .into_boxed();
            let query = match scope {
                OrgScope::School(id) => query.filter(roles_dsl::school_id.eq(id)),
                OrgScope::Generation(id) => query.filter(roles_dsl::generation_id.eq(id)),
                OrgScope::Community(id) => query.filter(roles_dsl::community_id.eq(id)),
            };
            query.load::<Uuid>(conn)
        })
        .await
    }

    async fn consultant_assignments(
        &self,
        consultant_id: Uuid,
    ) -> Result<Vec<ConsultantAssignment>, StoreError> {
        self.run_query(move |conn| {
            ca_dsl::consultant_assignments
                .filter(ca_dsl::consultant_id.eq(consultant_id))
                .filter(ca_dsl::is_active.eq(true))
                .select(ConsultantAssignment::as_select())
                .load(conn)
        })
        .await
    }

    async fn consultants_serving(
        &self,
        student_id: Uuid,
        community_id: Option<Uuid>,
    ) -> Result<Vec<Uuid>, StoreError> {
        self.run_query(move |conn| {
            let active = ca_dsl::consultant_assignments.filter(ca_dsl::is_active.eq(true));
            match community_id {
                Some(community_id) => active
                    .filter(
                        ca_dsl::student_id
                            .eq(student_id)
                            .or(ca_dsl::community_id.eq(community_id)),
                    )
                    .select(ca_dsl::consultant_id)
                    .distinct()
                    .load::<Uuid>(conn),
                None => active
                    .filter(ca_dsl::student_id.eq(student_id))
                    .select(ca_dsl::consultant_id)
                    .distinct()
                    .load::<Uuid>(conn),
            }
        })
        .await
    }

    async fn find_communities(&self, filters: &OrgFilters) -> Result<Vec<Uuid>, StoreError> {
        let filters = *filters;
        self.run_query(move |conn| {
            let mut query = comm_dsl::communities.select(comm_dsl::id).into_boxed();
            if let Some(school_id) = filters.school_id {
                query = query.filter(comm_dsl::school_id.eq(school_id));
            }
            if let Some(community_id) = filters.community_id {
                query = query.filter(comm_dsl::id.eq(community_id));
            }
            if let Some(generation_id) = filters.generation_id {
                query = query.filter(comm_dsl::generation_id.eq(generation_id));
            }
            query.load::<Uuid>(conn)
        })
        .await
    }

    async fn communities_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Community>, StoreError> {
        let ids = ids.to_vec();
        self.run_query(move |conn| {
            comm_dsl::communities
                .filter(comm_dsl::id.eq_any(ids))
                .select(Community::as_select())
                .load(conn)
        })
        .await
    }

    async fn all_course_ids(&self) -> Result<Vec<Uuid>, StoreError> {
        self.run_query(move |conn| {
            courses_dsl::courses
                .select(courses_dsl::id)
                .order((courses_dsl::created_at.asc(), courses_dsl::id.asc()))
                .load::<Uuid>(conn)
        })
        .await
    }

    async fn enrolled_course_ids(&self, user_ids: &[Uuid]) -> Result<Vec<Uuid>, StoreError> {
        let user_ids = user_ids.to_vec();
        self.run_query(move |conn| {
            enroll_dsl::course_enrollments
                .filter(enroll_dsl::user_id.eq_any(user_ids))
                .filter(enroll_dsl::status.eq(ACTIVE_ENROLLMENT))
                .select(enroll_dsl::course_id)
                .distinct()
                .load::<Uuid>(conn)
        })
        .await
    }

    async fn taught_course_ids(&self, user_ids: &[Uuid]) -> Result<Vec<Uuid>, StoreError> {
        let user_ids = user_ids.to_vec();
        self.run_query(move |conn| {
            teach_dsl::course_assignments
                .filter(teach_dsl::teacher_id.eq_any(user_ids))
                .select(teach_dsl::course_id)
                .distinct()
                .load::<Uuid>(conn)
        })
        .await
    }

    async fn course_member_ids(&self, course_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        self.run_query(move |conn| {
            let mut user_ids = enroll_dsl::course_enrollments
                .filter(enroll_dsl::course_id.eq(course_id))
                .select(enroll_dsl::user_id)
                .load::<Uuid>(conn)?;
            let teacher_ids = teach_dsl::course_assignments
                .filter(teach_dsl::course_id.eq(course_id))
                .select(teach_dsl::teacher_id)
                .load::<Uuid>(conn)?;
            user_ids.extend(teacher_ids);
            Ok(user_ids)
        })
        .await
    }

    async fn active_enrolled_user_ids(&self, course_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        self.run_query(move |conn| {
            enroll_dsl::course_enrollments
                .filter(enroll_dsl::course_id.eq(course_id))
                .filter(enroll_dsl::status.eq(ACTIVE_ENROLLMENT))
                .order(enroll_dsl::enrolled_at.asc())
                .select(enroll_dsl::user_id)
                .load::<Uuid>(conn)
        })
        .await
    }

    async fn courses_with_lessons(&self, limit: i64) -> Result<Vec<Uuid>, StoreError> {
        self.run_query(move |conn| {
            lessons_dsl::lessons
                .select(lessons_dsl::course_id)
                .distinct()
                .order(lessons_dsl::course_id)
                .limit(limit)
                .load::<Uuid>(conn)
        })
        .await
    }

    async fn lessons_for_courses(
        &self,
        course_ids: &[Uuid],
    ) -> Result<Vec<LessonRecord>, StoreError> {
        let course_ids = course_ids.to_vec();
        self.run_query(move |conn| {
            lessons_dsl::lessons
                .inner_join(courses_dsl::courses)
                .filter(lessons_dsl::course_id.eq_any(course_ids))
                .order((
                    courses_dsl::created_at.asc(),
                    courses_dsl::id.asc(),
                    lessons_dsl::position.asc(),
                    lessons_dsl::created_at.asc(),
                ))
                .select((
                    lessons_dsl::id,
                    lessons_dsl::course_id,
                    courses_dsl::title,
                    lessons_dsl::title,
                    lessons_dsl::position,
                    lessons_dsl::created_at,
                ))
                .load::<LessonRecord>(conn)
        })
        .await
    }

    async fn find_lesson(&self, lesson_id: Uuid) -> Result<LessonRecord, StoreError> {
        self.run_query(move |conn| {
            lessons_dsl::lessons
                .inner_join(courses_dsl::courses)
                .filter(lessons_dsl::id.eq(lesson_id))
                .select((
                    lessons_dsl::id,
                    lessons_dsl::course_id,
                    courses_dsl::title,
                    lessons_dsl::title,
                    lessons_dsl::position,
                    lessons_dsl::created_at,
                ))
                .first::<LessonRecord>(conn)
        })
        .await
    }

    async fn assignment_blocks(&self, lesson_ids: &[Uuid]) -> Result<Vec<Block>, StoreError> {
        let lesson_ids = lesson_ids.to_vec();
        self.run_query(move |conn| {
            blocks_dsl::blocks
                .filter(blocks_dsl::lesson_id.eq_any(lesson_ids))
                .filter(blocks_dsl::block_type.eq_any(GROUP_ASSIGNMENT_BLOCK_TYPES.to_vec()))
                .order((blocks_dsl::lesson_id.asc(), blocks_dsl::position.asc()))
                .select(Block::as_select())
                .load(conn)
        })
        .await
    }

    async fn find_block(&self, block_id: Uuid) -> Result<Block, StoreError> {
        self.run_query(move |conn| {
            blocks_dsl::blocks
                .find(block_id)
                .select(Block::as_select())
                .first(conn)
        })
        .await
    }

    async fn block_at(&self, lesson_id: Uuid, position: i32) -> Result<Block, StoreError> {
        self.run_query(move |conn| {
            blocks_dsl::blocks
                .filter(blocks_dsl::lesson_id.eq(lesson_id))
                .filter(blocks_dsl::position.eq(position))
                .select(Block::as_select())
                .first(conn)
        })
        .await
    }

    async fn find_membership(
        &self,
        user_id: Uuid,
        assignment_id: Uuid,
    ) -> Result<Membership, StoreError> {
        self.run_query(move |conn| {
            members_dsl::group_assignment_members
                .filter(members_dsl::user_id.eq(user_id))
                .filter(members_dsl::assignment_id.eq(assignment_id))
                .select(Membership::as_select())
                .first(conn)
        })
        .await
    }

    async fn memberships_for_user(
        &self,
        user_id: Uuid,
        assignment_ids: &[Uuid],
    ) -> Result<Vec<Membership>, StoreError> {
        let assignment_ids = assignment_ids.to_vec();
        self.run_query(move |conn| {
            members_dsl::group_assignment_members
                .filter(members_dsl::user_id.eq(user_id))
                .filter(members_dsl::assignment_id.eq_any(assignment_ids))
                .select(Membership::as_select())
                .load(conn)
        })
        .await
    }

    async fn find_group(&self, group_id: Uuid) -> Result<Group, StoreError> {
        self.run_query(move |conn| {
            groups_dsl::group_assignment_groups
                .find(group_id)
                .select(Group::as_select())
                .first(conn)
        })
        .await
    }

    async fn find_group_for_community(
        &self,
        assignment_id: Uuid,
        community_id: Uuid,
    ) -> Result<Group, StoreError> {
        self.run_query(move |conn| {
            groups_dsl::group_assignment_groups
                .filter(groups_dsl::assignment_id.eq(assignment_id))
                .filter(groups_dsl::community_id.eq(community_id))
                .select(Group::as_select())
                .first(conn)
        })
        .await
    }

    async fn groups_for_assignment(&self, assignment_id: Uuid) -> Result<Vec<Group>, StoreError> {
        self.run_query(move |conn| {
            groups_dsl::group_assignment_groups
                .filter(groups_dsl::assignment_id.eq(assignment_id))
                .order(groups_dsl::created_at.asc())
                .select(Group::as_select())
                .load(conn)
        })
        .await
    }

    async fn insert_group(&self, new_group: NewGroup) -> Result<Group, StoreError> {
        self.run_query(move |conn| {
            diesel::insert_into(groups_dsl::group_assignment_groups)
                .values(&new_group)
                .returning(Group::as_returning())
                .get_result(conn)
        })
        .await
    }

    async fn insert_membership(
        &self,
        new_membership: NewMembership,
    ) -> Result<Membership, StoreError> {
        self.run_query(move |conn| {
            diesel::insert_into(members_dsl::group_assignment_members)
                .values(&new_membership)
                .returning(Membership::as_returning())
                .get_result(conn)
        })
        .await
    }

    async fn insert_memberships_within_capacity(
        &self,
        group: &Group,
        new_memberships: Vec<NewMembership>,
    ) -> Result<CapacityOutcome, StoreError> {
        let group_id = group.id;
        let max_members = group.max_members;

        self.run_query(move |conn| {
            let mut attempt = 1;
            loop {
                let outcome = conn
                    .build_transaction()
                    .serializable()
                    .run::<_, DieselError, _>(|tx| {
                        let current = members_dsl::group_assignment_members
                            .filter(members_dsl::group_id.eq(group_id))
                            .count()
                            .get_result::<i64>(tx)?;

                        if current + new_memberships.len() as i64 > i64::from(max_members) {
                            return Ok(CapacityOutcome::Full {
                                current,
                                max_members,
                            });
                        }

                        let added = diesel::insert_into(members_dsl::group_assignment_members)
                            .values(&new_memberships)
                            .returning(Membership::as_returning())
                            .get_results(tx)?;
                        Ok(CapacityOutcome::Added(added))
                    });

                match outcome {
                    Err(DieselError::DatabaseError(DatabaseErrorKind::SerializationFailure, _))
                        if attempt < MAX_SERIALIZABLE_ATTEMPTS =>
                    {
                        warn!(
                            "Serialization conflict adding members to group {} (attempt {}), retrying",
                            group_id, attempt
                        );
                        attempt += 1;
                    }
                    other => return other,
                }
            }
        })
        .await
    }

    async fn group_memberships(&self, group_id: Uuid) -> Result<Vec<Membership>, StoreError> {
        self.run_query(move |conn| {
            members_dsl::group_assignment_members
                .filter(members_dsl::group_id.eq(group_id))
                .order(members_dsl::joined_at.asc())
                .select(Membership::as_select())
                .load(conn)
        })
        .await
    }

    async fn assignment_member_ids(&self, assignment_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        self.run_query(move |conn| {
            members_dsl::group_assignment_members
                .filter(members_dsl::assignment_id.eq(assignment_id))
                .select(members_dsl::user_id)
                .load::<Uuid>(conn)
        })
        .await
    }

    async fn delete_membership(
        &self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<usize, StoreError> {
        self.run_query(move |conn| {
            diesel::delete(
                members_dsl::group_assignment_members
                    .filter(members_dsl::group_id.eq(group_id))
                    .filter(members_dsl::user_id.eq(user_id)),
            )
            .execute(conn)
        })
        .await
    }

    async fn submissions_for_assignment(
        &self,
        assignment_id: Uuid,
    ) -> Result<Vec<Submission>, StoreError> {
        self.run_query(move |conn| {
            sub_dsl::group_assignment_submissions
                .filter(sub_dsl::assignment_id.eq(assignment_id))
                .order(sub_dsl::updated_at.asc())
                .select(Submission::as_select())
                .load(conn)
        })
        .await
    }

    async fn submissions_for_groups(
        &self,
        group_ids: &[Uuid],
    ) -> Result<Vec<Submission>, StoreError> {
        let group_ids = group_ids.to_vec();
        self.run_query(move |conn| {
            sub_dsl::group_assignment_submissions
                .filter(sub_dsl::group_id.eq_any(group_ids))
                .select(Submission::as_select())
                .load(conn)
        })
        .await
    }

    async fn upsert_submission(
        &self,
        new_submission: NewSubmission,
    ) -> Result<Submission, StoreError> {
        self.run_query(move |conn| {
            diesel::insert_into(sub_dsl::group_assignment_submissions)
                .values(&new_submission)
                .on_conflict((sub_dsl::group_id, sub_dsl::assignment_id))
                .do_update()
                .set((
                    sub_dsl::user_id.eq(excluded(sub_dsl::user_id)),
                    sub_dsl::status.eq(excluded(sub_dsl::status)),
                    sub_dsl::content.eq(excluded(sub_dsl::content)),
                    sub_dsl::submitted_at.eq(excluded(sub_dsl::submitted_at)),
                    sub_dsl::updated_at.eq(Utc::now()),
                ))
                .returning(Submission::as_returning())
                .get_result(conn)
        })
        .await
    }
}

#[async_trait]
impl SettingsLookup for PgStore {
    async fn assignment_settings(
        &self,
        assignment_id: Uuid,
    ) -> Result<AssignmentSettings, StoreError> {
        let consultant_managed = self
            .run_query(move |conn| {
                settings_dsl::group_assignment_settings
                    .find(assignment_id)
                    .select(settings_dsl::consultant_managed)
                    .first::<bool>(conn)
                    .optional()
            })
            .await?;

        Ok(AssignmentSettings {
            consultant_managed: consultant_managed.unwrap_or(false),
        })
    }
}
