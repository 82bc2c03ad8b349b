//! In-process [`EntityStore`] used by the test suite and for local experiments.
//!
//! Tables live behind one tokio `RwLock`. Each trait call takes the lock once, so a check
//! followed by a write in two separate calls can interleave with other callers exactly as it
//! would against PostgreSQL. The uniqueness constraints of the migration are enforced on insert.

use super::{CapacityOutcome, EntityStore, SettingsLookup, StoreError};
use crate::model::{
    AssignmentSettings, Block, Community, ConsultantAssignment, Course, Group, Lesson,
    LessonRecord, Membership, NewGroup, NewMembership, NewSubmission, OrgFilters, OrgScope, Role,
    RoleGrant, Submission, SubmissionStatus, User,
};
use anyhow::anyhow;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

/// Failure every subsequent call reports until cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    Unavailable,
    PermissionDenied,
}

struct Enrollment {
    course_id: Uuid,
    user_id: Uuid,
    status: String,
    enrolled_at: DateTime<Utc>,
}

struct Teaching {
    course_id: Uuid,
    teacher_id: Uuid,
}

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    roles: Vec<RoleGrant>,
    communities: Vec<Community>,
    consultant_assignments: Vec<ConsultantAssignment>,
    courses: Vec<Course>,
    enrollments: Vec<Enrollment>,
    teachings: Vec<Teaching>,
    lessons: Vec<Lesson>,
    blocks: Vec<Block>,
    settings: HashMap<Uuid, AssignmentSettings>,
    groups: Vec<Group>,
    memberships: Vec<Membership>,
    submissions: Vec<Submission>,
}

impl Tables {
    fn lesson_record(&self, lesson: &Lesson) -> LessonRecord {
        let course_title = self
            .courses
            .iter()
            .find(|c| c.id == lesson.course_id)
            .map(|c| c.title.as_str())
            .unwrap_or_default();
        LessonRecord::new(lesson, course_title)
    }

    fn is_grouped(&self, user_id: Uuid, assignment_id: Uuid) -> bool {
        self.memberships
            .iter()
            .any(|m| m.user_id == user_id && m.assignment_id == assignment_id)
    }

    fn push_membership(&mut self, new_membership: NewMembership) -> Membership {
        let membership = Membership {
            id: Uuid::new_v4(),
            group_id: new_membership.group_id,
            assignment_id: new_membership.assignment_id,
            user_id: new_membership.user_id,
            role: new_membership.role,
            joined_at: Utc::now(),
        };
        self.memberships.push(membership.clone());
        membership
    }
}

fn membership_conflict() -> StoreError {
    StoreError::UniqueViolation(
        "duplicate key value violates unique constraint \"group_assignment_members_user_assignment_key\""
            .to_string(),
    )
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    failure: RwLock<Option<InjectedFailure>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn inject_failure(&self, failure: Option<InjectedFailure>) {
        *self.failure.write().await = failure;
    }

    async fn check_failure(&self) -> Result<(), StoreError> {
        match *self.failure.read().await {
            None => Ok(()),
            Some(InjectedFailure::Unavailable) => {
                Err(StoreError::Other(anyhow!("in-memory store is unavailable")))
            }
            Some(InjectedFailure::PermissionDenied) => Err(StoreError::PermissionDenied(
                "permission denied for table group_assignment_members".to_string(),
            )),
        }
    }

    async fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.check_failure().await?;
        Ok(self.tables.read().await)
    }

    async fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.check_failure().await?;
        Ok(self.tables.write().await)
    }

    // seeding

    pub async fn add_community(
        &self,
        name: &str,
        school_id: Option<Uuid>,
        generation_id: Option<Uuid>,
    ) -> Community {
        let community = Community {
            id: Uuid::new_v4(),
            name: name.to_string(),
            school_id,
            generation_id,
        };
        self.tables.write().await.communities.push(community.clone());
        community
    }

    pub async fn add_user(
        &self,
        first_name: &str,
        last_name: &str,
        community_id: Option<Uuid>,
    ) -> User {
        let id = Uuid::new_v4();
        let user = User {
            id,
            email: format!(
                "{}.{}.{}@example.com",
                first_name.to_lowercase(),
                last_name.to_lowercase(),
                id.simple()
            ),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            avatar_url: None,
            community_id,
            created_at: Utc::now(),
        };
        self.tables.write().await.users.push(user.clone());
        user
    }

    pub async fn grant_role(&self, user_id: Uuid, role: Role, scope: Option<OrgScope>) -> RoleGrant {
        let mut grant = RoleGrant {
            id: Uuid::new_v4(),
            user_id,
            role_type: role.as_str().to_string(),
            school_id: None,
            generation_id: None,
            community_id: None,
            is_active: true,
        };
        match scope {
            Some(OrgScope::School(id)) => grant.school_id = Some(id),
            Some(OrgScope::Generation(id)) => grant.generation_id = Some(id),
            Some(OrgScope::Community(id)) => grant.community_id = Some(id),
            None => {}
        }
        self.tables.write().await.roles.push(grant.clone());
        grant
    }

    pub async fn add_consultant_assignment(
        &self,
        consultant_id: Uuid,
        student_id: Option<Uuid>,
        scope: Option<OrgScope>,
    ) -> ConsultantAssignment {
        let mut assignment = ConsultantAssignment {
            id: Uuid::new_v4(),
            consultant_id,
            student_id,
            community_id: None,
            school_id: None,
            generation_id: None,
            is_active: true,
        };
        match scope {
            Some(OrgScope::School(id)) => assignment.school_id = Some(id),
            Some(OrgScope::Generation(id)) => assignment.generation_id = Some(id),
            Some(OrgScope::Community(id)) => assignment.community_id = Some(id),
            None => {}
        }
        self.tables
            .write()
            .await
            .consultant_assignments
            .push(assignment.clone());
        assignment
    }

    pub async fn add_course(&self, title: &str) -> Course {
        let course = Course {
            id: Uuid::new_v4(),
            title: title.to_string(),
            community_id: None,
            created_at: Utc::now(),
        };
        self.tables.write().await.courses.push(course.clone());
        course
    }

    pub async fn enroll(&self, course_id: Uuid, user_id: Uuid) {
        self.enroll_with_status(course_id, user_id, "active").await;
    }

    pub async fn enroll_with_status(&self, course_id: Uuid, user_id: Uuid, status: &str) {
        self.tables.write().await.enrollments.push(Enrollment {
            course_id,
            user_id,
            status: status.to_string(),
            enrolled_at: Utc::now(),
        });
    }

    pub async fn assign_teacher(&self, course_id: Uuid, teacher_id: Uuid) {
        self.tables.write().await.teachings.push(Teaching {
            course_id,
            teacher_id,
        });
    }

    pub async fn add_lesson(&self, course_id: Uuid, title: &str, position: i32) -> Lesson {
        let lesson = Lesson {
            id: Uuid::new_v4(),
            course_id,
            title: title.to_string(),
            position,
            created_at: Utc::now(),
        };
        self.tables.write().await.lessons.push(lesson.clone());
        lesson
    }

    pub async fn add_block(
        &self,
        lesson_id: Uuid,
        position: i32,
        block_type: &str,
        payload: Option<JsonValue>,
    ) -> Block {
        let block = Block {
            id: Uuid::new_v4(),
            lesson_id,
            position,
            block_type: block_type.to_string(),
            payload,
            created_at: Utc::now(),
        };
        self.tables.write().await.blocks.push(block.clone());
        block
    }

    pub async fn set_consultant_managed(&self, assignment_id: Uuid, consultant_managed: bool) {
        self.tables
            .write()
            .await
            .settings
            .insert(assignment_id, AssignmentSettings { consultant_managed });
    }

    pub async fn add_submission(
        &self,
        group_id: Uuid,
        assignment_id: Uuid,
        user_id: Uuid,
        status: SubmissionStatus,
        grade: Option<BigDecimal>,
    ) -> Submission {
        let now = Utc::now();
        let submission = Submission {
            id: Uuid::new_v4(),
            group_id,
            assignment_id,
            user_id,
            status: status.as_str().to_string(),
            content: None,
            grade,
            submitted_at: status.is_handed_in().then_some(now),
            updated_at: now,
        };
        self.tables.write().await.submissions.push(submission.clone());
        submission
    }

    // inspection

    pub async fn group_size(&self, group_id: Uuid) -> usize {
        self.tables
            .read()
            .await
            .memberships
            .iter()
            .filter(|m| m.group_id == group_id)
            .count()
    }

    pub async fn membership_count(&self, user_id: Uuid, assignment_id: Uuid) -> usize {
        self.tables
            .read()
            .await
            .memberships
            .iter()
            .filter(|m| m.user_id == user_id && m.assignment_id == assignment_id)
            .count()
    }

    pub async fn group_count(&self, assignment_id: Uuid) -> usize {
        self.tables
            .read()
            .await
            .groups
            .iter()
            .filter(|g| g.assignment_id == assignment_id)
            .count()
    }
}

fn not_found(what: &str) -> StoreError {
    StoreError::NotFound(format!("{} not found", what))
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn find_user(&self, user_id: Uuid) -> Result<User, StoreError> {
        let tables = self.read().await?;
        tables
            .users
            .iter()
            .find(|u| u.id == user_id)
            .cloned()
            .ok_or_else(|| not_found("User"))
    }

    async fn users_by_ids(&self, user_ids: &[Uuid]) -> Result<Vec<User>, StoreError> {
        let tables = self.read().await?;
        let mut users: Vec<User> = tables
            .users
            .iter()
            .filter(|u| user_ids.contains(&u.id))
            .cloned()
            .collect();
        users.sort_by(|a, b| {
            (a.last_name.as_str(), a.first_name.as_str())
                .cmp(&(b.last_name.as_str(), b.first_name.as_str()))
        });
        Ok(users)
    }

    async fn active_roles(&self, user_id: Uuid) -> Result<Vec<RoleGrant>, StoreError> {
        let tables = self.read().await?;
        Ok(tables
            .roles
            .iter()
            .filter(|r| r.user_id == user_id && r.is_active)
            .cloned()
            .collect())
    }

    async fn active_roles_for_users(
        &self,
        user_ids: &[Uuid],
    ) -> Result<Vec<RoleGrant>, StoreError> {
        let tables = self.read().await?;
        Ok(tables
            .roles
            .iter()
            .filter(|r| r.is_active && user_ids.contains(&r.user_id))
            .cloned()
            .collect())
    }

    async fn users_in_scope(&self, scope: OrgScope) -> Result<Vec<Uuid>, StoreError> {
        let tables = self.read().await?;
        let mut seen = HashSet::new();
        Ok(tables
            .roles
            .iter()
            .filter(|r| r.is_active)
            .filter(|r| match scope {
                OrgScope::School(id) => r.school_id == Some(id),
                OrgScope::Generation(id) => r.generation_id == Some(id),
                OrgScope::Community(id) => r.community_id == Some(id),
            })
            .map(|r| r.user_id)
            .filter(|id| seen.insert(*id))
            .collect())
    }

    async fn consultant_assignments(
        &self,
        consultant_id: Uuid,
    ) -> Result<Vec<ConsultantAssignment>, StoreError> {
        let tables = self.read().await?;
        Ok(tables
            .consultant_assignments
            .iter()
            .filter(|a| a.consultant_id == consultant_id && a.is_active)
            .cloned()
            .collect())
    }

    async fn consultants_serving(
        &self,
        student_id: Uuid,
        community_id: Option<Uuid>,
    ) -> Result<Vec<Uuid>, StoreError> {
        let tables = self.read().await?;
        let mut seen = HashSet::new();
        Ok(tables
            .consultant_assignments
            .iter()
            .filter(|a| a.is_active)
            .filter(|a| {
                a.student_id == Some(student_id)
                    || (community_id.is_some() && a.community_id == community_id)
            })
            .map(|a| a.consultant_id)
            .filter(|id| seen.insert(*id))
            .collect())
    }

    async fn find_communities(&self, filters: &OrgFilters) -> Result<Vec<Uuid>, StoreError> {
        let tables = self.read().await?;
        Ok(tables
            .communities
            .iter()
            .filter(|c| filters.matches(c))
            .map(|c| c.id)
            .collect())
    }

    async fn communities_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Community>, StoreError> {
        let tables = self.read().await?;
        Ok(tables
            .communities
            .iter()
            .filter(|c| ids.contains(&c.id))
            .cloned()
            .collect())
    }

    async fn all_course_ids(&self) -> Result<Vec<Uuid>, StoreError> {
        let tables = self.read().await?;
        Ok(tables.courses.iter().map(|c| c.id).collect())
    }

    async fn enrolled_course_ids(&self, user_ids: &[Uuid]) -> Result<Vec<Uuid>, StoreError> {
        let tables = self.read().await?;
        let mut seen = HashSet::new();
        Ok(tables
            .enrollments
            .iter()
            .filter(|e| e.status == "active" && user_ids.contains(&e.user_id))
            .map(|e| e.course_id)
            .filter(|id| seen.insert(*id))
            .collect())
    }

    async fn taught_course_ids(&self, user_ids: &[Uuid]) -> Result<Vec<Uuid>, StoreError> {
        let tables = self.read().await?;
        let mut seen = HashSet::new();
        Ok(tables
            .teachings
            .iter()
            .filter(|t| user_ids.contains(&t.teacher_id))
            .map(|t| t.course_id)
            .filter(|id| seen.insert(*id))
            .collect())
    }

    async fn course_member_ids(&self, course_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        let tables = self.read().await?;
        let enrolled = tables
            .enrollments
            .iter()
            .filter(|e| e.course_id == course_id)
            .map(|e| e.user_id);
        let teachers = tables
            .teachings
            .iter()
            .filter(|t| t.course_id == course_id)
            .map(|t| t.teacher_id);
        Ok(enrolled.chain(teachers).collect())
    }

    async fn active_enrolled_user_ids(&self, course_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        let tables = self.read().await?;
        let mut enrollments: Vec<&Enrollment> = tables
            .enrollments
            .iter()
            .filter(|e| e.course_id == course_id && e.status == "active")
            .collect();
        enrollments.sort_by_key(|e| e.enrolled_at);
        Ok(enrollments.into_iter().map(|e| e.user_id).collect())
    }

    async fn courses_with_lessons(&self, limit: i64) -> Result<Vec<Uuid>, StoreError> {
        let tables = self.read().await?;
        let mut course_ids: Vec<Uuid> = tables.lessons.iter().map(|l| l.course_id).collect();
        course_ids.sort();
        course_ids.dedup();
        course_ids.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(course_ids)
    }

    async fn lessons_for_courses(
        &self,
        course_ids: &[Uuid],
    ) -> Result<Vec<LessonRecord>, StoreError> {
        let tables = self.read().await?;
        let mut records = Vec::new();
        for course in tables.courses.iter().filter(|c| course_ids.contains(&c.id)) {
            let mut lessons: Vec<&Lesson> = tables
                .lessons
                .iter()
                .filter(|l| l.course_id == course.id)
                .collect();
            lessons.sort_by_key(|l| l.position);
            records.extend(lessons.into_iter().map(|l| LessonRecord::new(l, &course.title)));
        }
        Ok(records)
    }

    async fn find_lesson(&self, lesson_id: Uuid) -> Result<LessonRecord, StoreError> {
        let tables = self.read().await?;
        tables
            .lessons
            .iter()
            .find(|l| l.id == lesson_id)
            .map(|l| tables.lesson_record(l))
            .ok_or_else(|| not_found("Lesson"))
    }

    async fn assignment_blocks(&self, lesson_ids: &[Uuid]) -> Result<Vec<Block>, StoreError> {
        let tables = self.read().await?;
        let mut blocks: Vec<Block> = tables
            .blocks
            .iter()
            .filter(|b| lesson_ids.contains(&b.lesson_id) && b.is_group_assignment())
            .cloned()
            .collect();
        blocks.sort_by_key(|b| b.position);
        Ok(blocks)
    }

    async fn find_block(&self, block_id: Uuid) -> Result<Block, StoreError> {
        let tables = self.read().await?;
        tables
            .blocks
            .iter()
            .find(|b| b.id == block_id)
            .cloned()
            .ok_or_else(|| not_found("Block"))
    }

    async fn block_at(&self, lesson_id: Uuid, position: i32) -> Result<Block, StoreError> {
        let tables = self.read().await?;
        tables
            .blocks
            .iter()
            .find(|b| b.lesson_id == lesson_id && b.position == position)
            .cloned()
            .ok_or_else(|| not_found("Block"))
    }

    async fn find_membership(
        &self,
        user_id: Uuid,
        assignment_id: Uuid,
    ) -> Result<Membership, StoreError> {
        let tables = self.read().await?;
        tables
            .memberships
            .iter()
            .find(|m| m.user_id == user_id && m.assignment_id == assignment_id)
            .cloned()
            .ok_or_else(|| not_found("Membership"))
    }

    async fn memberships_for_user(
        &self,
        user_id: Uuid,
        assignment_ids: &[Uuid],
    ) -> Result<Vec<Membership>, StoreError> {
        let tables = self.read().await?;
        Ok(tables
            .memberships
            .iter()
            .filter(|m| m.user_id == user_id && assignment_ids.contains(&m.assignment_id))
            .cloned()
            .collect())
    }

    async fn find_group(&self, group_id: Uuid) -> Result<Group, StoreError> {
        let tables = self.read().await?;
        tables
            .groups
            .iter()
            .find(|g| g.id == group_id)
            .cloned()
            .ok_or_else(|| not_found("Group"))
    }

    async fn find_group_for_community(
        &self,
        assignment_id: Uuid,
        community_id: Uuid,
    ) -> Result<Group, StoreError> {
        let tables = self.read().await?;
        tables
            .groups
            .iter()
            .find(|g| g.assignment_id == assignment_id && g.community_id == community_id)
            .cloned()
            .ok_or_else(|| not_found("Group"))
    }

    async fn groups_for_assignment(&self, assignment_id: Uuid) -> Result<Vec<Group>, StoreError> {
        let tables = self.read().await?;
        Ok(tables
            .groups
            .iter()
            .filter(|g| g.assignment_id == assignment_id)
            .cloned()
            .collect())
    }

    async fn insert_group(&self, new_group: NewGroup) -> Result<Group, StoreError> {
        let mut tables = self.write().await?;
        if !tables.blocks.iter().any(|b| b.id == new_group.assignment_id) {
            return Err(StoreError::NotFound(
                "Referenced row missing: assignment block not present".to_string(),
            ));
        }
        if !tables.communities.iter().any(|c| c.id == new_group.community_id) {
            return Err(StoreError::NotFound(
                "Referenced row missing: community not present".to_string(),
            ));
        }
        let taken = tables.groups.iter().any(|g| {
            g.assignment_id == new_group.assignment_id && g.community_id == new_group.community_id
        });
        if taken {
            return Err(StoreError::UniqueViolation(
                "duplicate key value violates unique constraint \"group_assignment_groups_assignment_community_key\""
                    .to_string(),
            ));
        }

        let group = Group {
            id: Uuid::new_v4(),
            assignment_id: new_group.assignment_id,
            community_id: new_group.community_id,
            name: new_group.name,
            max_members: new_group.max_members,
            is_consultant_managed: new_group.is_consultant_managed,
            created_at: Utc::now(),
        };
        tables.groups.push(group.clone());
        Ok(group)
    }

    async fn insert_membership(
        &self,
        new_membership: NewMembership,
    ) -> Result<Membership, StoreError> {
        let mut tables = self.write().await?;
        if !tables.groups.iter().any(|g| g.id == new_membership.group_id) {
            return Err(not_found("Group"));
        }
        if tables.is_grouped(new_membership.user_id, new_membership.assignment_id) {
            return Err(membership_conflict());
        }
        Ok(tables.push_membership(new_membership))
    }

    async fn insert_memberships_within_capacity(
        &self,
        group: &Group,
        new_memberships: Vec<NewMembership>,
    ) -> Result<CapacityOutcome, StoreError> {
        let mut tables = self.write().await?;
        let current = tables
            .memberships
            .iter()
            .filter(|m| m.group_id == group.id)
            .count() as i64;
        if current + new_memberships.len() as i64 > i64::from(group.max_members) {
            return Ok(CapacityOutcome::Full {
                current,
                max_members: group.max_members,
            });
        }

        let mut batch = HashSet::new();
        for new_membership in &new_memberships {
            let key = (new_membership.user_id, new_membership.assignment_id);
            if tables.is_grouped(key.0, key.1) || !batch.insert(key) {
                return Err(membership_conflict());
            }
        }

        let added = new_memberships
            .into_iter()
            .map(|m| tables.push_membership(m))
            .collect();
        Ok(CapacityOutcome::Added(added))
    }

    async fn group_memberships(&self, group_id: Uuid) -> Result<Vec<Membership>, StoreError> {
        let tables = self.read().await?;
        Ok(tables
            .memberships
            .iter()
            .filter(|m| m.group_id == group_id)
            .cloned()
            .collect())
    }

    async fn assignment_member_ids(&self, assignment_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        let tables = self.read().await?;
        Ok(tables
            .memberships
            .iter()
            .filter(|m| m.assignment_id == assignment_id)
            .map(|m| m.user_id)
            .collect())
    }

    async fn delete_membership(
        &self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<usize, StoreError> {
        let mut tables = self.write().await?;
        let before = tables.memberships.len();
        tables
            .memberships
            .retain(|m| !(m.group_id == group_id && m.user_id == user_id));
        Ok(before - tables.memberships.len())
    }

    async fn submissions_for_assignment(
        &self,
        assignment_id: Uuid,
    ) -> Result<Vec<Submission>, StoreError> {
        let tables = self.read().await?;
        Ok(tables
            .submissions
            .iter()
            .filter(|s| s.assignment_id == assignment_id)
            .cloned()
            .collect())
    }

    async fn submissions_for_groups(
        &self,
        group_ids: &[Uuid],
    ) -> Result<Vec<Submission>, StoreError> {
        let tables = self.read().await?;
        Ok(tables
            .submissions
            .iter()
            .filter(|s| group_ids.contains(&s.group_id))
            .cloned()
            .collect())
    }

    async fn upsert_submission(
        &self,
        new_submission: NewSubmission,
    ) -> Result<Submission, StoreError> {
        let mut tables = self.write().await?;
        if !tables.groups.iter().any(|g| g.id == new_submission.group_id) {
            return Err(not_found("Group"));
        }

        let now = Utc::now();
        if let Some(existing) = tables.submissions.iter_mut().find(|s| {
            s.group_id == new_submission.group_id && s.assignment_id == new_submission.assignment_id
        }) {
            existing.user_id = new_submission.user_id;
            existing.status = new_submission.status;
            existing.content = new_submission.content;
            existing.submitted_at = new_submission.submitted_at;
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        let submission = Submission {
            id: Uuid::new_v4(),
            group_id: new_submission.group_id,
            assignment_id: new_submission.assignment_id,
            user_id: new_submission.user_id,
            status: new_submission.status,
            content: new_submission.content,
            grade: None,
            submitted_at: new_submission.submitted_at,
            updated_at: now,
        };
        tables.submissions.push(submission.clone());
        Ok(submission)
    }
}

#[async_trait]
impl SettingsLookup for MemoryStore {
    async fn assignment_settings(
        &self,
        assignment_id: Uuid,
    ) -> Result<AssignmentSettings, StoreError> {
        let tables = self.read().await?;
        Ok(tables
            .settings
            .get(&assignment_id)
            .copied()
            .unwrap_or_default())
    }
}
