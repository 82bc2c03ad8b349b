use super::ServiceConfig;
use super::org_filter::{CommunityRestriction, OrganizationFilter};
use super::scope::RoleScopeResolver;
use super::stats::SubmissionStatsAggregator;
use crate::model::{
    AdminAssignment, AssignmentListing, AssignmentSummary, Block, LearnerAssignment,
    LearnerListing, LessonRecord, OrgFilters, Submission,
};
use crate::store::{EntityStore, StoreError};
use tracing::{debug, error, info};
use uuid::Uuid;

const LIST_FAILED: &str = "Failed to load assignments";
const LEARNER_LIST_FAILED: &str = "Failed to load your assignments";

/// Builds the assignment overview and the learner's own assignment list.
///
/// Both listings never fail: store errors are logged and reported in the listing's `error`.
pub struct AssignmentCatalog<'a> {
    store: &'a dyn EntityStore,
    default_page_size: usize,
    fallback_course_limit: i64,
}

impl<'a> AssignmentCatalog<'a> {
    pub fn new(store: &'a dyn EntityStore, config: &ServiceConfig) -> Self {
        AssignmentCatalog {
            store,
            default_page_size: config.default_page_size,
            fallback_course_limit: config.fallback_course_limit,
        }
    }

    pub async fn list(
        &self,
        user_id: Uuid,
        filters: &OrgFilters,
        limit: Option<usize>,
        offset: usize,
    ) -> AssignmentListing {
        match self.try_list(user_id, filters, limit, offset).await {
            Ok(listing) => listing,
            Err(e) => {
                error!("Failed to list assignments for user {}: {:?}", user_id, e);
                AssignmentListing::failed(LIST_FAILED)
            }
        }
    }

    async fn try_list(
        &self,
        user_id: Uuid,
        filters: &OrgFilters,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<AssignmentListing, StoreError> {
        let resolver = RoleScopeResolver::new(self.store);
        let role = resolver.highest_role(user_id).await?;
        if !role.is_privileged() {
            debug!(
                "User {} with role {} cannot see the assignment overview",
                user_id,
                role.as_str()
            );
            return Ok(AssignmentListing::empty());
        }

        let course_ids = resolver.visible_courses(user_id, role).await?;
        if course_ids.is_empty() {
            debug!("No visible courses for user {}", user_id);
            return Ok(AssignmentListing::empty());
        }

        let restriction = OrganizationFilter::new(self.store)
            .resolve(None, filters)
            .await?;
        if restriction == CommunityRestriction::NoMatch {
            info!("Organization filters {:?} matched no community", filters);
            return Ok(AssignmentListing::empty());
        }

        let (lessons, blocks) = self.assignment_blocks(&course_ids).await?;
        let aggregator = SubmissionStatsAggregator::new(self.store);

        let mut assignments = Vec::new();
        for (lesson, block) in pair_with_lessons(&lessons, &blocks) {
            let community = aggregator
                .display_community(block.id, lesson.course_id, &restriction)
                .await?;
            if !restriction.permits(community.as_ref().map(|c| c.id)) {
                continue;
            }
            let stats = aggregator.stats_for(block.id).await?;
            assignments.push(AdminAssignment {
                summary: AssignmentSummary::new(lesson, block),
                stats,
                community,
            });
        }

        let total = assignments.len();
        let limit = limit.unwrap_or(self.default_page_size);
        info!(
            "Listing {} assignment(s) for user {} (offset {}, limit {})",
            total, user_id, offset, limit
        );
        Ok(AssignmentListing {
            assignments: paginate(assignments, limit, offset),
            total,
            error: None,
        })
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> LearnerListing {
        match self.try_list_for_user(user_id).await {
            Ok(listing) => listing,
            Err(e) => {
                error!("Failed to list assignments of learner {}: {:?}", user_id, e);
                LearnerListing::failed(LEARNER_LIST_FAILED)
            }
        }
    }

    async fn try_list_for_user(&self, user_id: Uuid) -> Result<LearnerListing, StoreError> {
        let resolver = RoleScopeResolver::new(self.store);
        let community_id = resolver.resolve_user_community(user_id).await?;
        let courses = resolver
            .learner_courses(user_id, community_id, self.fallback_course_limit)
            .await?;
        if courses.course_ids.is_empty() {
            return Ok(LearnerListing::default());
        }

        let (lessons, blocks) = self.assignment_blocks(&courses.course_ids).await?;
        let assignment_ids: Vec<Uuid> = blocks.iter().map(|b| b.id).collect();
        let memberships = if assignment_ids.is_empty() {
            Vec::new()
        } else {
            self.store
                .memberships_for_user(user_id, &assignment_ids)
                .await?
        };
        let group_ids: Vec<Uuid> = memberships.iter().map(|m| m.group_id).collect();
        let submissions = if group_ids.is_empty() {
            Vec::new()
        } else {
            self.store.submissions_for_groups(&group_ids).await?
        };

        let assignments = pair_with_lessons(&lessons, &blocks)
            .map(|(lesson, block)| {
                let membership = memberships.iter().find(|m| m.assignment_id == block.id);
                let submission = membership.and_then(|m| {
                    submissions
                        .iter()
                        .find(|s| s.group_id == m.group_id && s.assignment_id == block.id)
                });
                LearnerAssignment {
                    summary: AssignmentSummary::new(lesson, block),
                    community_id,
                    group_id: membership.map(|m| m.group_id),
                    status: submission.map(Submission::status).unwrap_or_default(),
                    grade: submission.and_then(|s| s.grade.clone()),
                    submitted_at: submission.and_then(|s| s.submitted_at),
                }
            })
            .collect::<Vec<_>>();

        info!(
            "Listing {} assignment(s) for learner {} across {} course(s){}",
            assignments.len(),
            user_id,
            courses.course_ids.len(),
            if courses.heuristic { " (sampled)" } else { "" }
        );
        Ok(LearnerListing {
            assignments,
            error: None,
        })
    }

    async fn assignment_blocks(
        &self,
        course_ids: &[Uuid],
    ) -> Result<(Vec<LessonRecord>, Vec<Block>), StoreError> {
        let lessons = self.store.lessons_for_courses(course_ids).await?;
        if lessons.is_empty() {
            return Ok((lessons, Vec::new()));
        }
        let lesson_ids: Vec<Uuid> = lessons.iter().map(|l| l.id).collect();
        let blocks = self.store.assignment_blocks(&lesson_ids).await?;
        Ok((lessons, blocks))
    }
}

/// Blocks in lesson fetch order, each with its lesson.
fn pair_with_lessons<'l>(
    lessons: &'l [LessonRecord],
    blocks: &'l [Block],
) -> impl Iterator<Item = (&'l LessonRecord, &'l Block)> {
    lessons.iter().flat_map(move |lesson| {
        blocks
            .iter()
            .filter(move |b| b.lesson_id == lesson.id)
            .map(move |b| (lesson, b))
    })
}

/// Offset/limit over an already materialized list.
pub fn paginate<T>(items: Vec<T>, limit: usize, offset: usize) -> Vec<T> {
    items.into_iter().skip(offset).take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paginates_materialized_list() {
        let items: Vec<u32> = (0..5).collect();

        assert_eq!(paginate(items.clone(), 2, 0), vec![0, 1]);
        assert_eq!(paginate(items.clone(), 2, 4), vec![4]);
        assert!(paginate(items.clone(), 2, 100).is_empty());
        assert!(paginate(items, 0, 0).is_empty());
    }
}
