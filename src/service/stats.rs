use super::dedup_preserving_order;
use super::org_filter::CommunityRestriction;
use crate::model::{Community, Submission, SubmissionStats};
use crate::store::{EntityStore, StoreError};
use std::collections::HashSet;
use uuid::Uuid;

/// `round(submitted / students * 100)`, or 0 for an assignment without students.
pub fn submission_rate(submitted_count: usize, students_count: usize) -> u32 {
    if students_count == 0 {
        return 0;
    }
    (submitted_count as f64 / students_count as f64 * 100.0).round() as u32
}

pub fn compute_submission_stats(submissions: &[Submission]) -> SubmissionStats {
    let groups: HashSet<Uuid> = submissions.iter().map(|s| s.group_id).collect();
    let students: HashSet<Uuid> = submissions.iter().map(|s| s.user_id).collect();
    let submitted_count = submissions
        .iter()
        .filter(|s| s.status().is_handed_in())
        .count();

    SubmissionStats {
        groups_count: groups.len(),
        students_count: students.len(),
        submitted_count,
        submission_rate: submission_rate(submitted_count, students.len()),
    }
}

pub struct SubmissionStatsAggregator<'a> {
    store: &'a dyn EntityStore,
}

impl<'a> SubmissionStatsAggregator<'a> {
    pub fn new(store: &'a dyn EntityStore) -> Self {
        SubmissionStatsAggregator { store }
    }

    pub async fn stats_for(&self, assignment_id: Uuid) -> Result<SubmissionStats, StoreError> {
        let submissions = self.store.submissions_for_assignment(assignment_id).await?;
        Ok(compute_submission_stats(&submissions))
    }

    /// Community an assignment is shown under.
    ///
    /// Communities of the assignment's groups win. Without groups, the communities named by the
    /// roles of everyone enrolled in or teaching the course are used. Either way a community in
    /// the active filter result is preferred over the first one found.
    pub async fn display_community(
        &self,
        assignment_id: Uuid,
        course_id: Uuid,
        restriction: &CommunityRestriction,
    ) -> Result<Option<Community>, StoreError> {
        let groups = self.store.groups_for_assignment(assignment_id).await?;
        let candidates = if groups.is_empty() {
            self.course_role_communities(course_id).await?
        } else {
            dedup_preserving_order(groups.iter().map(|g| g.community_id))
        };

        let Some(community_id) = pick_community(&candidates, restriction) else {
            return Ok(None);
        };
        let communities = self.store.communities_by_ids(&[community_id]).await?;
        Ok(communities.into_iter().next())
    }

    async fn course_role_communities(&self, course_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        let members = dedup_preserving_order(self.store.course_member_ids(course_id).await?);
        if members.is_empty() {
            return Ok(Vec::new());
        }
        let roles = self.store.active_roles_for_users(&members).await?;
        Ok(dedup_preserving_order(
            roles.iter().filter_map(|r| r.community_id),
        ))
    }
}

fn pick_community(candidates: &[Uuid], restriction: &CommunityRestriction) -> Option<Uuid> {
    restriction
        .allowed()
        .and_then(|allowed| candidates.iter().find(|id| allowed.contains(id)))
        .or_else(|| candidates.first())
        .copied()
}
