use super::content::{AssignmentContent, Block, LessonRecord, Resource};
use super::directory::Community;
use super::groups::SubmissionStatus;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fields shared by both assignment listings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AssignmentSummary {
    pub id: Uuid,
    pub lesson_id: Uuid,
    pub lesson_title: String,
    pub course_id: Uuid,
    pub course_title: String,
    pub block_index: i32,
    pub title: String,
    pub description: String,
    pub instructions: String,
    pub resources: Vec<Resource>,
    pub created_at: DateTime<Utc>,
}

impl AssignmentSummary {
    pub fn new(lesson: &LessonRecord, block: &Block) -> Self {
        let AssignmentContent {
            title,
            description,
            instructions,
            resources,
            created_at,
        } = block.content();

        AssignmentSummary {
            id: block.id,
            lesson_id: lesson.id,
            lesson_title: lesson.title.clone(),
            course_id: lesson.course_id,
            course_title: lesson.course_title.clone(),
            block_index: block.position,
            title,
            description,
            instructions,
            resources,
            created_at: created_at.unwrap_or(lesson.created_at),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubmissionStats {
    pub groups_count: usize,
    pub students_count: usize,
    pub submitted_count: usize,
    pub submission_rate: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AdminAssignment {
    #[serde(flatten)]
    pub summary: AssignmentSummary,
    #[serde(flatten)]
    pub stats: SubmissionStats,
    pub community: Option<Community>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct AssignmentListing {
    pub assignments: Vec<AdminAssignment>,
    pub total: usize,
    pub error: Option<String>,
}

impl AssignmentListing {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn failed(message: &str) -> Self {
        AssignmentListing {
            error: Some(message.to_string()),
            ..Self::default()
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LearnerAssignment {
    #[serde(flatten)]
    pub summary: AssignmentSummary,
    pub community_id: Option<Uuid>,
    pub group_id: Option<Uuid>,
    pub status: SubmissionStatus,
    pub grade: Option<BigDecimal>,
    pub submitted_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct LearnerListing {
    pub assignments: Vec<LearnerAssignment>,
    pub error: Option<String>,
}

impl LearnerListing {
    pub fn failed(message: &str) -> Self {
        LearnerListing {
            assignments: Vec::new(),
            error: Some(message.to_string()),
        }
    }
}
