use crate::schema::{group_assignment_groups, group_assignment_members, group_assignment_submissions};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::{Insertable, Queryable, Selectable};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MEMBER_ROLE: &str = "member";

#[derive(Queryable, Selectable, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[diesel(table_name = group_assignment_groups)]
pub struct Group {
    pub id: Uuid,
    pub assignment_id: Uuid,
    pub community_id: Uuid,
    pub name: String,
    pub max_members: i32,
    pub is_consultant_managed: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = group_assignment_groups)]
pub struct NewGroup {
    pub assignment_id: Uuid,
    pub community_id: Uuid,
    pub name: String,
    pub max_members: i32,
    pub is_consultant_managed: bool,
    // id, created_at have DB defaults
}

#[derive(Queryable, Selectable, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[diesel(table_name = group_assignment_members)]
pub struct Membership {
    pub id: Uuid,
    pub group_id: Uuid,
    pub assignment_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub joined_at: DateTime<Utc>,
}

#[derive(Insertable, Debug, Clone, PartialEq)]
#[diesel(table_name = group_assignment_members)]
pub struct NewMembership {
    pub group_id: Uuid,
    pub assignment_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    // joined_at has DB default
}

impl NewMembership {
    pub fn member(group_id: Uuid, assignment_id: Uuid, user_id: Uuid) -> Self {
        NewMembership {
            group_id,
            assignment_id,
            user_id,
            role: MEMBER_ROLE.to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    #[default]
    Pending,
    Submitted,
    Graded,
}

impl SubmissionStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "submitted" => SubmissionStatus::Submitted,
            "graded" => SubmissionStatus::Graded,
            _ => SubmissionStatus::Pending,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Submitted => "submitted",
            SubmissionStatus::Graded => "graded",
        }
    }

    pub fn is_handed_in(&self) -> bool {
        matches!(self, SubmissionStatus::Submitted | SubmissionStatus::Graded)
    }
}

#[derive(Queryable, Selectable, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[diesel(table_name = group_assignment_submissions)]
pub struct Submission {
    pub id: Uuid,
    pub group_id: Uuid,
    pub assignment_id: Uuid,
    pub user_id: Uuid,
    pub status: String,
    pub content: Option<String>,
    pub grade: Option<BigDecimal>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Submission {
    pub fn status(&self) -> SubmissionStatus {
        SubmissionStatus::parse(&self.status)
    }
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = group_assignment_submissions)]
pub struct NewSubmission {
    pub group_id: Uuid,
    pub assignment_id: Uuid,
    pub user_id: Uuid,
    pub status: String,
    pub content: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
}

/// Per-assignment settings; an assignment without a settings row is self-service.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct AssignmentSettings {
    pub consultant_managed: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GroupMember {
    pub user_id: Uuid,
    pub full_name: String,
    pub email: String,
    pub avatar_url: Option<String>,
    pub role: String,
    pub joined_at: DateTime<Utc>,
}

/// A consultant-created group together with the memberships created alongside it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ManagedGroup {
    pub group: Group,
    pub members: Vec<Membership>,
}
