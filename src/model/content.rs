use crate::schema::{blocks, courses, lessons};
use chrono::{DateTime, Utc};
use diesel::{Queryable, Selectable};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Block type names that mark a lesson block as a group assignment. The underscore form is
/// still present in older lesson content.
pub const GROUP_ASSIGNMENT_BLOCK_TYPES: [&str; 2] = ["group-assignment", "group_assignment"];

pub const UNTITLED_ASSIGNMENT: &str = "Untitled group assignment";

#[derive(Queryable, Selectable, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[diesel(table_name = courses)]
pub struct Course {
    pub id: Uuid,
    pub title: String,
    pub community_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Queryable, Selectable, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[diesel(table_name = lessons)]
pub struct Lesson {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

/// A lesson joined with the title of its course.
#[derive(Queryable, Debug, Clone, PartialEq)]
pub struct LessonRecord {
    pub id: Uuid,
    pub course_id: Uuid,
    pub course_title: String,
    pub title: String,
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

impl LessonRecord {
    pub fn new(lesson: &Lesson, course_title: &str) -> Self {
        LessonRecord {
            id: lesson.id,
            course_id: lesson.course_id,
            course_title: course_title.to_string(),
            title: lesson.title.clone(),
            position: lesson.position,
            created_at: lesson.created_at,
        }
    }
}

#[derive(Queryable, Selectable, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[diesel(table_name = blocks)]
pub struct Block {
    pub id: Uuid,
    pub lesson_id: Uuid,
    pub position: i32,
    pub block_type: String,
    pub payload: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
}

impl Block {
    pub fn is_group_assignment(&self) -> bool {
        GROUP_ASSIGNMENT_BLOCK_TYPES.contains(&self.block_type.as_str())
    }

    pub fn content(&self) -> AssignmentContent {
        AssignmentContent::from_payload(self.payload.as_ref())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Resource {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// The authored part of a group assignment, read leniently from the block payload.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AssignmentContent {
    pub title: String,
    pub description: String,
    pub instructions: String,
    pub resources: Vec<Resource>,
    pub created_at: Option<DateTime<Utc>>,
}

impl AssignmentContent {
    pub fn from_payload(payload: Option<&JsonValue>) -> Self {
        let object = payload.and_then(JsonValue::as_object);
        let text = |key: &str| {
            object
                .and_then(|o| o.get(key))
                .and_then(JsonValue::as_str)
                .map(str::to_string)
        };

        let title = text("title")
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| UNTITLED_ASSIGNMENT.to_string());
        let resources = object
            .and_then(|o| o.get("resources"))
            .and_then(|r| serde_json::from_value::<Vec<Resource>>(r.clone()).ok())
            .unwrap_or_default();
        let created_at = text("created_at").and_then(|raw| raw.parse::<DateTime<Utc>>().ok());

        AssignmentContent {
            title,
            description: text("description").unwrap_or_default(),
            instructions: text("instructions").unwrap_or_default(),
            resources,
            created_at,
        }
    }
}

/// How a caller names an assignment: the block id itself, or the older
/// `{lesson_id}_block_{index}` form addressing a block by its position in a lesson.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentRef {
    Block(Uuid),
    Legacy { lesson_id: Uuid, index: i32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidAssignmentRef(pub String);

impl fmt::Display for InvalidAssignmentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' is not a valid assignment id", self.0)
    }
}

impl std::error::Error for InvalidAssignmentRef {}

impl FromStr for AssignmentRef {
    type Err = InvalidAssignmentRef;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if let Ok(id) = Uuid::parse_str(raw) {
            return Ok(AssignmentRef::Block(id));
        }

        let invalid = || InvalidAssignmentRef(raw.to_string());
        let (lesson, index) = raw.split_once("_block_").ok_or_else(invalid)?;
        let lesson_id = Uuid::parse_str(lesson).map_err(|_| invalid())?;
        let index = index.parse::<i32>().map_err(|_| invalid())?;
        if index < 0 {
            return Err(invalid());
        }
        Ok(AssignmentRef::Legacy { lesson_id, index })
    }
}

impl fmt::Display for AssignmentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssignmentRef::Block(id) => write!(f, "{}", id),
            AssignmentRef::Legacy { lesson_id, index } => write!(f, "{}_block_{}", lesson_id, index),
        }
    }
}
