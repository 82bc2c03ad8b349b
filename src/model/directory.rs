use crate::schema::{communities, consultant_assignments, user_roles, users};
use chrono::{DateTime, Utc};
use diesel::{Queryable, Selectable};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role kinds ordered by privilege, lowest first.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Learner,
    Teacher,
    Consultant,
    Admin,
}

impl Role {
    /// Unknown role names fall back to the default learner role.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "admin" => Role::Admin,
            "consultant" => Role::Consultant,
            "teacher" => Role::Teacher,
            _ => Role::Learner,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Learner => "learner",
            Role::Teacher => "teacher",
            Role::Consultant => "consultant",
            Role::Admin => "admin",
        }
    }

    /// Admins and consultants may see the assignment overview and manage any group.
    pub fn is_privileged(&self) -> bool {
        matches!(self, Role::Admin | Role::Consultant)
    }
}

#[derive(Queryable, Selectable, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub avatar_url: Option<String>,
    // profile community, used when no role grant names one
    pub community_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn full_name(&self) -> String {
        let name = format!("{} {}", self.first_name, self.last_name);
        let name = name.trim();
        if name.is_empty() {
            "Unknown user".to_string()
        } else {
            name.to_string()
        }
    }
}

#[derive(Queryable, Selectable, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[diesel(table_name = user_roles)]
pub struct RoleGrant {
    pub id: Uuid,
    pub user_id: Uuid,
    pub role_type: String,
    pub school_id: Option<Uuid>,
    pub generation_id: Option<Uuid>,
    pub community_id: Option<Uuid>,
    pub is_active: bool,
}

impl RoleGrant {
    pub fn role(&self) -> Role {
        Role::parse(&self.role_type)
    }
}

#[derive(Queryable, Selectable, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[diesel(table_name = communities)]
pub struct Community {
    pub id: Uuid,
    pub name: String,
    pub school_id: Option<Uuid>,
    pub generation_id: Option<Uuid>,
}

/// Links a consultant to the students they serve. Every target is optional; a single row may
/// name a student directly and/or a whole community, school or generation.
#[derive(Queryable, Selectable, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[diesel(table_name = consultant_assignments)]
pub struct ConsultantAssignment {
    pub id: Uuid,
    pub consultant_id: Uuid,
    pub student_id: Option<Uuid>,
    pub community_id: Option<Uuid>,
    pub school_id: Option<Uuid>,
    pub generation_id: Option<Uuid>,
    pub is_active: bool,
}

impl ConsultantAssignment {
    /// Organizational units whose members this assignment covers.
    pub fn scopes(&self) -> Vec<OrgScope> {
        let mut scopes = Vec::new();
        if let Some(id) = self.community_id {
            scopes.push(OrgScope::Community(id));
        }
        if let Some(id) = self.school_id {
            scopes.push(OrgScope::School(id));
        }
        if let Some(id) = self.generation_id {
            scopes.push(OrgScope::Generation(id));
        }
        scopes
    }
}

/// One level of the School → Generation → Community hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrgScope {
    School(Uuid),
    Generation(Uuid),
    Community(Uuid),
}

/// Optional organization filters of the assignment overview. Fields are independent.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct OrgFilters {
    pub school_id: Option<Uuid>,
    pub community_id: Option<Uuid>,
    pub generation_id: Option<Uuid>,
}

impl OrgFilters {
    pub fn is_empty(&self) -> bool {
        self.school_id.is_none() && self.community_id.is_none() && self.generation_id.is_none()
    }

    pub fn names_school_or_community(&self) -> bool {
        self.school_id.is_some() || self.community_id.is_some()
    }

    pub fn matches(&self, community: &Community) -> bool {
        self.community_id.is_none_or(|id| community.id == id)
            && self.school_id.is_none_or(|id| community.school_id == Some(id))
            && self
                .generation_id
                .is_none_or(|id| community.generation_id == Some(id))
    }
}

/// Public view of a user, as shown in member and classmate lists.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserSummary {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub email: String,
    pub avatar_url: Option<String>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        UserSummary {
            id: user.id,
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            full_name: user.full_name(),
            email: user.email.clone(),
            avatar_url: user.avatar_url.clone(),
        }
    }
}
