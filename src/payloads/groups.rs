use serde::{Deserialize, Serialize};
use uuid::Uuid;

// `assignment_id` accepts a block id or the `{lesson_id}_block_{index}` form.

#[derive(Serialize, Deserialize, Debug)]
pub struct GetOrCreateGroupPayload {
    pub assignment_id: String,
    pub user_id: Uuid,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct AddMembersPayload {
    pub group_id: Uuid,
    pub assignment_id: String,
    pub user_ids: Vec<Uuid>,
    pub actor_id: Uuid,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct RemoveMemberPayload {
    pub group_id: Uuid,
    pub user_id: Uuid,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct GroupMembersParams {
    pub group_id: Uuid,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SubmitWorkPayload {
    pub assignment_id: String,
    pub group_id: Uuid,
    pub user_id: Uuid,
    pub content: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct EligibleClassmatesParams {
    pub assignment_id: String,
    pub user_id: Uuid,
    pub group_id: Option<Uuid>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct CreateConsultantGroupPayload {
    pub actor_id: Uuid,
    pub assignment_id: String,
    pub community_id: Uuid,
    pub name: Option<String>,
    #[serde(default)]
    pub member_ids: Vec<Uuid>,
}
