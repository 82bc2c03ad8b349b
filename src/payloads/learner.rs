use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Serialize, Deserialize, Debug)]
pub struct ListLearnerAssignmentsParams {
    pub user_id: Uuid,
}
