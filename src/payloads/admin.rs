use crate::model::OrgFilters;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct ListAssignmentsParams {
    pub user_id: Uuid,
    pub school_id: Option<Uuid>,
    pub community_id: Option<Uuid>,
    pub generation_id: Option<Uuid>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl ListAssignmentsParams {
    pub fn filters(&self) -> OrgFilters {
        OrgFilters {
            school_id: self.school_id,
            community_id: self.community_id,
            generation_id: self.generation_id,
        }
    }
}
