use crate::model::OrgFilters;
use crate::store::{EntityStore, StoreError};
use std::collections::HashSet;
use tracing::debug;
use uuid::Uuid;

/// Outcome of applying the organization filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommunityRestriction {
    /// No filter was given.
    Unrestricted,
    Allowed(HashSet<Uuid>),
    /// A school or community filter matched nothing; the listing is empty.
    NoMatch,
}

impl CommunityRestriction {
    pub fn permits(&self, community_id: Option<Uuid>) -> bool {
        match self {
            CommunityRestriction::Unrestricted => true,
            CommunityRestriction::Allowed(allowed) => {
                community_id.is_some_and(|id| allowed.contains(&id))
            }
            CommunityRestriction::NoMatch => false,
        }
    }

    pub fn allowed(&self) -> Option<&HashSet<Uuid>> {
        match self {
            CommunityRestriction::Allowed(allowed) => Some(allowed),
            _ => None,
        }
    }
}

pub struct OrganizationFilter<'a> {
    store: &'a dyn EntityStore,
}

impl<'a> OrganizationFilter<'a> {
    pub fn new(store: &'a dyn EntityStore) -> Self {
        OrganizationFilter { store }
    }

    /// Narrows `candidates` (every community when `None`) to those matching all given filters.
    ///
    /// A generation-only filter that matches nothing still yields `Allowed` with an empty set
    /// rather than `NoMatch`.
    pub async fn resolve(
        &self,
        candidates: Option<&[Uuid]>,
        filters: &OrgFilters,
    ) -> Result<CommunityRestriction, StoreError> {
        if filters.is_empty() {
            return Ok(CommunityRestriction::Unrestricted);
        }

        let mut matched = self.store.find_communities(filters).await?;
        if let Some(candidates) = candidates {
            matched.retain(|id| candidates.contains(id));
        }
        debug!("Organization filters {:?} matched {} communities", filters, matched.len());

        if matched.is_empty() && filters.names_school_or_community() {
            return Ok(CommunityRestriction::NoMatch);
        }
        Ok(CommunityRestriction::Allowed(matched.into_iter().collect()))
    }
}
