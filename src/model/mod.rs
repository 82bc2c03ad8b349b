pub mod content;
pub mod directory;
pub mod groups;
pub mod listing;

pub use content::{AssignmentContent, AssignmentRef, Block, Course, Lesson, LessonRecord, Resource};
pub use directory::{
    Community, ConsultantAssignment, OrgFilters, OrgScope, Role, RoleGrant, User, UserSummary,
};
pub use groups::{
    AssignmentSettings, Group, GroupMember, ManagedGroup, Membership, NewGroup, NewMembership,
    NewSubmission, Submission, SubmissionStatus,
};
pub use listing::{
    AdminAssignment, AssignmentListing, AssignmentSummary, LearnerAssignment, LearnerListing,
    SubmissionStats,
};
