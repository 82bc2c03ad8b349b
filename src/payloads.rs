pub mod admin;
pub mod groups;
pub mod learner;
