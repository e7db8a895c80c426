pub mod attachments;
pub mod cases;
pub mod configurations;
pub mod fields;
pub mod milestones;
pub mod projects;
pub mod runs;
pub mod shared_steps;
pub mod suites;
pub mod users;
