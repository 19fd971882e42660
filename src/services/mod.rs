pub mod auth_service;
pub mod course_service;
pub mod group_service;
pub mod journal;

pub use auth_service::AuthService;
pub use course_service::CourseService;
pub use group_service::GroupService;
pub use journal::{Journal, UnwindReport, WriteOp};
