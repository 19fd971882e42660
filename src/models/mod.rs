pub mod auth;
pub mod category;
pub mod course;
pub mod group;

pub use auth::{AuthUser, Session};
pub use category::{Category, CategoryWithGroups, NewCategoryRequest};
pub use course::{Course, Enrollment, NewCourseRequest, ACTIVE_STATUS};
pub use group::{ChangeGroupRequest, Group, GroupChange, JoinGroupRequest, Membership};
