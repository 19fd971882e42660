use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Status value the remote store uses for live enrollments and memberships.
pub const ACTIVE_STATUS: &str = "ACT";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: String,
    pub title: String,
    pub description: String,
    pub teacher_id: String,
    pub max_students: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCourseRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub max_students: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    pub student_id: String,
    pub course_id: String,
    pub status: String,
    pub join_date: Option<NaiveDate>,
}

impl Enrollment {
    pub fn active(student_id: &str, course_id: &str, join_date: NaiveDate) -> Self {
        Self {
            student_id: student_id.to_string(),
            course_id: course_id.to_string(),
            status: ACTIVE_STATUS.to_string(),
            join_date: Some(join_date),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ACTIVE_STATUS
    }
}
