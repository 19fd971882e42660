use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::error::AppError;
use crate::models::{Category, CategoryWithGroups, Course, Enrollment, NewCategoryRequest, NewCourseRequest, Session};
use crate::repository;
use crate::roble::RecordStore;
use crate::roble::dto::CourseRecord;
use crate::services::group_service::GroupService;

pub struct CourseService {
    store: Arc<dyn RecordStore>,
    groups: GroupService,
}

impl CourseService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        let groups = GroupService::new(store.clone());
        Self { store, groups }
    }

    pub fn with_group_service(store: Arc<dyn RecordStore>, groups: GroupService) -> Self {
        Self { store, groups }
    }

    pub async fn teacher_courses(&self, session: &Session, teacher_id: &str) -> Result<Vec<Course>, AppError> {
        repository::fetch_teacher_courses(self.store.as_ref(), session, teacher_id).await
    }

    /// Courses the student is actively enrolled in. Enrollments pointing at
    /// courses that no longer exist are skipped.
    pub async fn student_courses(&self, session: &Session, student_id: &str) -> Result<Vec<Course>, AppError> {
        let store = self.store.as_ref();
        let enrollments = repository::fetch_active_enrollments_for_student(store, session, student_id).await?;

        let mut courses = Vec::with_capacity(enrollments.len());
        for enrollment in enrollments {
            match repository::find_course_by_id(store, session, &enrollment.course_id).await? {
                Some(course) => courses.push(course),
                None => warn!("Enrollment of {} points at missing course {}", student_id, enrollment.course_id),
            }
        }
        Ok(courses)
    }

    pub async fn course(&self, session: &Session, course_id: &str) -> Result<Course, AppError> {
        repository::find_course_by_id(self.store.as_ref(), session, course_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Course {} not found", course_id)))
    }

    /// Returns the created course when the store echoes it back.
    pub async fn create_course(
        &self,
        session: &Session,
        teacher_id: &str,
        req: &NewCourseRequest,
    ) -> Result<Option<Course>, AppError> {
        if req.title.trim().is_empty() {
            return Err(AppError::Validation("Course title must not be empty".to_string()));
        }
        let record = CourseRecord::new_course(req.title.trim(), &req.description, req.max_students, teacher_id);
        let course = repository::insert_course(self.store.as_ref(), session, &record).await?;
        info!("Course '{}' created by {}", req.title.trim(), teacher_id);
        Ok(course)
    }

    /// Enrolls the student, then tries to seat them in every random category.
    ///
    /// The enrollment stands even if the seating fails.
    pub async fn join_course(
        &self,
        session: &Session,
        student_id: &str,
        course_id: &str,
    ) -> Result<Enrollment, AppError> {
        let today = Utc::now().date_naive();
        let enrollment =
            repository::insert_enrollment(self.store.as_ref(), session, student_id, course_id, today).await?;
        info!("Student {} joined course {}", student_id, course_id);

        match self.groups.assign_student_to_random_groups(session, student_id, course_id).await {
            Ok(joined) => info!("Student {} auto-assigned to {} random groups", student_id, joined.len()),
            Err(e) => warn!("Error assigning student {} to random groups: {}", student_id, e),
        }

        Ok(enrollment)
    }

    pub async fn categories_by_course(&self, session: &Session, course_id: &str) -> Result<Vec<Category>, AppError> {
        repository::fetch_categories(self.store.as_ref(), session, course_id, false).await
    }

    /// Creates the category sized against the course's student limit.
    pub async fn create_category(
        &self,
        session: &Session,
        course_id: &str,
        req: &NewCategoryRequest,
    ) -> Result<CategoryWithGroups, AppError> {
        let course = self.course(session, course_id).await?;
        self.groups
            .create_category_with_groups(session, &course.id, course.max_students, req)
            .await
    }
}
