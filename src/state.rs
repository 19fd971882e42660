use std::sync::Arc;

use crate::roble::{AuthApi, RecordStore};
use crate::services::{AuthService, CourseService, GroupService};
use crate::session::SessionStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub auth: Arc<dyn AuthApi>,
    pub sessions: Arc<dyn SessionStore>,
    pub compensate_on_failure: bool,
}

impl AppState {
    pub fn auth_service(&self) -> AuthService {
        AuthService::new(self.auth.clone(), self.sessions.clone())
    }

    pub fn group_service(&self) -> GroupService {
        GroupService::new(self.store.clone()).compensate_on_failure(self.compensate_on_failure)
    }

    pub fn course_service(&self) -> CourseService {
        CourseService::with_group_service(self.store.clone(), self.group_service())
    }
}
