use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::AppError;
use crate::models::Session;

/// Device-local storage for the signed-in session.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load_session(&self) -> Result<Option<Session>, AppError>;
    async fn save_session(&self, session: &Session) -> Result<(), AppError>;
    async fn clear_session(&self) -> Result<(), AppError>;

    async fn health(&self) -> Result<(), AppError> {
        Ok(())
    }
}

#[derive(Default)]
pub struct MemorySessionStore {
    session: Mutex<Option<Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: Session) -> Self {
        Self {
            session: Mutex::new(Some(session)),
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load_session(&self) -> Result<Option<Session>, AppError> {
        Ok(self.slot().clone())
    }

    async fn save_session(&self, session: &Session) -> Result<(), AppError> {
        *self.slot() = Some(session.clone());
        Ok(())
    }

    async fn clear_session(&self) -> Result<(), AppError> {
        *self.slot() = None;
        Ok(())
    }
}
