use std::sync::Arc;

use tracing::info;

use crate::error::AppError;
use crate::models::{AuthUser, Session};
use crate::roble::AuthApi;
use crate::session::SessionStore;

pub struct AuthService {
    auth: Arc<dyn AuthApi>,
    sessions: Arc<dyn SessionStore>,
}

impl AuthService {
    pub fn new(auth: Arc<dyn AuthApi>, sessions: Arc<dyn SessionStore>) -> Self {
        Self { auth, sessions }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthUser, AppError> {
        let session = self.auth.login(email, password).await?;
        self.sessions.save_session(&session).await?;
        Ok(session.user)
    }

    pub async fn signup(&self, email: &str, password: &str) -> Result<(), AppError> {
        if !email.contains('@') {
            return Err(AppError::Validation(format!("'{}' is not an email address", email)));
        }
        if password.is_empty() {
            return Err(AppError::Validation("Password must not be empty".to_string()));
        }
        self.auth.signup(email, password).await
    }

    pub async fn verify_email(&self, email: &str, code: &str) -> Result<bool, AppError> {
        self.auth.verify_email(email, code).await
    }

    pub async fn current_user(&self) -> Result<Option<AuthUser>, AppError> {
        Ok(self.sessions.load_session().await?.map(|s| s.user))
    }

    pub async fn require_session(&self) -> Result<Session, AppError> {
        self.sessions
            .load_session()
            .await?
            .ok_or_else(|| AppError::Unauthorized("Not logged in".to_string()))
    }

    /// Swaps in a fresh access token and stores the updated session.
    pub async fn refresh(&self) -> Result<Session, AppError> {
        let session = self.require_session().await?;
        let access_token = self.auth.refresh_token(&session).await?;
        let refreshed = Session { access_token, ..session };
        self.sessions.save_session(&refreshed).await?;
        Ok(refreshed)
    }

    pub async fn verify(&self) -> Result<bool, AppError> {
        match self.sessions.load_session().await? {
            Some(session) => Ok(self.auth.verify_token(&session).await),
            None => Ok(false),
        }
    }

    /// The local session is only dropped once the server accepted the logout.
    pub async fn logout(&self) -> Result<(), AppError> {
        let session = self.require_session().await?;
        self.auth.logout(&session).await?;
        self.sessions.clear_session().await?;
        info!("Session of {} cleared", session.user.email);
        Ok(())
    }
}
