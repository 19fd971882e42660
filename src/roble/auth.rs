use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::{AuthUser, Session};

#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> Result<Session, AppError>;
    async fn signup(&self, email: &str, password: &str) -> Result<(), AppError>;
    async fn verify_email(&self, email: &str, code: &str) -> Result<bool, AppError>;
    /// Returns a fresh access token.
    async fn refresh_token(&self, session: &Session) -> Result<String, AppError>;
    async fn verify_token(&self, session: &Session) -> bool;
    async fn logout(&self, session: &Session) -> Result<(), AppError>;
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct SignupRequest<'a> {
    email: &'a str,
    name: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct VerifyEmailRequest<'a> {
    email: &'a str,
    code: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    access_token: String,
    refresh_token: String,
    user: AuthUser,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorMessage {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<ErrorMessage>,
}

pub struct RobleAuthClient {
    client: Client,
    auth_url: String,
}

impl RobleAuthClient {
    pub fn new(base_url: &str, project_id: &str) -> Result<Self, AppError> {
        let client = Client::builder()
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build http client: {}", e)))?;
        let auth_url = format!("{}/auth/{}", base_url.trim_end_matches('/'), project_id);
        Ok(Self { client, auth_url })
    }

    /// Builds the error for a rejected auth call from the server's `message`.
    async fn rejection(operation: &str, response: Response) -> AppError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.message)
            .map(|m| match m {
                ErrorMessage::One(text) => text,
                ErrorMessage::Many(parts) => parts.join(" "),
            })
            .unwrap_or(body);
        tracing::error!("{} failed with {}: {}", operation, status, message);

        let text = format!("{} error: {}", operation, message);
        if status == StatusCode::UNAUTHORIZED {
            AppError::Unauthorized(text)
        } else {
            AppError::Remote(text)
        }
    }
}

/// The part of an email address before `@`; used as the display name on signup.
pub fn display_name(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

#[async_trait]
impl AuthApi for RobleAuthClient {
    async fn login(&self, email: &str, password: &str) -> Result<Session, AppError> {
        let response = self.client
            .post(format!("{}/login", self.auth_url))
            .json(&LoginRequest { email, password })
            .send()
            .await
            .map_err(|e| AppError::remote("Login request failed", e))?;

        if !response.status().is_success() {
            return Err(Self::rejection("Login", response).await);
        }

        let body: LoginResponse = response
            .json()
            .await
            .map_err(|e| AppError::remote("Failed to parse login response", e))?;
        tracing::info!("Logged in as {}", body.user.email);

        Ok(Session {
            access_token: body.access_token,
            refresh_token: body.refresh_token,
            user: body.user,
        })
    }

    async fn signup(&self, email: &str, password: &str) -> Result<(), AppError> {
        let response = self.client
            .post(format!("{}/signup", self.auth_url))
            .json(&SignupRequest { email, name: display_name(email), password })
            .send()
            .await
            .map_err(|e| AppError::remote("Signup request failed", e))?;

        if !response.status().is_success() {
            return Err(Self::rejection("Signup", response).await);
        }
        Ok(())
    }

    async fn verify_email(&self, email: &str, code: &str) -> Result<bool, AppError> {
        let response = self.client
            .post(format!("{}/verify-email", self.auth_url))
            .json(&VerifyEmailRequest { email, code })
            .send()
            .await
            .map_err(|e| AppError::remote("Email verification request failed", e))?;

        if !response.status().is_success() {
            return Err(Self::rejection("Validation", response).await);
        }
        Ok(true)
    }

    async fn refresh_token(&self, session: &Session) -> Result<String, AppError> {
        let response = self.client
            .post(format!("{}/refresh-token", self.auth_url))
            .json(&RefreshRequest { refresh_token: &session.refresh_token })
            .send()
            .await
            .map_err(|e| AppError::remote("Refresh request failed", e))?;

        if !response.status().is_success() {
            return Err(Self::rejection("Refresh token", response).await);
        }

        let body: RefreshResponse = response
            .json()
            .await
            .map_err(|e| AppError::remote("Failed to parse refresh response", e))?;
        tracing::info!("Token refreshed successfully");
        Ok(body.access_token)
    }

    async fn verify_token(&self, session: &Session) -> bool {
        let result = self.client
            .get(format!("{}/verify-token", self.auth_url))
            .header("Authorization", session.bearer())
            .send()
            .await;

        match result {
            Ok(response) if response.status() == StatusCode::OK => true,
            Ok(response) => {
                tracing::warn!("Token verification rejected with {}", response.status());
                false
            }
            Err(e) => {
                tracing::warn!("Verify token failed: {}", e);
                false
            }
        }
    }

    async fn logout(&self, session: &Session) -> Result<(), AppError> {
        let response = self.client
            .post(format!("{}/logout", self.auth_url))
            .header("Authorization", session.bearer())
            .send()
            .await
            .map_err(|e| AppError::remote("Logout request failed", e))?;

        if !response.status().is_success() {
            return Err(Self::rejection("Logout", response).await);
        }
        tracing::info!("Logged out successfully");
        Ok(())
    }
}
