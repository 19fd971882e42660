use async_trait::async_trait;
use chrono::Utc;
use sqlx::{FromRow, SqlitePool};

use crate::error::AppError;
use crate::models::{AuthUser, Session};
use crate::session::SessionStore;

const TOKEN_KEY: &str = "token";
const REFRESH_TOKEN_KEY: &str = "refreshToken";
const CURRENT_USER_KEY: &str = "currentUser";

#[derive(Debug, FromRow)]
struct Preference {
    key: String,
    value: String,
}

/// Session persisted as key/value rows, the way the mobile client keeps it
/// in its preferences storage.
#[derive(Clone)]
pub struct SqliteSessionStore {
    db: SqlitePool,
}

impl SqliteSessionStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Runs the bundled migrations before handing out the store.
    pub async fn migrated(db: SqlitePool) -> Result<Self, AppError> {
        sqlx::migrate!("./migrations")
            .run(&db)
            .await
            .map_err(|e| AppError::Database(e.into()))?;
        Ok(Self::new(db))
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM preferences WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.db)
            .await?;
        Ok(value)
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn load_session(&self) -> Result<Option<Session>, AppError> {
        let rows = sqlx::query_as::<_, Preference>(
            "SELECT key, value FROM preferences WHERE key IN (?, ?, ?)"
        )
        .bind(TOKEN_KEY)
        .bind(REFRESH_TOKEN_KEY)
        .bind(CURRENT_USER_KEY)
        .fetch_all(&self.db)
        .await?;

        let value_of = |key: &str| rows.iter().find(|p| p.key == key).map(|p| p.value.clone());

        let Some(access_token) = value_of(TOKEN_KEY) else {
            return Ok(None);
        };
        let Some(raw_user) = value_of(CURRENT_USER_KEY) else {
            return Ok(None);
        };
        let user: AuthUser = match serde_json::from_str(&raw_user) {
            Ok(user) => user,
            Err(e) => {
                tracing::warn!("Stored current user is unreadable: {}", e);
                return Ok(None);
            }
        };

        Ok(Some(Session {
            access_token,
            refresh_token: value_of(REFRESH_TOKEN_KEY).unwrap_or_default(),
            user,
        }))
    }

    async fn save_session(&self, session: &Session) -> Result<(), AppError> {
        let user = serde_json::to_string(&session.user)
            .map_err(|_| AppError::InternalServerError)?;
        let now = Utc::now().to_rfc3339();

        let mut tx = self.db.begin().await?;
        for (key, value) in [
            (TOKEN_KEY, session.access_token.as_str()),
            (REFRESH_TOKEN_KEY, session.refresh_token.as_str()),
            (CURRENT_USER_KEY, user.as_str()),
        ] {
            sqlx::query(
                r#"
                INSERT INTO preferences (key, value, updated_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
                "#,
            )
            .bind(key)
            .bind(value)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn clear_session(&self) -> Result<(), AppError> {
        sqlx::query("DELETE FROM preferences WHERE key IN (?, ?, ?)")
            .bind(TOKEN_KEY)
            .bind(REFRESH_TOKEN_KEY)
            .bind(CURRENT_USER_KEY)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn health(&self) -> Result<(), AppError> {
        sqlx::query("select 1").execute(&self.db).await?;
        Ok(())
    }
}
