pub mod auth;
pub mod dto;
pub mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use serde::Serialize;
use serde_json::Value;

use crate::error::AppError;
use crate::models::Session;

pub use auth::{AuthApi, RobleAuthClient};
pub use memory::{InMemoryRecordStore, WriteKind};

/// Equality filter over record fields.
///
/// Sent as query parameters on reads and as the `conditions` object on deletes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Filter(BTreeMap<String, String>);

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &str, value: impl ToString) -> Self {
        self.0.insert(field.to_string(), value.to_string());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Compares the way the remote store does: every value as its text form.
    pub fn matches(&self, record: &Value) -> bool {
        self.0.iter().all(|(field, expected)| {
            match record.get(field) {
                Some(Value::String(s)) => s == expected,
                Some(Value::Number(n)) => &n.to_string() == expected,
                Some(Value::Bool(b)) => &b.to_string() == expected,
                _ => false,
            }
        })
    }
}

/// The four verbs of the hosted record store.
///
/// Records travel as raw JSON; `dto` maps them to domain types.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn read(&self, session: &Session, table: &str, filter: &Filter) -> Result<Vec<Value>, AppError>;
    async fn insert(&self, session: &Session, table: &str, records: Vec<Value>) -> Result<Vec<Value>, AppError>;
    async fn update(&self, session: &Session, table: &str, id: &str, updates: Value) -> Result<(), AppError>;
    async fn delete(&self, session: &Session, table: &str, conditions: &Filter) -> Result<(), AppError>;
}

pub struct RobleHttpClient {
    client: Client,
    database_url: String,
}

impl RobleHttpClient {
    pub fn new(base_url: &str, project_id: &str) -> Result<Self, AppError> {
        let client = Client::builder()
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build http client: {}", e)))?;
        let database_url = format!("{}/database/{}", base_url.trim_end_matches('/'), project_id);
        Ok(Self { client, database_url })
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    async fn send(&self, request: RequestBuilder, context: &str) -> Result<String, AppError> {
        let response = request
            .send()
            .await
            .map_err(|e| AppError::remote(context, e))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(AppError::Remote(format!("Roble API error {} on {}: {}", status, context, body)));
        }
        Ok(body)
    }

    /// Write endpoints may answer with an empty or non-JSON body.
    fn parse_write_body(body: &str, context: &str) -> Option<Value> {
        if body.trim().is_empty() {
            return None;
        }
        match serde_json::from_str(body) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!("Ignoring unparseable {} response: {}", context, e);
                None
            }
        }
    }
}

#[async_trait]
impl RecordStore for RobleHttpClient {
    async fn read(&self, session: &Session, table: &str, filter: &Filter) -> Result<Vec<Value>, AppError> {
        let mut params = vec![("tableName", table)];
        params.extend(filter.iter());
        let url = Url::parse_with_params(&format!("{}/read", self.database_url), params)
            .map_err(|e| AppError::Config(format!("Invalid Roble url: {}", e)))?;

        let context = format!("read {}", table);
        let request = self.client
            .get(url)
            .header("Authorization", session.bearer());
        let body = self.send(request, &context).await?;

        serde_json::from_str::<Vec<Value>>(&body).map_err(|e| {
            tracing::error!("Failed to parse {} response: {}", context, e);
            AppError::remote(&format!("Failed to parse {} response", context), e)
        })
    }

    async fn insert(&self, session: &Session, table: &str, records: Vec<Value>) -> Result<Vec<Value>, AppError> {
        let context = format!("insert {}", table);
        let request_body = dto::InsertRequest { table_name: table, records };
        let request = self.client
            .post(format!("{}/insert", self.database_url))
            .header("Authorization", session.bearer())
            .json(&request_body);
        let body = self.send(request, &context).await?;

        let inserted = Self::parse_write_body(&body, &context)
            .and_then(|value| serde_json::from_value::<dto::InsertResponse>(value).ok())
            .map(dto::InsertResponse::into_inserted)
            .unwrap_or_default();
        Ok(inserted)
    }

    async fn update(&self, session: &Session, table: &str, id: &str, updates: Value) -> Result<(), AppError> {
        let context = format!("update {} {}", table, id);
        let request_body = dto::UpdateRequest {
            table_name: table,
            id_column: dto::fields::ID,
            id_value: id,
            updates,
        };
        let request = self.client
            .put(format!("{}/update", self.database_url))
            .header("Authorization", session.bearer())
            .json(&request_body);
        let body = self.send(request, &context).await?;
        Self::parse_write_body(&body, &context);
        Ok(())
    }

    async fn delete(&self, session: &Session, table: &str, conditions: &Filter) -> Result<(), AppError> {
        if conditions.is_empty() {
            return Err(AppError::Validation(format!("Refusing unconditional delete on {}", table)));
        }
        let context = format!("delete {}", table);
        let request_body = dto::DeleteRequest { table_name: table, conditions };
        let request = self.client
            .delete(format!("{}/delete", self.database_url))
            .header("Authorization", session.bearer())
            .json(&request_body);
        let body = self.send(request, &context).await?;
        Self::parse_write_body(&body, &context);
        Ok(())
    }
}
