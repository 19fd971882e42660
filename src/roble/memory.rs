use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::Session;
use crate::roble::dto::fields;
use crate::roble::{Filter, RecordStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WriteEvent {
    pub kind: WriteKind,
    pub table: String,
}

struct FailPoint {
    kind: WriteKind,
    table: String,
    remaining_successes: usize,
}

/// Record store kept in process memory.
///
/// Used for offline runs and tests. It assigns `_id`s on insert, keeps a log of
/// successful writes and can be told to fail a specific write.
#[derive(Default)]
pub struct InMemoryRecordStore {
    tables: Mutex<HashMap<String, Vec<Value>>>,
    writes: Mutex<Vec<WriteEvent>>,
    fail_points: Mutex<Vec<FailPoint>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn with_id(record: Value) -> Result<Value, AppError> {
    let mut object: Map<String, Value> = match record {
        Value::Object(object) => object,
        other => return Err(AppError::Validation(format!("Record must be an object, got {}", other))),
    };
    let has_id = matches!(object.get(fields::ID), Some(Value::String(id)) if !id.is_empty());
    if !has_id {
        object.insert(fields::ID.to_string(), Value::String(Uuid::new_v4().simple().to_string()));
    }
    Ok(Value::Object(object))
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores records directly, bypassing the write log. Returns them with ids.
    pub fn seed(&self, table: &str, records: Vec<Value>) -> Vec<Value> {
        let mut tables = lock(&self.tables);
        let rows = tables.entry(table.to_string()).or_default();
        let mut seeded = Vec::with_capacity(records.len());
        for record in records {
            match with_id(record) {
                Ok(record) => {
                    rows.push(record.clone());
                    seeded.push(record);
                }
                Err(e) => tracing::warn!("Not seeding {}: {}", table, e),
            }
        }
        seeded
    }

    pub fn records(&self, table: &str) -> Vec<Value> {
        lock(&self.tables).get(table).cloned().unwrap_or_default()
    }

    pub fn find(&self, table: &str, id: &str) -> Option<Value> {
        lock(&self.tables)
            .get(table)?
            .iter()
            .find(|record| record.get(fields::ID).and_then(Value::as_str) == Some(id))
            .cloned()
    }

    pub fn writes(&self) -> Vec<WriteEvent> {
        lock(&self.writes).clone()
    }

    pub fn clear_writes(&self) {
        lock(&self.writes).clear();
    }

    /// Makes the write of `kind` on `table` fail after `successes` matching
    /// writes went through. Fires once.
    pub fn fail_on(&self, kind: WriteKind, table: &str, successes: usize) {
        lock(&self.fail_points).push(FailPoint {
            kind,
            table: table.to_string(),
            remaining_successes: successes,
        });
    }

    fn check_write(&self, kind: WriteKind, table: &str) -> Result<(), AppError> {
        let mut fail_points = lock(&self.fail_points);
        let position = fail_points
            .iter()
            .position(|fp| fp.kind == kind && fp.table == table);
        if let Some(index) = position {
            if fail_points[index].remaining_successes == 0 {
                fail_points.remove(index);
                return Err(AppError::Remote(format!(
                    "Roble API error 500 Internal Server Error on {:?} {}: injected failure",
                    kind, table
                )));
            }
            fail_points[index].remaining_successes -= 1;
        }
        Ok(())
    }

    fn log_write(&self, kind: WriteKind, table: &str) {
        lock(&self.writes).push(WriteEvent {
            kind,
            table: table.to_string(),
        });
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn read(&self, _session: &Session, table: &str, filter: &Filter) -> Result<Vec<Value>, AppError> {
        Ok(lock(&self.tables)
            .get(table)
            .map(|rows| rows.iter().filter(|r| filter.matches(r)).cloned().collect())
            .unwrap_or_default())
    }

    async fn insert(&self, _session: &Session, table: &str, records: Vec<Value>) -> Result<Vec<Value>, AppError> {
        self.check_write(WriteKind::Insert, table)?;
        let records = records
            .into_iter()
            .map(with_id)
            .collect::<Result<Vec<_>, _>>()?;

        lock(&self.tables)
            .entry(table.to_string())
            .or_default()
            .extend(records.iter().cloned());
        self.log_write(WriteKind::Insert, table);
        Ok(records)
    }

    async fn update(&self, _session: &Session, table: &str, id: &str, updates: Value) -> Result<(), AppError> {
        self.check_write(WriteKind::Update, table)?;
        let Value::Object(updates) = updates else {
            return Err(AppError::Validation("Updates must be an object".to_string()));
        };

        {
            let mut tables = lock(&self.tables);
            let record = tables
                .get_mut(table)
                .and_then(|rows| {
                    rows.iter_mut()
                        .find(|r| r.get(fields::ID).and_then(Value::as_str) == Some(id))
                })
                .ok_or_else(|| {
                    AppError::Remote(format!("Roble API error 404 Not Found on update {} {}", table, id))
                })?;
            if let Value::Object(object) = record {
                object.extend(updates);
            }
        }
        self.log_write(WriteKind::Update, table);
        Ok(())
    }

    async fn delete(&self, _session: &Session, table: &str, conditions: &Filter) -> Result<(), AppError> {
        if conditions.is_empty() {
            return Err(AppError::Validation(format!("Refusing unconditional delete on {}", table)));
        }
        self.check_write(WriteKind::Delete, table)?;
        if let Some(rows) = lock(&self.tables).get_mut(table) {
            rows.retain(|r| !conditions.matches(r));
        }
        self.log_write(WriteKind::Delete, table);
        Ok(())
    }
}
