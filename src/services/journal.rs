use serde_json::Value;
use tracing::{error, info, warn};

use crate::error::AppError;
use crate::models::Session;
use crate::repository;
use crate::roble::dto::tables;
use crate::roble::{Filter, RecordStore};

/// A single write against the record store, used as the undo of a committed step.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Insert { table: &'static str, records: Vec<Value> },
    Update { table: &'static str, id: String, updates: Value },
    Delete { table: &'static str, conditions: Filter },
}

impl WriteOp {
    pub fn set_members(group_id: &str, members: u32) -> Self {
        WriteOp::Update {
            table: tables::GROUP,
            id: group_id.to_string(),
            updates: repository::members_update(members),
        }
    }

    pub async fn apply(&self, store: &dyn RecordStore, session: &Session) -> Result<(), AppError> {
        match self {
            WriteOp::Insert { table, records } => {
                store.insert(session, table, records.clone()).await?;
            }
            WriteOp::Update { table, id, updates } => {
                store.update(session, table, id, updates.clone()).await?;
            }
            WriteOp::Delete { table, conditions } => {
                store.delete(session, table, conditions).await?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct JournalEntry {
    pub step: String,
    pub undo: WriteOp,
}

#[derive(Debug, Default, PartialEq)]
pub struct UnwindReport {
    pub undone: usize,
    /// Steps left applied on the remote store.
    pub unreconciled: Vec<String>,
}

/// Committed steps of one multi-step operation, each paired with its undo.
///
/// The record store has no transactions. When an operation fails part-way the
/// journal is logged in full and, if compensation is on, undone in reverse.
#[derive(Debug)]
pub struct Journal {
    operation: &'static str,
    committed: Vec<JournalEntry>,
}

impl Journal {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            committed: Vec::new(),
        }
    }

    pub fn record(&mut self, step: impl Into<String>, undo: WriteOp) {
        self.committed.push(JournalEntry {
            step: step.into(),
            undo,
        });
    }

    /// Passes `result` through, unwinding the journal first when it is an error.
    pub async fn settle<T>(
        self,
        result: Result<T, AppError>,
        store: &dyn RecordStore,
        session: &Session,
        compensate: bool,
    ) -> Result<T, AppError> {
        if let Err(cause) = &result {
            self.unwind(store, session, cause, compensate).await;
        }
        result
    }

    pub async fn unwind(
        self,
        store: &dyn RecordStore,
        session: &Session,
        cause: &AppError,
        compensate: bool,
    ) -> UnwindReport {
        let mut report = UnwindReport::default();
        if self.committed.is_empty() {
            return report;
        }

        error!(
            "{} failed after {} committed steps: {}",
            self.operation,
            self.committed.len(),
            cause
        );
        for entry in &self.committed {
            error!("{}: committed '{}', undo {:?}", self.operation, entry.step, entry.undo);
        }

        if !compensate {
            warn!("{}: compensation disabled, reconcile the steps above manually", self.operation);
            report.unreconciled = self.committed.into_iter().map(|e| e.step).collect();
            return report;
        }

        for entry in self.committed.into_iter().rev() {
            match entry.undo.apply(store, session).await {
                Ok(()) => {
                    info!("{}: undid '{}'", self.operation, entry.step);
                    report.undone += 1;
                }
                Err(e) => {
                    error!(
                        "{}: could not undo '{}' ({}), pending {:?}",
                        self.operation, entry.step, e, entry.undo
                    );
                    report.unreconciled.push(entry.step);
                }
            }
        }
        report
    }
}
