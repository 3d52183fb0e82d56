//! Persistence contract for approvable records
use super::error::{StorageError, WorkflowError};
use super::record::{ApprovableRecord, RecordKind};
use super::state_machine::Status;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Storage collaborator. Writes are atomic: a failed call leaves nothing behind.
pub trait ApprovalStore {
    /// Next value of the per-kind sequence behind `PO-0001` style numbers.
    fn next_number(&self, kind: RecordKind) -> Result<u64, WorkflowError>;

    /// Store a new record. Fails with `Conflict` if the id is taken.
    fn insert(&self, record: &ApprovableRecord) -> Result<(), WorkflowError>;

    fn load(&self, id: &str) -> Result<Option<ApprovableRecord>, WorkflowError>;

    /// Conditional write. Succeeds only if the stored record is still in
    /// `expected_prior` at the version just before `record.version`.
    fn save(
        &self,
        record: &ApprovableRecord,
        expected_prior: Status,
    ) -> Result<ApprovableRecord, WorkflowError>;

    /// Records in any of `statuses`, oldest first. An empty filter matches all.
    fn query(&self, statuses: &[Status]) -> Result<Vec<ApprovableRecord>, WorkflowError>;
}

impl<S: ApprovalStore + ?Sized> ApprovalStore for Arc<S> {
    fn next_number(&self, kind: RecordKind) -> Result<u64, WorkflowError> {
        (**self).next_number(kind)
    }
    fn insert(&self, record: &ApprovableRecord) -> Result<(), WorkflowError> {
        (**self).insert(record)
    }
    fn load(&self, id: &str) -> Result<Option<ApprovableRecord>, WorkflowError> {
        (**self).load(id)
    }
    fn save(
        &self,
        record: &ApprovableRecord,
        expected_prior: Status,
    ) -> Result<ApprovableRecord, WorkflowError> {
        (**self).save(record, expected_prior)
    }
    fn query(&self, statuses: &[Status]) -> Result<Vec<ApprovableRecord>, WorkflowError> {
        (**self).query(statuses)
    }
}

/// The check both stores run before swapping a record in.
pub(crate) fn is_expected_predecessor(
    current: &ApprovableRecord,
    next: &ApprovableRecord,
    expected_prior: Status,
) -> bool {
    current.status == expected_prior && current.version + 1 == next.version
}

pub(crate) fn matches_filter(record: &ApprovableRecord, statuses: &[Status]) -> bool {
    statuses.is_empty() || statuses.contains(&record.status)
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, ApprovableRecord>>,
    sequences: Mutex<HashMap<RecordKind, u64>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ApprovalStore for MemoryStore {
    fn next_number(&self, kind: RecordKind) -> Result<u64, WorkflowError> {
        let mut sequences = self.sequences.lock().map_err(|_| StorageError::Poisoned)?;
        let next = sequences.entry(kind).or_insert(0);
        *next += 1;
        Ok(*next)
    }

    fn insert(&self, record: &ApprovableRecord) -> Result<(), WorkflowError> {
        let mut records = self.records.lock().map_err(|_| StorageError::Poisoned)?;
        if records.contains_key(&record.id) {
            return Err(WorkflowError::Conflict {
                id: record.id.clone(),
                expected: record.status,
            });
        }
        records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn load(&self, id: &str) -> Result<Option<ApprovableRecord>, WorkflowError> {
        let records = self.records.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(records.get(id).cloned())
    }

    fn save(
        &self,
        record: &ApprovableRecord,
        expected_prior: Status,
    ) -> Result<ApprovableRecord, WorkflowError> {
        let mut records = self.records.lock().map_err(|_| StorageError::Poisoned)?;
        let Some(current) = records.get_mut(&record.id) else {
            return Err(WorkflowError::NotFound {
                id: record.id.clone(),
            });
        };
        if !is_expected_predecessor(current, record, expected_prior) {
            return Err(WorkflowError::Conflict {
                id: record.id.clone(),
                expected: expected_prior,
            });
        }
        *current = record.clone();
        Ok(record.clone())
    }

    fn query(&self, statuses: &[Status]) -> Result<Vec<ApprovableRecord>, WorkflowError> {
        let records = self.records.lock().map_err(|_| StorageError::Poisoned)?;
        let mut found: Vec<_> = records
            .values()
            .filter(|record| matches_filter(record, statuses))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(found)
    }
}
