//! sled backed [`ApprovalStore`]
use super::error::{StorageError, WorkflowError};
use super::record::{ApprovableRecord, RecordKind};
use super::state_machine::Status;
use super::store::{ApprovalStore, is_expected_predecessor, matches_filter};
use std::path::Path;
use std::sync::Arc;

const RECORDS_TREE: &str = "approvables";
const SEQUENCES_TREE: &str = "sequences";

/// Records are CBOR encoded and keyed by id. Every write is a single
/// `compare_and_swap`, so a racing writer either wins outright or gets a
/// `Conflict`.
pub struct SledStore {
    instance: Arc<sled::Db>,
    records: sled::Tree,
    sequences: sled::Tree,
}

impl SledStore {
    pub fn new(instance: Arc<sled::Db>) -> Result<Self, StorageError> {
        let records = instance.open_tree(RECORDS_TREE)?;
        let sequences = instance.open_tree(SEQUENCES_TREE)?;
        Ok(Self {
            instance,
            records,
            sequences,
        })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        Self::new(Arc::new(sled::open(path)?))
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.instance.flush()?;
        Ok(())
    }

    fn decode(bytes: &[u8]) -> Result<ApprovableRecord, StorageError> {
        Ok(minicbor::decode(bytes)?)
    }
}

fn read_counter(bytes: Option<&[u8]>) -> Option<u64> {
    bytes
        .and_then(|raw| <[u8; 8]>::try_from(raw).ok())
        .map(u64::from_be_bytes)
}

impl ApprovalStore for SledStore {
    fn next_number(&self, kind: RecordKind) -> Result<u64, WorkflowError> {
        let key = kind.number_prefix();
        let mut corrupt = false;
        let updated = self
            .sequences
            .update_and_fetch(key, |old| {
                // sled reruns this on contention
                corrupt = false;
                let next = match old {
                    None => Some(1),
                    Some(raw) => read_counter(Some(raw)).and_then(|n| n.checked_add(1)),
                };
                match next {
                    Some(next) => Some(next.to_be_bytes().to_vec()),
                    None => {
                        // leave unreadable counters untouched
                        corrupt = true;
                        old.map(<[u8]>::to_vec)
                    }
                }
            })
            .map_err(StorageError::from)?;

        let corrupt_sequence =
            || -> WorkflowError { StorageError::CorruptSequence(key.to_string()).into() };
        if corrupt {
            return Err(corrupt_sequence());
        }
        read_counter(updated.as_deref()).ok_or_else(corrupt_sequence)
    }

    fn insert(&self, record: &ApprovableRecord) -> Result<(), WorkflowError> {
        let encoded = minicbor::to_vec(record).map_err(StorageError::from)?;
        let swapped = self
            .records
            .compare_and_swap(record.id.as_bytes(), None::<&[u8]>, Some(encoded))
            .map_err(StorageError::from)?;

        swapped.map_err(|_| WorkflowError::Conflict {
            id: record.id.clone(),
            expected: record.status,
        })
    }

    fn load(&self, id: &str) -> Result<Option<ApprovableRecord>, WorkflowError> {
        tracing::debug!(record_id = id, "loading record");
        match self.records.get(id.as_bytes()).map_err(StorageError::from)? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn save(
        &self,
        record: &ApprovableRecord,
        expected_prior: Status,
    ) -> Result<ApprovableRecord, WorkflowError> {
        let conflict = || WorkflowError::Conflict {
            id: record.id.clone(),
            expected: expected_prior,
        };

        let Some(current_bytes) = self
            .records
            .get(record.id.as_bytes())
            .map_err(StorageError::from)?
        else {
            return Err(WorkflowError::NotFound {
                id: record.id.clone(),
            });
        };
        let current = Self::decode(&current_bytes)?;
        if !is_expected_predecessor(&current, record, expected_prior) {
            return Err(conflict());
        }

        // swap against the exact bytes checked above
        let encoded = minicbor::to_vec(record).map_err(StorageError::from)?;
        let swapped = self
            .records
            .compare_and_swap(record.id.as_bytes(), Some(current_bytes), Some(encoded))
            .map_err(StorageError::from)?;

        match swapped {
            Ok(()) => Ok(record.clone()),
            Err(_) => Err(conflict()),
        }
    }

    fn query(&self, statuses: &[Status]) -> Result<Vec<ApprovableRecord>, WorkflowError> {
        let mut found = Vec::new();
        for entry in self.records.iter() {
            let (_, bytes) = entry.map_err(StorageError::from)?;
            let record = Self::decode(&bytes)?;
            if matches_filter(&record, statuses) {
                found.push(record);
            }
        }
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(found)
    }
}
