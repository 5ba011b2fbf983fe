use crate::error::StoreError;
use crate::model::{Address, DeploymentRecord};
use serde::{Deserialize, Serialize};

/// Ordered records keyed by name. Serialized as a bare JSON array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeploymentState {
    records: Vec<DeploymentRecord>,
}

impl DeploymentState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a state from loaded records, rejecting duplicate names.
    pub fn from_records(records: Vec<DeploymentRecord>) -> Result<Self, StoreError> {
        let mut state = Self::new();
        for record in records {
            if state.find(&record.name).is_some() {
                return Err(StoreError::DuplicateRecord(record.name));
            }
            state.records.push(record);
        }
        Ok(state)
    }

    pub fn find(&self, name: &str) -> Option<&DeploymentRecord> {
        self.records.iter().find(|r| r.name == name)
    }

    pub fn address_of(&self, name: &str) -> Option<&Address> {
        self.find(name)
            .filter(|r| r.is_deployed())
            .and_then(|r| r.address.as_ref())
    }

    /// Replaces or appends `record`. Returns whether anything changed.
    ///
    /// An address, once recorded, can only be replaced by the same address.
    pub fn upsert(&mut self, record: DeploymentRecord) -> Result<bool, StoreError> {
        match self.records.iter_mut().find(|r| r.name == record.name) {
            Some(existing) => {
                if let Some(current) = &existing.address {
                    if record.address.as_ref() != Some(current) {
                        return Err(StoreError::AddressImmutable {
                            name: record.name,
                            existing: current.to_string(),
                            attempted: record
                                .address
                                .map(|a| a.to_string())
                                .unwrap_or_else(|| "none".to_string()),
                        });
                    }
                }
                if *existing == record {
                    return Ok(false);
                }
                *existing = record;
                Ok(true)
            }
            None => {
                self.records.push(record);
                Ok(true)
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<DeploymentRecord> {
        let index = self.records.iter().position(|r| r.name == name)?;
        Some(self.records.remove(index))
    }

    pub fn records(&self) -> &[DeploymentRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
