use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::contact::{Channel, Contact};

#[derive(Debug, Error)]
pub enum RosterError {
    #[error("could not parse supplier roster: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("supplier roster contains no suppliers")]
    Empty,
    #[error("supplier entry {index} has an empty name")]
    EmptyName { index: usize },
}

/// One roster entry as supplied by the operator. The contact stays a raw
/// string here; parsing and validation happen per supplier when the batch
/// runs, so one malformed entry never blocks the rest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Supplier {
    pub name: String,
    pub contact: String,
}

#[derive(Debug, Deserialize)]
struct RosterFile {
    suppliers: Vec<Supplier>,
}

/// The list of suppliers for one outreach run, loaded from a JSON file of the
/// shape `{"suppliers": [{"name": ..., "contact": ...}]}`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SupplierRoster {
    suppliers: Vec<Supplier>,
}

impl SupplierRoster {
    pub fn from_json_str(raw: &str) -> Result<Self, RosterError> {
        let file: RosterFile = serde_json::from_str(raw)?;
        if file.suppliers.is_empty() {
            return Err(RosterError::Empty);
        }
        for (index, supplier) in file.suppliers.iter().enumerate() {
            if supplier.name.trim().is_empty() {
                return Err(RosterError::EmptyName { index });
            }
        }
        Ok(Self { suppliers: file.suppliers })
    }

    pub fn suppliers(&self) -> &[Supplier] {
        &self.suppliers
    }

    pub fn len(&self) -> usize {
        self.suppliers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.suppliers.is_empty()
    }

    /// Channels the run will need an adapter for. Entries whose contact does
    /// not parse are skipped here; they fail individually at batch time.
    pub fn required_channels(&self) -> BTreeSet<Channel> {
        self.suppliers
            .iter()
            .filter_map(|supplier| Contact::parse(&supplier.contact).ok())
            .map(|contact| contact.channel())
            .collect()
    }

    /// Keeps only suppliers reachable over `channel`. Entries whose contact
    /// does not parse are kept, so roster typos still show up as failures
    /// instead of vanishing from the report.
    pub fn restricted_to(&self, channel: Channel) -> Self {
        let suppliers = self
            .suppliers
            .iter()
            .filter(|supplier| match Contact::parse(&supplier.contact) {
                Ok(contact) => contact.channel() == channel,
                Err(_) => true,
            })
            .cloned()
            .collect();
        Self { suppliers }
    }
}
