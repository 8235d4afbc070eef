use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::record::SupplierRecord;
use crate::domain::supplier::Supplier;

/// Terminal state of one supplier's outreach. `TimedOut` and `Cancelled` are
/// valid outcomes the caller branches on, not errors; only `Failed` carries a
/// fault.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OutreachStatus {
    Complete,
    TimedOut,
    Cancelled,
    Failed { reason: String },
}

impl OutreachStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::TimedOut => "timed_out",
            Self::Cancelled => "cancelled",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Per-supplier result: the (possibly partial) record always rides along with
/// the status. `record` is absent only when the contact never parsed, i.e. no
/// loop ever started.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SupplierReport {
    pub supplier: Supplier,
    pub status: OutreachStatus,
    pub record: Option<SupplierRecord>,
    pub follow_ups_sent: u32,
    pub cycles: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub reports: Vec<SupplierReport>,
}

impl BatchReport {
    pub fn completed(&self) -> usize {
        self.count(|status| matches!(status, OutreachStatus::Complete))
    }

    pub fn failed(&self) -> usize {
        self.count(|status| matches!(status, OutreachStatus::Failed { .. }))
    }

    fn count(&self, predicate: impl Fn(&OutreachStatus) -> bool) -> usize {
        self.reports.iter().filter(|report| predicate(&report.status)).count()
    }
}
