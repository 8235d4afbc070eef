pub mod config;
pub mod domain;
pub mod errors;

pub use domain::contact::{Channel, Contact, ContactError};
pub use domain::record::{ExtractedFields, MergeSummary, SupplierRecord};
pub use domain::report::{BatchReport, OutreachStatus, SupplierReport};
pub use domain::schema::{FieldName, FieldSchema, FieldSpec, SchemaError};
pub use domain::supplier::{RosterError, Supplier, SupplierRoster};
pub use errors::{ApplicationError, DomainError};
