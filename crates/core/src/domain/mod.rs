pub mod contact;
pub mod record;
pub mod report;
pub mod schema;
pub mod supplier;
