use thiserror::Error;

use crate::domain::contact::ContactError;
use crate::domain::schema::SchemaError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    Contact(#[from] ContactError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Run-level error taxonomy. Errors local to one supplier stay inside that
/// supplier's report; only configuration-level failures abort a whole run.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    /// Stable class string for CLI outcome payloads.
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Domain(DomainError::Contact(_)) => "invalid_contact",
            Self::Domain(DomainError::Schema(_)) => "invalid_schema",
            Self::Transport(_) => "transport",
            Self::Configuration(_) => "configuration",
        }
    }

    /// Whether the error must abort the whole run rather than one supplier.
    pub fn aborts_run(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Domain(DomainError::Schema(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::{ApplicationError, DomainError};
    use crate::domain::contact::ContactError;
    use crate::domain::schema::SchemaError;

    #[test]
    fn contact_errors_stay_per_supplier() {
        let error = ApplicationError::from(DomainError::from(ContactError::Empty));
        assert_eq!(error.error_class(), "invalid_contact");
        assert!(!error.aborts_run());
    }

    #[test]
    fn schema_and_configuration_errors_abort_the_run() {
        let schema = ApplicationError::from(DomainError::from(SchemaError::EmptyFieldName));
        assert!(schema.aborts_run());

        let config = ApplicationError::Configuration("missing field schema".to_string());
        assert!(config.aborts_run());
        assert_eq!(config.error_class(), "configuration");
    }
}
