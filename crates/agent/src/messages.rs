use std::fmt::Write as _;

use procura_core::config::OutreachConfig;
use procura_core::{FieldSchema, FieldSpec};

/// Deterministic outbound message bodies. The LLM only ever reads
/// replies; everything the company sends is rendered from these
/// templates so a model can never invent commitments on its behalf.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageTemplates {
    company_name: String,
    contact_person: String,
}

impl MessageTemplates {
    pub fn new(company_name: impl Into<String>, contact_person: impl Into<String>) -> Self {
        Self { company_name: company_name.into(), contact_person: contact_person.into() }
    }

    pub fn from_config(config: &OutreachConfig) -> Self {
        Self::new(config.company_name.clone(), config.contact_person.clone())
    }

    pub fn subject(&self) -> String {
        format!("Inquiry from {}", self.company_name)
    }

    pub fn inquiry(&self, schema: &FieldSchema) -> String {
        let mut body = format!(
            "Hello,\n\nMy name is {person} and I am a procurement manager at {company}. We are \
             evaluating suppliers for an upcoming order and are interested in your products.\n",
            person = self.contact_person,
            company = self.company_name,
        );
        if !schema.is_empty() {
            body.push_str("\nCould you share the following details:\n\n");
            for (index, label) in schema.labels().iter().enumerate() {
                let _ = writeln!(body, "{}. {}", index + 1, label);
            }
        }
        let _ = write!(
            body,
            "\nThank you in advance for a quick reply!\n\n{person}\n{company}",
            person = self.contact_person,
            company = self.company_name,
        );
        body
    }

    pub fn follow_up(&self, missing: &[&FieldSpec]) -> String {
        let mut body = String::from(
            "Thank you for the details so far. To complete our review, could you also specify:\n\n",
        );
        for (index, spec) in missing.iter().enumerate() {
            let _ = writeln!(body, "{}. {}", index + 1, spec.label);
        }
        let _ = write!(
            body,
            "\nBest regards,\n{person}\n{company}",
            person = self.contact_person,
            company = self.company_name,
        );
        body
    }
}
