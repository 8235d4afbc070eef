use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use procura_core::{
    ApplicationError, BatchReport, Contact, DomainError, FieldSchema, OutreachStatus,
    SupplierReport, SupplierRoster,
};

use crate::cancel::CancelSignal;
use crate::outreach::{CompletionStatus, OutreachLoop};

impl From<CompletionStatus> for OutreachStatus {
    fn from(status: CompletionStatus) -> Self {
        match status {
            CompletionStatus::Complete => OutreachStatus::Complete,
            CompletionStatus::TimedOut => OutreachStatus::TimedOut,
            CompletionStatus::Cancelled => OutreachStatus::Cancelled,
        }
    }
}

/// Works through a roster one supplier at a time. A supplier whose contact
/// fails to parse, or whose transport breaks, is reported as `Failed` and
/// the run moves on; only cancellation stops the batch early.
pub struct BatchRunner {
    outreach: OutreachLoop,
}

impl BatchRunner {
    pub fn new(outreach: OutreachLoop) -> Self {
        Self { outreach }
    }

    pub async fn run(
        &self,
        roster: &SupplierRoster,
        schema: &FieldSchema,
        cancel: &CancelSignal,
    ) -> BatchReport {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        info!(
            event_name = "batch.started",
            run_id,
            suppliers = roster.len(),
            fields = schema.len(),
            "outreach batch started"
        );

        let mut reports = Vec::with_capacity(roster.len());
        for supplier in roster.suppliers() {
            if cancel.is_cancelled() {
                reports.push(SupplierReport {
                    supplier: supplier.clone(),
                    status: OutreachStatus::Cancelled,
                    record: None,
                    follow_ups_sent: 0,
                    cycles: 0,
                });
                continue;
            }

            let report = match Contact::parse(&supplier.contact) {
                Err(error) => {
                    let error = ApplicationError::from(DomainError::from(error));
                    warn!(
                        event_name = "batch.invalid_contact",
                        run_id,
                        supplier = supplier.name,
                        error_class = error.error_class(),
                        error = %error,
                        "skipping supplier with unusable contact"
                    );
                    SupplierReport {
                        supplier: supplier.clone(),
                        status: OutreachStatus::Failed { reason: error.to_string() },
                        record: None,
                        follow_ups_sent: 0,
                        cycles: 0,
                    }
                }
                Ok(contact) => match self.outreach.run(contact, schema, cancel).await {
                    Ok(outcome) => SupplierReport {
                        supplier: supplier.clone(),
                        status: outcome.status.into(),
                        record: Some(outcome.record),
                        follow_ups_sent: outcome.follow_ups_sent,
                        cycles: outcome.cycles,
                    },
                    Err(failure) => {
                        let error = ApplicationError::Transport(failure.error.to_string());
                        warn!(
                            event_name = "batch.supplier_failed",
                            run_id,
                            supplier = supplier.name,
                            error_class = error.error_class(),
                            error = %error,
                            "transport failure aborted this supplier"
                        );
                        SupplierReport {
                            supplier: supplier.clone(),
                            status: OutreachStatus::Failed { reason: error.to_string() },
                            record: Some(failure.record),
                            follow_ups_sent: failure.follow_ups_sent,
                            cycles: failure.cycles,
                        }
                    }
                },
            };

            info!(
                event_name = "batch.supplier_finished",
                run_id,
                supplier = report.supplier.name,
                status = report.status.as_str(),
                follow_ups_sent = report.follow_ups_sent,
                "supplier outreach finished"
            );
            reports.push(report);
        }

        let batch = BatchReport { run_id, started_at, finished_at: Utc::now(), reports };
        info!(
            event_name = "batch.finished",
            run_id = batch.run_id,
            completed = batch.completed(),
            failed = batch.failed(),
            "outreach batch finished"
        );
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;

    use procura_core::{ExtractedFields, FieldSpec};
    use procura_transport::{Inbound, Transport, TransportError};

    use crate::cancel::cancel_pair;
    use crate::extraction::{ExtractionError, FieldExtractor};
    use crate::messages::MessageTemplates;
    use crate::outreach::LoopSettings;

    struct ReplyingTransport {
        replies: Mutex<HashMap<String, VecDeque<String>>>,
        sent_to: Mutex<Vec<String>>,
    }

    impl ReplyingTransport {
        fn new(replies: Vec<(&str, Vec<&str>)>) -> Self {
            let replies = replies
                .into_iter()
                .map(|(address, texts)| {
                    (address.to_string(), texts.into_iter().map(String::from).collect())
                })
                .collect();
            Self { replies: Mutex::new(replies), sent_to: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl Transport for ReplyingTransport {
        async fn send(&self, contact: &Contact, _text: &str) -> Result<(), TransportError> {
            self.sent_to.lock().unwrap().push(contact.address().to_string());
            Ok(())
        }

        async fn receive(&self, contact: &Contact) -> Result<Inbound, TransportError> {
            let mut replies = self.replies.lock().unwrap();
            match replies.get_mut(contact.address()).and_then(VecDeque::pop_front) {
                Some(text) => Ok(Inbound::Message(text)),
                None => Ok(Inbound::NoNewMessage),
            }
        }
    }

    struct EchoExtractor;

    #[async_trait]
    impl FieldExtractor for EchoExtractor {
        async fn extract(
            &self,
            raw_text: &str,
            expected: &[&FieldSpec],
        ) -> Result<ExtractedFields, ExtractionError> {
            // Fills every requested field with the reply text.
            Ok(expected
                .iter()
                .map(|spec| (spec.name.as_str().to_string(), raw_text.to_string()))
                .collect())
        }
    }

    fn schema() -> FieldSchema {
        FieldSchema::new(vec![FieldSpec::new("unit_price", "Unit price").unwrap()]).unwrap()
    }

    fn roster(entries: &[(&str, &str)]) -> SupplierRoster {
        let suppliers: Vec<String> = entries
            .iter()
            .map(|(name, contact)| format!(r#"{{"name": "{name}", "contact": "{contact}"}}"#))
            .collect();
        let raw = format!(r#"{{"suppliers": [{}]}}"#, suppliers.join(","));
        SupplierRoster::from_json_str(&raw).unwrap()
    }

    fn runner(transport: Arc<ReplyingTransport>) -> BatchRunner {
        BatchRunner::new(OutreachLoop::new(
            transport,
            Arc::new(EchoExtractor),
            MessageTemplates::new("XYZ Company", "Alex Morgan"),
            LoopSettings {
                overall_timeout: Duration::from_secs(10),
                poll_interval: Duration::from_secs(1),
                max_follow_ups: 1,
            },
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_contact_fails_without_blocking_the_rest() {
        let transport = Arc::new(ReplyingTransport::new(vec![(
            "good@example.com",
            vec!["10 USD"],
        )]));
        let batch = runner(transport.clone())
            .run(
                &roster(&[("Broken Co", "not-an-address"), ("Good Co", "good@example.com")]),
                &schema(),
                &CancelSignal::never(),
            )
            .await;

        assert_eq!(batch.reports.len(), 2);
        assert!(matches!(batch.reports[0].status, OutreachStatus::Failed { .. }));
        assert!(batch.reports[0].record.is_none());
        assert_eq!(batch.reports[1].status, OutreachStatus::Complete);
        assert_eq!(
            transport.sent_to.lock().unwrap().as_slice(),
            ["good@example.com"],
            "nothing is ever sent to an unparseable contact"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_short_circuits_remaining_suppliers() {
        let transport = Arc::new(ReplyingTransport::new(vec![(
            "first@example.com",
            vec!["10 USD"],
        )]));
        let (handle, signal) = cancel_pair();
        let runner = runner(transport.clone());

        let first = runner
            .run(&roster(&[("First Co", "first@example.com")]), &schema(), &signal)
            .await;
        assert_eq!(first.reports[0].status, OutreachStatus::Complete);

        handle.cancel();
        let rest = runner
            .run(
                &roster(&[("Second Co", "second@example.com"), ("Third Co", "third@example.com")]),
                &schema(),
                &signal,
            )
            .await;
        assert!(rest
            .reports
            .iter()
            .all(|report| report.status == OutreachStatus::Cancelled));
        assert_eq!(
            transport.sent_to.lock().unwrap().as_slice(),
            ["first@example.com"],
            "cancelled suppliers are never contacted"
        );
    }
}
