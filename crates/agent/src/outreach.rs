use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use procura_core::config::OutreachConfig;
use procura_core::{Contact, FieldSchema, SupplierRecord};
use procura_transport::{Inbound, Transport, TransportError};

use crate::cancel::CancelSignal;
use crate::extraction::FieldExtractor;
use crate::messages::MessageTemplates;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoopSettings {
    pub overall_timeout: Duration,
    pub poll_interval: Duration,
    pub max_follow_ups: u32,
}

impl LoopSettings {
    pub fn from_config(config: &OutreachConfig) -> Self {
        Self {
            overall_timeout: Duration::from_secs(config.overall_timeout_secs),
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            max_follow_ups: config.max_follow_ups,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompletionStatus {
    Complete,
    TimedOut,
    Cancelled,
}

/// Terminal state of one supplier conversation, with whatever was learned.
#[derive(Clone, Debug)]
pub struct LoopOutcome {
    pub record: SupplierRecord,
    pub status: CompletionStatus,
    pub follow_ups_sent: u32,
    pub cycles: u32,
}

/// Transport failure that aborted a conversation. The partial record is
/// kept so the caller can still report what was learned before the break.
#[derive(Clone, Debug)]
pub struct LoopFailure {
    pub error: TransportError,
    pub record: SupplierRecord,
    pub follow_ups_sent: u32,
    pub cycles: u32,
}

/// Drives one supplier from initial inquiry to a terminal state: send the
/// inquiry, poll for replies, extract and merge fields, follow up on what
/// is still missing, and stop at completion, deadline, or cancellation.
pub struct OutreachLoop {
    transport: Arc<dyn Transport>,
    extractor: Arc<dyn FieldExtractor>,
    templates: MessageTemplates,
    settings: LoopSettings,
}

impl OutreachLoop {
    pub fn new(
        transport: Arc<dyn Transport>,
        extractor: Arc<dyn FieldExtractor>,
        templates: MessageTemplates,
        settings: LoopSettings,
    ) -> Self {
        Self { transport, extractor, templates, settings }
    }

    pub async fn run(
        &self,
        contact: Contact,
        schema: &FieldSchema,
        cancel: &CancelSignal,
    ) -> Result<LoopOutcome, LoopFailure> {
        let mut record = SupplierRecord::new(contact.clone());
        let mut follow_ups_sent = 0u32;
        let mut cycles = 0u32;

        if cancel.is_cancelled() {
            return Ok(LoopOutcome {
                record,
                status: CompletionStatus::Cancelled,
                follow_ups_sent,
                cycles,
            });
        }

        if let Err(error) = self.transport.send(&contact, &self.templates.inquiry(schema)).await {
            return Err(LoopFailure { error, record, follow_ups_sent, cycles });
        }
        info!(
            event_name = "outreach.inquiry_sent",
            contact = %contact,
            fields = schema.len(),
            "initial inquiry sent"
        );

        let deadline = Instant::now() + self.settings.overall_timeout;

        loop {
            if cancel.is_cancelled() {
                info!(event_name = "outreach.cancelled", contact = %contact, "outreach cancelled");
                return Ok(LoopOutcome {
                    record,
                    status: CompletionStatus::Cancelled,
                    follow_ups_sent,
                    cycles,
                });
            }
            let now = Instant::now();
            if now >= deadline {
                info!(
                    event_name = "outreach.timed_out",
                    contact = %contact,
                    cycles,
                    missing = record.missing(schema).len(),
                    "deadline reached before the record was complete"
                );
                return Ok(LoopOutcome {
                    record,
                    status: CompletionStatus::TimedOut,
                    follow_ups_sent,
                    cycles,
                });
            }

            let inbound = match self.transport.receive(&contact).await {
                Ok(inbound) => inbound,
                Err(error) => return Err(LoopFailure { error, record, follow_ups_sent, cycles }),
            };

            let text = match inbound {
                Inbound::Message(text) => text,
                Inbound::NoNewMessage => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    tokio::time::sleep(remaining.min(self.settings.poll_interval)).await;
                    continue;
                }
            };

            cycles += 1;
            let missing = record.missing(schema);
            if !missing.is_empty() {
                match self.extractor.extract(&text, &missing).await {
                    Ok(extracted) => {
                        let summary = record.apply(schema, &extracted);
                        for key in &summary.unknown_dropped {
                            warn!(
                                event_name = "outreach.unknown_field_dropped",
                                contact = %contact,
                                key,
                                "dropping extracted field outside the schema"
                            );
                        }
                        for key in &summary.blank_ignored {
                            debug!(contact = %contact, key, "ignoring blank extracted value");
                        }
                        debug!(
                            contact = %contact,
                            cycle = cycles,
                            applied = summary.applied.len(),
                            "merged extraction cycle"
                        );
                    }
                    Err(error) => {
                        // A bad extraction is a zero-progress cycle, not a failure.
                        warn!(
                            event_name = "outreach.extraction_failed",
                            contact = %contact,
                            cycle = cycles,
                            error = %error,
                            "extraction failed; no fields merged this cycle"
                        );
                    }
                }
            }

            if record.is_complete(schema) {
                info!(
                    event_name = "outreach.complete",
                    contact = %contact,
                    cycles,
                    follow_ups_sent,
                    "all requested fields acquired"
                );
                return Ok(LoopOutcome {
                    record,
                    status: CompletionStatus::Complete,
                    follow_ups_sent,
                    cycles,
                });
            }

            if follow_ups_sent < self.settings.max_follow_ups {
                let still_missing = record.missing(schema);
                let body = self.templates.follow_up(&still_missing);
                if let Err(error) = self.transport.send(&contact, &body).await {
                    return Err(LoopFailure { error, record, follow_ups_sent, cycles });
                }
                follow_ups_sent += 1;
                info!(
                    event_name = "outreach.follow_up_sent",
                    contact = %contact,
                    follow_ups_sent,
                    missing = still_missing.len(),
                    "follow-up sent for missing fields"
                );
            } else {
                debug!(
                    contact = %contact,
                    "follow-up budget exhausted; polling until the deadline"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::extraction::ExtractionError;
    use procura_core::{ExtractedFields, FieldSpec};

    struct ScriptedTransport {
        inbound: Mutex<VecDeque<Result<Inbound, TransportError>>>,
        sent: Mutex<Vec<String>>,
        // One entry per send call, in order. None means the send succeeds.
        send_script: Mutex<VecDeque<Option<TransportError>>>,
    }

    impl ScriptedTransport {
        fn new(inbound: Vec<Result<Inbound, TransportError>>) -> Self {
            Self {
                inbound: Mutex::new(inbound.into_iter().collect()),
                sent: Mutex::new(Vec::new()),
                send_script: Mutex::new(VecDeque::new()),
            }
        }

        fn script_sends(&self, outcomes: Vec<Option<TransportError>>) {
            *self.send_script.lock().unwrap() = outcomes.into_iter().collect();
        }

        fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, _contact: &Contact, text: &str) -> Result<(), TransportError> {
            if let Some(Some(error)) = self.send_script.lock().unwrap().pop_front() {
                return Err(error);
            }
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }

        async fn receive(&self, _contact: &Contact) -> Result<Inbound, TransportError> {
            self.inbound
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(Inbound::NoNewMessage))
        }
    }

    struct ScriptedExtractor {
        results: Mutex<VecDeque<Result<ExtractedFields, ExtractionError>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedExtractor {
        fn new(results: Vec<Result<ExtractedFields, ExtractionError>>) -> Self {
            Self { results: Mutex::new(results.into_iter().collect()), calls: Mutex::new(0) }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl FieldExtractor for ScriptedExtractor {
        async fn extract(
            &self,
            _raw_text: &str,
            _expected: &[&FieldSpec],
        ) -> Result<ExtractedFields, ExtractionError> {
            *self.calls.lock().unwrap() += 1;
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(ExtractedFields::new()))
        }
    }

    fn schema() -> FieldSchema {
        FieldSchema::new(vec![
            FieldSpec::new("product_name", "Product name").unwrap(),
            FieldSpec::new("unit_price", "Unit price").unwrap(),
        ])
        .unwrap()
    }

    fn contact() -> Contact {
        Contact::parse("supplier@example.com").unwrap()
    }

    fn settings() -> LoopSettings {
        LoopSettings {
            overall_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(5),
            max_follow_ups: 3,
        }
    }

    fn fields(pairs: &[(&str, &str)]) -> ExtractedFields {
        pairs.iter().map(|(key, value)| (key.to_string(), value.to_string())).collect()
    }

    fn outreach_loop(
        transport: Arc<ScriptedTransport>,
        extractor: Arc<ScriptedExtractor>,
        settings: LoopSettings,
    ) -> OutreachLoop {
        OutreachLoop::new(
            transport,
            extractor,
            MessageTemplates::new("XYZ Company", "Alex Morgan"),
            settings,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn completes_over_two_cycles_with_one_follow_up() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(Inbound::Message("We sell the Widget 3000".into())),
            Ok(Inbound::Message("Price is 10 USD per unit".into())),
        ]));
        let extractor = Arc::new(ScriptedExtractor::new(vec![
            Ok(fields(&[("product_name", "Widget 3000")])),
            Ok(fields(&[("unit_price", "10 USD")])),
        ]));
        let outreach = outreach_loop(transport.clone(), extractor.clone(), settings());

        let outcome =
            outreach.run(contact(), &schema(), &CancelSignal::never()).await.unwrap();

        assert_eq!(outcome.status, CompletionStatus::Complete);
        assert_eq!(outcome.follow_ups_sent, 1);
        assert_eq!(outcome.cycles, 2);
        assert_eq!(outcome.record.value(&procura_core::FieldName::new("product_name").unwrap()), Some("Widget 3000"));
        assert_eq!(outcome.record.value(&procura_core::FieldName::new("unit_price").unwrap()), Some("10 USD"));

        let sent = transport.sent();
        assert_eq!(sent.len(), 2, "initial inquiry plus one follow-up");
        assert!(sent[1].contains("Unit price"));
        assert!(!sent[1].contains("Product name"));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_without_any_reply() {
        let transport = Arc::new(ScriptedTransport::new(Vec::new()));
        let extractor = Arc::new(ScriptedExtractor::new(Vec::new()));
        let outreach = outreach_loop(transport.clone(), extractor.clone(), settings());

        let started = Instant::now();
        let outcome =
            outreach.run(contact(), &schema(), &CancelSignal::never()).await.unwrap();

        assert_eq!(outcome.status, CompletionStatus::TimedOut);
        assert_eq!(outcome.follow_ups_sent, 0);
        assert_eq!(outcome.cycles, 0);
        assert_eq!(transport.sent().len(), 1, "only the initial inquiry");
        assert_eq!(extractor.calls(), 0);

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(60));
        assert!(elapsed <= Duration::from_secs(65), "overshoot bounded by one poll interval");
    }

    #[tokio::test(start_paused = true)]
    async fn empty_schema_completes_on_first_reply_without_extraction() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(Inbound::Message(
            "hello there".into(),
        ))]));
        let extractor = Arc::new(ScriptedExtractor::new(Vec::new()));
        let outreach = outreach_loop(transport.clone(), extractor.clone(), settings());
        let schema = FieldSchema::new(Vec::new()).unwrap();

        let outcome = outreach.run(contact(), &schema, &CancelSignal::never()).await.unwrap();

        assert_eq!(outcome.status, CompletionStatus::Complete);
        assert_eq!(outcome.follow_ups_sent, 0);
        assert_eq!(extractor.calls(), 0, "nothing to extract for an empty field list");
    }

    #[tokio::test(start_paused = true)]
    async fn blank_extraction_triggers_follow_up_naming_the_field() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(Inbound::Message(
            "we make many products".into(),
        ))]));
        let extractor = Arc::new(ScriptedExtractor::new(vec![Ok(fields(&[
            ("product_name", ""),
            ("unit_price", "10 USD"),
        ]))]));
        let mut settings = settings();
        settings.overall_timeout = Duration::from_secs(20);
        let outreach = outreach_loop(transport.clone(), extractor.clone(), settings);

        let outcome =
            outreach.run(contact(), &schema(), &CancelSignal::never()).await.unwrap();

        assert_eq!(outcome.status, CompletionStatus::TimedOut);
        assert_eq!(outcome.follow_ups_sent, 1);
        let sent = transport.sent();
        assert!(sent[1].contains("Product name"));
        assert!(!sent[1].contains("Unit price"), "blank value never clears what was acquired");
    }

    #[tokio::test(start_paused = true)]
    async fn extraction_error_counts_as_zero_progress_cycle() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(Inbound::Message("garbled".into())),
            Ok(Inbound::Message("Widget, 10 USD".into())),
        ]));
        let extractor = Arc::new(ScriptedExtractor::new(vec![
            Err(ExtractionError::MalformedOutput("not json".into())),
            Ok(fields(&[("product_name", "Widget"), ("unit_price", "10 USD")])),
        ]));
        let outreach = outreach_loop(transport.clone(), extractor.clone(), settings());

        let outcome =
            outreach.run(contact(), &schema(), &CancelSignal::never()).await.unwrap();

        assert_eq!(outcome.status, CompletionStatus::Complete);
        assert_eq!(outcome.cycles, 2);
        assert_eq!(outcome.follow_ups_sent, 1, "failed cycle still asks again");
    }

    #[tokio::test(start_paused = true)]
    async fn follow_up_budget_is_bounded() {
        let inbound = (0..4)
            .map(|_| Ok(Inbound::Message("still vague".into())))
            .collect::<Vec<_>>();
        let transport = Arc::new(ScriptedTransport::new(inbound));
        let extractor = Arc::new(ScriptedExtractor::new(Vec::new()));
        let mut settings = settings();
        settings.max_follow_ups = 2;
        settings.overall_timeout = Duration::from_secs(30);
        let outreach = outreach_loop(transport.clone(), extractor.clone(), settings);

        let outcome =
            outreach.run(contact(), &schema(), &CancelSignal::never()).await.unwrap();

        assert_eq!(outcome.status, CompletionStatus::TimedOut);
        assert_eq!(outcome.follow_ups_sent, 2);
        assert_eq!(transport.sent().len(), 3, "inquiry plus exactly two follow-ups");
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_before_start_sends_nothing() {
        let transport = Arc::new(ScriptedTransport::new(Vec::new()));
        let extractor = Arc::new(ScriptedExtractor::new(Vec::new()));
        let outreach = outreach_loop(transport.clone(), extractor.clone(), settings());

        let (handle, signal) = crate::cancel::cancel_pair();
        handle.cancel();
        let outcome = outreach.run(contact(), &schema(), &signal).await.unwrap();

        assert_eq!(outcome.status, CompletionStatus::Cancelled);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn follow_up_send_failure_keeps_the_partial_record() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(Inbound::Message(
            "We sell the Widget 3000".into(),
        ))]));
        transport.script_sends(vec![
            None,
            Some(TransportError::Send("smtp connection reset".into())),
        ]);
        let extractor = Arc::new(ScriptedExtractor::new(vec![Ok(fields(&[(
            "product_name",
            "Widget 3000",
        )]))]));
        let outreach = outreach_loop(transport.clone(), extractor.clone(), settings());

        let failure =
            outreach.run(contact(), &schema(), &CancelSignal::never()).await.unwrap_err();

        assert_eq!(failure.error, TransportError::Send("smtp connection reset".into()));
        assert_eq!(failure.cycles, 1);
        let name = procura_core::FieldName::new("product_name").unwrap();
        assert_eq!(failure.record.value(&name), Some("Widget 3000"));
        assert_eq!(transport.sent().len(), 1, "only the inquiry went out");
    }
}
