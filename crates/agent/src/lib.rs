//! Outreach orchestration - the response-completion loop and its batch driver
//!
//! This crate is the "brain" of the procura system. For each supplier it:
//! - Sends a templated inquiry over the supplier's channel
//! - Polls for replies until a deadline or cancellation
//! - Extracts structured fields from free-text replies via an LLM
//! - Merges extractions into the supplier record and follows up on gaps
//!
//! # Architecture
//!
//! The loop is deliberately constrained:
//! 1. **Templates** (`messages`) - every outbound message is deterministic
//! 2. **Extraction** (`extraction`) - the LLM reads replies, nothing more
//! 3. **Merging** (`procura-core`) - progress rules live in the record
//! 4. **Orchestration** (`outreach`, `batch`) - deadlines, budgets, reports
//!
//! # Safety Principle
//!
//! The LLM is strictly a reader. It never composes messages to suppliers and
//! never decides when a conversation is finished; those are deterministic
//! decisions made from the field schema and the merged record.

pub mod batch;
pub mod cancel;
pub mod extraction;
pub mod llm;
pub mod messages;
pub mod outreach;

pub use batch::BatchRunner;
pub use cancel::{cancel_pair, CancelHandle, CancelSignal};
pub use extraction::{ExtractionError, FieldExtractor, LlmFieldExtractor};
pub use llm::{HttpLlmClient, LlmClient, LlmError, RetryPolicy};
pub use messages::MessageTemplates;
pub use outreach::{CompletionStatus, LoopFailure, LoopOutcome, LoopSettings, OutreachLoop};
