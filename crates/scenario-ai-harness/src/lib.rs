//! Streaming LLM ingestion with relaxed JSON recovery for scenario generation.
//!
//! An [`Orchestrator`] sends a conversation to an OpenAI-compatible endpoint,
//! streams the reply as text fragments, and falls back to a single
//! non-streaming request and then to canned offline content, so every started
//! request ends with text. The [`ingest`] pipeline turns that text (fenced,
//! prose-wrapped, with trailing commas or unquoted keys) into a JSON value.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use scenario_ai_harness::prelude::*;
//! use scenario_ai_harness::vendors::openai::OpenAiTransport;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), HarnessError> {
//! let orchestrator = Orchestrator::builder()
//!     .transport(Arc::new(OpenAiTransport::new()?))
//!     .config(ConnectionConfig::from_env()?)
//!     .build()?;
//!
//! let session = Session::new(SessionConfig::named("demo"));
//! let scenario = orchestrator
//!     .request(&session, Conversation::from_user("Create a management scenario"))
//!     .await?
//!     .finish_structured_or_fallback()
//!     .await?;
//!
//! println!("{scenario:#}");
//! # Ok(())
//! # }
//! ```
//!
//! The recovery pipeline can also be used on its own:
//!
//! ```
//! let value = scenario_ai_harness::ingest::recover("Sure!\n```json\n{a: 1,}\n```").unwrap();
//! assert_eq!(value, serde_json::json!({"a": 1}));
//! ```

/// Connection configuration for the chat endpoint.
pub mod config;
/// Conversation history sent with each request.
pub mod conversation;
/// Public error types.
pub mod errors;
/// Canned offline content.
pub mod fallback;
/// Fragment accumulation and relaxed JSON recovery.
pub mod ingest;
/// Intent classification and typed payloads.
pub mod intent;
/// Tracing subscriber setup.
pub mod observability;
/// Request orchestrator and builder.
pub mod orchestrator;
/// Common imports for typical usage.
pub mod prelude;
/// Transport contract used by vendor integrations.
pub mod provider;
/// Streaming handle returned for each request.
pub mod run;
/// Session configuration and session handle.
pub mod session;
/// Normalized stream events.
pub mod stream;
/// Vendor-specific transports.
pub mod vendors;

pub use config::ConnectionConfig;
pub use conversation::{ChatMessage, Conversation, Role};
pub use errors::{HarnessError, ProviderError, RecoveryError};
pub use fallback::{OFFLINE_NOTICE, fallback_payload, provide_fallback};
pub use intent::{Intent, IntentPayload};
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use provider::{ChatRequest, ChatTransport, FragmentStream};
pub use run::{RunOutcome, RunStream};
pub use session::{Session, SessionConfig};
pub use stream::{FragmentSource, StreamEvent};
