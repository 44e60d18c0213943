//! Routing engine - matcher chain, hybrid intent analysis and route resolution
//!
//! This crate turns one inbound conversational message into a `RouteDecision`:
//! - Gates the message on rate limits and business hours (`guardrails`)
//! - Resolves structured replies, buttons, list rows, menu digits and global
//!   keywords with an ordered matcher chain (`matchers`)
//! - Classifies everything else deterministically, consulting a generative
//!   model only for weak candidates (`classifier`, `analyzer`)
//! - Maps the intent to the next node, enforcing authentication (`resolver`)
//!
//! # Architecture
//!
//! 1. **Entry gates** (`guardrails`) - rate limit + business hours, both fail open
//! 2. **Matcher chain** (`matchers`) - priority ordered, first hit wins
//! 3. **Hybrid analysis** (`analyzer`) - extraction, scoring, bounded fallback
//! 4. **Resolution** (`resolver`) - intent → node, auth redirect, audit event
//!
//! # Key Types
//!
//! - `RoutingRuntime` - gates + routing for one message (see `runtime`)
//! - `IntentRouteResolver` - matcher chain, analyzer and node mapping
//! - `LlmClient` - pluggable trait for OpenAI/Anthropic/Ollama
//!
//! # Safety Principle
//!
//! The model is strictly a translator. Its label is whitelisted, its confidence
//! clamped and its entities advisory; deterministic extraction always wins.

pub mod analyzer;
pub mod classifier;
pub mod extraction;
pub mod fallback;
pub mod guardrails;
pub mod llm;
pub mod matchers;
pub mod resolver;
pub mod runtime;

pub use analyzer::HybridIntentAnalyzer;
pub use classifier::{normalize_text, DeterministicClassifier, IntentPattern};
pub use extraction::{AmountLocale, EntityExtractor};
pub use fallback::AnalysisContext;
pub use guardrails::{DenyReason, EntryCheck, EntryDecision, EntryGuard};
pub use llm::{client_from_config, DisabledLlmClient, HttpLlmClient, LlmClient};
pub use matchers::{MatchContext, Matcher, MatcherChain, MatcherResult};
pub use resolver::{IntentRouteResolver, NodeTable, NodeTarget};
pub use runtime::{InboundMessage, MessageOutcome, RoutingRuntime};
