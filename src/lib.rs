//! Lead Qualification Library
//!
//! Receives vacancy-analysis form submissions, enriches them with vacancy,
//! organization and contact intelligence, and turns whatever enrichment
//! arrived into a deterministic lead score and priority tier.
//!
//! # Modules
//!
//! - `config`: Configuration management.
//! - `crm_client`: Pipedrive CRM writer.
//! - `enrichment_client`: Single enrichment call with bounded retry.
//! - `errors`: Error handling types.
//! - `fragment_cache`: Content-keyed cache of enrichment results.
//! - `handlers`: HTTP request handlers.
//! - `models`: Submission, fragment and lead record models.
//! - `orchestrator`: Concurrent enrichment fan-out.
//! - `pipeline`: Gathering → scoring → record assembly.
//! - `scoring`: Lead scoring engine.
//! - `services`: Enrichment providers (Anthropic, Apollo).
//! - `webhook_models`: Typeform webhook payload models.

pub mod config;
pub mod crm_client;
pub mod enrichment_client;
pub mod errors;
pub mod fragment_cache;
pub mod handlers;
pub mod models;
pub mod orchestrator;
pub mod pipeline;
pub mod scoring;
pub mod services;
pub mod webhook_models;
