#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Clearance Core
//!
//! Invocation lifecycle and cross-system correlation engine for background and
//! clearance checks run through external providers.
//!
//! ## Overview
//!
//! Every provider call is an **invocation** with its own retry state. A case
//! moves through a fixed per-provider protocol of two or three **cycles**
//! (create, status, and for some providers acknowledge). Provider-assigned
//! identifiers are correlated back to internal (subject, program) identity
//! through **clearance links**, and a **clearance** summary row records how far
//! the case has come.
//!
//! ## Architecture
//!
//! - The [`runner`] claims an invocation, resolves its context, renders and
//!   sends exactly one HTTP request, logs both sides of the exchange and
//!   classifies the result against the endpoint's retry budget.
//! - The [`resolver`] recovers (subject, program) either from the caller or,
//!   on retries, from the invocation's first logged request body.
//! - The [`composer`] and [`rendering`] turn stored records into an outbound
//!   body; the [`interpreter`] turns provider responses into link and
//!   clearance progress.
//! - The [`scheduler`] sweeps retry due invocations and polls open cases;
//!   the [`manager`] is the caller-facing surface.
//!
//! ## Module Organization
//!
//! - [`models`] - Invocations, logs, links, clearances, endpoints, subjects
//! - [`store`] - Storage traits with PostgreSQL and in-memory backends
//! - [`state_machine`] - Invocation and clearance status rules
//! - [`providers`] - Protocol registry keyed by provider code
//! - [`auth`] / [`transport`] - Bearer tokens and the outbound HTTP seam
//! - [`config`] - YAML configuration with environment overrides
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use clearance_core::config::ClearanceConfig;
//! use clearance_core::engine::ClearanceEngine;
//! use clearance_core::store::MemoryStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClearanceConfig::default();
//! let engine = ClearanceEngine::builder(&config)
//!     .with_backend(Arc::new(MemoryStore::new()))
//!     .build()?;
//! let processed = engine.manager().process_retryable_invocations().await;
//! println!("retry sweep ok: {processed}");
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod composer;
pub mod config;
pub mod constants;
pub mod database;
pub mod engine;
pub mod error;
pub mod interpreter;
pub mod logging;
pub mod manager;
pub mod models;
pub mod providers;
pub mod rendering;
pub mod resolver;
pub mod runner;
pub mod scheduler;
pub mod state_machine;
pub mod store;
pub mod transport;
pub mod utils;

pub use config::{ClearanceConfig, ConfigManager, ProviderConfig};
pub use constants::{OperationCode, OUTCOME_COMPLETE};
pub use engine::{ClearanceEngine, EngineBuilder};
pub use error::{ClearanceError, Result};
pub use manager::ClearanceManager;
pub use models::{Clearance, ClearanceLink, EndpointDefinition, Invocation, InvocationLog};
pub use providers::{ProtocolKind, ProviderRegistry};
pub use resolver::{Bootstrap, ContextResolver, ResolvedContext};
pub use runner::{InvocationRunner, RunOutcome};
pub use scheduler::{ClearanceSweeps, PeriodicScheduler, SweepReport};
pub use state_machine::{ClearanceStatus, InvocationStatus};
pub use store::{MemoryStore, PgStore, Stores};
