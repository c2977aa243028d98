//! # Coach Common Library
//!
//! Shared code for the coaching platform services:
//! - Evaluation job model and status state machine
//! - Evaluation change feed (`EventBus`)
//! - API authentication helpers and wire types
//! - Configuration file resolution
//! - SSE helpers

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod sse;

pub use error::{Error, Result};
pub use models::{Evaluation, EvaluationStatus, TerminalOutcome};
