//! HTTP API handlers for coach-eval

pub mod admin;
pub mod auth;
pub mod evaluations;
pub mod health;
pub mod short_eval;
pub mod webhook;

pub use admin::trigger_evaluation;
pub use auth::{scorer_auth_middleware, AdminUser, AuthenticatedUser};
pub use evaluations::{create_evaluation, evaluation_events, get_evaluation};
pub use health::health_routes;
pub use short_eval::complete_short_evaluation;
pub use webhook::evaluation_complete;
