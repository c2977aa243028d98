//! Evaluation lifecycle services

pub mod creator;
pub mod finalizer;
pub mod identity;
pub mod mirror;
pub mod scorer_client;
pub mod scoring;
pub mod trigger;

pub use creator::JobCreator;
pub use finalizer::{FinalizeError, FinalizeOutcome, Finalizer, ScorerOutcome, ShortFinalize, WebhookFinalize};
pub use identity::{IdentityProvider, JwtIdentityProvider, VerifiedIdentity};
pub use mirror::{MirrorStatus, MirrorUpdater};
pub use scorer_client::{HttpScorerClient, ScorerClient, ScorerDispatcher};
pub use trigger::{ManualTrigger, TriggerError};
