//! coach-eval library interface
//!
//! Evaluation job lifecycle: creation, single-winner finalization by the
//! external scorer or the short path, session mirroring, and delivery of
//! terminal states to waiting consumers.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod notify;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use coach_common::api::auth::SharedSecret;
use coach_common::events::EventBus;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServiceConfig;
use crate::db::{JobStore, SessionStore, SqliteJobStore, SqliteSessionStore};
use crate::notify::{NotificationHub, PollConfig, Poller, StoreStatusSource};
use crate::services::scorer_client::ScorerError;
use crate::services::{
    Finalizer, HttpScorerClient, IdentityProvider, JobCreator, JwtIdentityProvider, ManualTrigger,
    MirrorUpdater, ScorerClient, ScorerDispatcher,
};

/// Buffered change events per lagging subscriber
pub const EVENT_BUS_CAPACITY: usize = 256;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub jobs: Arc<dyn JobStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub identity: Arc<dyn IdentityProvider>,
    /// Expected `x-scorer-secret` value
    pub webhook_secret: SharedSecret,
    pub hub: NotificationHub,
    pub creator: JobCreator,
    pub finalizer: Finalizer,
    pub trigger: ManualTrigger,
    pub config: Arc<ServiceConfig>,
}

impl AppState {
    /// Wire all components, dispatching over HTTP when a scorer URL is set
    pub fn new(db: SqlitePool, config: ServiceConfig) -> Result<Self, ScorerError> {
        let scorer = match &config.scorer.url {
            Some(url) => {
                let client = HttpScorerClient::new(
                    url.clone(),
                    config.webhook_secret.clone(),
                    config.scorer.timeout(),
                )?;
                Some(Arc::new(client) as Arc<dyn ScorerClient>)
            }
            None => None,
        };

        Ok(Self::with_scorer(db, config, scorer))
    }

    /// Wire all components around the given scorer client (None disables dispatch)
    pub fn with_scorer(
        db: SqlitePool,
        config: ServiceConfig,
        scorer: Option<Arc<dyn ScorerClient>>,
    ) -> Self {
        let config = Arc::new(config);
        let event_bus = EventBus::new(EVENT_BUS_CAPACITY);

        let jobs: Arc<dyn JobStore> = Arc::new(SqliteJobStore::new(
            db.clone(),
            event_bus.clone(),
            config.database.max_lock_wait_ms,
        ));
        let sessions: Arc<dyn SessionStore> = Arc::new(SqliteSessionStore::new(db.clone()));
        let identity: Arc<dyn IdentityProvider> =
            Arc::new(JwtIdentityProvider::new(&config.identity));

        let dispatcher =
            ScorerDispatcher::new(jobs.clone(), scorer, config.scorer.callback_url.clone());
        let creator = JobCreator::new(jobs.clone(), dispatcher);
        let finalizer = Finalizer::new(
            jobs.clone(),
            MirrorUpdater::new(sessions.clone()),
            config.evaluation.clone(),
        );
        let trigger = ManualTrigger::new(sessions.clone(), creator.clone());
        let hub = NotificationHub::new(jobs.clone(), event_bus.clone());

        Self {
            db,
            jobs,
            sessions,
            identity,
            webhook_secret: SharedSecret::new(&config.webhook_secret),
            hub,
            creator,
            finalizer,
            trigger,
            config,
        }
    }

    /// In-process poll consumer using the configured interval and budget
    pub fn poller(&self) -> Poller {
        Poller::new(
            Arc::new(StoreStatusSource::new(self.jobs.clone())),
            PollConfig::from(&self.config.poll),
        )
    }
}

/// Build application router
///
/// Scorer callbacks pass the shared-secret middleware; user routes
/// authenticate per handler through extractors.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{get, post};

    let scorer_routes = Router::new()
        .route("/api/evaluation-complete", post(api::evaluation_complete))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::scorer_auth_middleware,
        ));

    let user_routes = Router::new()
        .route("/api/evaluations", post(api::create_evaluation))
        .route("/api/evaluations/:request_id", get(api::get_evaluation))
        .route("/api/evaluations/:request_id/events", get(api::evaluation_events))
        .route(
            "/api/complete-short-evaluation",
            post(api::complete_short_evaluation),
        )
        .route(
            "/api/admin/sessions/:session_id/evaluate",
            post(api::trigger_evaluation),
        );

    Router::new()
        .merge(scorer_routes)
        .merge(user_routes)
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
