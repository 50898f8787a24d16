use std::future::ready;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use health::HealthRegistry;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::item_endpoint;
use crate::prometheus::{setup_metrics_recorder, track_metrics};
use crate::store::DocumentStore;
use crate::time::TimeSource;

#[derive(Clone)]
pub struct State {
    pub store: Arc<dyn DocumentStore + Send + Sync>,
    pub timesource: Arc<dyn TimeSource + Send + Sync>,
    pub event_hub_configured: bool,
}

async fn index() -> &'static str {
    "ingest"
}

pub fn router<TZ: TimeSource + Send + Sync + 'static>(
    timesource: TZ,
    store: Arc<dyn DocumentStore + Send + Sync>,
    liveness: HealthRegistry,
    event_hub_configured: bool,
    metrics: bool,
) -> Router {
    let state = State {
        store,
        timesource: Arc::new(timesource),
        event_hub_configured,
    };

    let router = Router::new()
        .route("/", get(index))
        .route("/_readiness", get(index))
        .route("/_liveness", get(move || ready(liveness.get_status())))
        .route("/api/add_item", post(item_endpoint::add_item))
        .route("/api/health", get(item_endpoint::health))
        .route("/api/test", get(item_endpoint::deployment_check))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(track_metrics))
        .with_state(state);

    // The recorder is global, tests build routers without it
    if !metrics {
        return router;
    }
    match setup_metrics_recorder() {
        Ok(recorder_handle) => {
            router.route("/metrics", get(move || ready(recorder_handle.render())))
        }
        Err(err) => {
            error!("failed to install the prometheus recorder: {}", err);
            router
        }
    }
}
