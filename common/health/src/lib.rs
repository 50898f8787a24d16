use std::collections::HashMap;
use std::ops::Add;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tokio::runtime;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Health reporting for the long-running parts of the ingest service.
///
/// The service runs a stream consumer loop next to the HTTP server, and
/// messages can only be trusted to land in the store while that loop and
/// the store connection keep reporting.
///
/// Each component registers once and receives a `HealthHandle`. The
/// overall status is derived from the latest report of every component:
///   - with the `All` strategy, every component must be healthy
///   - with the `Any` strategy, one healthy component is enough
///   - a component that did not report before its deadline is `Stalled`
///
/// Liveness and readiness should use separate registries.

#[derive(Default, Debug)]
pub struct HealthStatus {
    /// The overall status, computed according to the registry strategy
    pub healthy: bool,
    /// Current status of each registered component, for display
    pub components: HashMap<String, ComponentStatus>,
}

#[derive(Serialize)]
struct HealthBody<'a> {
    healthy: bool,
    components: HashMap<&'a str, &'static str>,
}

impl IntoResponse for HealthStatus {
    /// 200 when healthy, 500 otherwise, with the per-component status as JSON.
    fn into_response(self) -> Response {
        let body = HealthBody {
            healthy: self.healthy,
            components: self
                .components
                .iter()
                .map(|(name, status)| (name.as_str(), status.label()))
                .collect(),
        };
        let code = match self.healthy {
            true => StatusCode::OK,
            false => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (code, Json(body)).into_response()
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ComponentStatus {
    /// Automatically set when a component is newly registered
    Starting,
    /// Recently reported healthy, will need to report again before the date
    HealthyUntil(time::OffsetDateTime),
    /// Reported unhealthy
    Unhealthy,
    /// Automatically set when the HealthyUntil deadline is reached
    Stalled,
}

impl ComponentStatus {
    pub fn is_healthy(&self) -> bool {
        match self {
            ComponentStatus::HealthyUntil(until) => until.gt(&time::OffsetDateTime::now_utc()),
            _ => false,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ComponentStatus::Starting => "starting",
            ComponentStatus::HealthyUntil(_) => "healthy",
            ComponentStatus::Unhealthy => "unhealthy",
            ComponentStatus::Stalled => "stalled",
        }
    }
}

struct HealthMessage {
    component: String,
    status: ComponentStatus,
}

#[derive(Clone)]
pub struct HealthHandle {
    component: String,
    deadline: Duration,
    sender: mpsc::Sender<HealthMessage>,
}

impl HealthHandle {
    /// Asynchronously report healthy, returns when the message is queued.
    /// Must be called more frequently than the configured deadline.
    pub async fn report_healthy(&self) {
        self.report_status(ComponentStatus::HealthyUntil(
            time::OffsetDateTime::now_utc().add(self.deadline),
        ))
        .await
    }

    pub async fn report_status(&self, status: ComponentStatus) {
        let message = HealthMessage {
            component: self.component.clone(),
            status,
        };
        if let Err(err) = self.sender.send(message).await {
            warn!("failed to report health status: {}", err)
        }
    }

    /// Synchronous variant for callbacks running outside of the async context,
    /// such as the librdkafka statistics callback.
    pub fn report_healthy_blocking(&self) {
        let status =
            ComponentStatus::HealthyUntil(time::OffsetDateTime::now_utc().add(self.deadline));

        // Blocking on the channel from inside the runtime would panic, spawn instead
        if let Ok(h) = runtime::Handle::try_current() {
            let handle = self.clone();
            h.spawn(async move { handle.report_status(status).await });
        } else if let Err(err) = self.sender.blocking_send(HealthMessage {
            component: self.component.clone(),
            status,
        }) {
            warn!("failed to report health status: {}", err)
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum HealthStrategy {
    /// All components must be healthy for the registry to be healthy
    All,
    /// At least one component must be healthy for the registry to be healthy
    Any,
}

impl std::str::FromStr for HealthStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_ref() {
            "all" => Ok(HealthStrategy::All),
            "any" => Ok(HealthStrategy::Any),
            _ => Err(format!("Unknown Health Strategy: {s}, must be ALL or ANY")),
        }
    }
}

#[derive(Clone)]
pub struct HealthRegistry {
    name: String,
    strategy: HealthStrategy,
    components: Arc<RwLock<HashMap<String, ComponentStatus>>>,
    sender: mpsc::Sender<HealthMessage>,
}

impl HealthRegistry {
    pub fn new(name: &str) -> Self {
        Self::new_with_strategy(name, HealthStrategy::All)
    }

    pub fn new_with_strategy(name: &str, strategy: HealthStrategy) -> Self {
        let (tx, mut rx) = mpsc::channel::<HealthMessage>(16);
        let registry = Self {
            name: name.to_owned(),
            strategy,
            components: Default::default(),
            sender: tx,
        };

        let components = registry.components.clone();
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if let Ok(mut map) = components.write() {
                    _ = map.insert(message.component, message.status);
                } else {
                    // Poisoned lock: the probes will fail and the process restart
                    warn!("poisoned HealthRegistry lock")
                }
            }
        });

        registry
    }

    /// Registers a new component in the registry. The returned handle should be passed
    /// to the component, to allow it to frequently report its health status.
    pub async fn register(&self, component: String, deadline: Duration) -> HealthHandle {
        let handle = HealthHandle {
            component,
            deadline,
            sender: self.sender.clone(),
        };
        handle.report_status(ComponentStatus::Starting).await;
        handle
    }

    /// Returns the overall status, computed from the status of all the components
    /// currently registered. Can be used as an axum handler.
    pub fn get_status(&self) -> HealthStatus {
        let Ok(components) = self.components.read() else {
            warn!("poisoned HealthRegistry lock");
            return HealthStatus::default();
        };

        // No component registered yet means unhealthy, whatever the strategy
        let mut result = HealthStatus {
            healthy: !components.is_empty() && self.strategy == HealthStrategy::All,
            components: Default::default(),
        };
        let now = time::OffsetDateTime::now_utc();

        for (name, status) in components.iter() {
            let status = match status {
                ComponentStatus::HealthyUntil(until) if until.gt(&now) => status.clone(),
                ComponentStatus::HealthyUntil(_) => ComponentStatus::Stalled,
                other => other.clone(),
            };
            match (status.is_healthy(), &self.strategy) {
                (true, HealthStrategy::Any) => result.healthy = true,
                (false, HealthStrategy::All) => result.healthy = false,
                _ => {}
            }
            _ = result.components.insert(name.clone(), status);
        }

        match result.healthy {
            true => debug!("{} health check ok", self.name),
            false => warn!("{} health check failed: {:?}", self.name, result.components),
        }
        result
    }
}
