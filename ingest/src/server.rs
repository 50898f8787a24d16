use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use common_kafka::kafka_consumer::SingleTopicConsumer;
use health::{ComponentStatus, HealthHandle, HealthRegistry};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::Config;
use crate::router;
use crate::store::memory::MemoryStore;
use crate::store::postgres::PgDocumentStore;
use crate::store::DocumentStore;
use crate::stream::{MessageHandler, StreamIngestor};
use crate::time::SystemTime;

const STORE_PROBE_INTERVAL: Duration = Duration::from_secs(10);

async fn create_store(
    config: &Config,
    liveness: &HealthRegistry,
) -> anyhow::Result<Arc<dyn DocumentStore + Send + Sync>> {
    if config.memory_store {
        // Only used for local runs, don't let a container with it pass the probes
        liveness
            .register("memory_store".to_string(), Duration::from_secs(30))
            .await
            .report_status(ComponentStatus::Unhealthy)
            .await;

        warn!("documents are kept in memory and lost on restart");
        return Ok(Arc::new(MemoryStore::new(&config.store_collection)));
    }

    let store = PgDocumentStore::new(
        &config.store_collection,
        &config.database_url,
        config.max_pg_connections,
    )
    .await
    .context("failed to connect to the document store")?;
    Ok(Arc::new(store))
}

async fn probe_store(store: Arc<dyn DocumentStore + Send + Sync>, liveness: HealthHandle) {
    let mut interval = tokio::time::interval(STORE_PROBE_INTERVAL);
    loop {
        _ = interval.tick().await;
        match store.ping().await {
            Ok(()) => liveness.report_healthy().await,
            Err(err) => {
                warn!("document store unreachable: {}", err);
                liveness.report_status(ComponentStatus::Unhealthy).await;
            }
        }
    }
}

pub async fn serve<F>(config: Config, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    config
        .kafka
        .validate()
        .context("invalid Event Hub configuration")?;

    let liveness =
        HealthRegistry::new_with_strategy("liveness", config.healthcheck_strategy.clone());

    let store = create_store(&config, &liveness).await?;
    if !config.memory_store {
        let store_liveness = liveness
            .register("store".to_string(), STORE_PROBE_INTERVAL * 3)
            .await;
        drop(tokio::spawn(probe_store(store.clone(), store_liveness)));
    }

    let event_hub_configured = config.kafka.event_hub_configured();
    if !event_hub_configured {
        warn!("EVENT_HUB_CONNECTION_STRING is not set");
    }

    let consumer_task = if config.stream_enabled {
        let consumer_liveness = liveness
            .register("stream_consumer".to_string(), Duration::from_secs(60))
            .await;
        let consumer = SingleTopicConsumer::new(
            config.kafka.clone(),
            config.consumer.clone(),
            consumer_liveness.clone(),
        )
        .context("failed to create the stream consumer")?;

        let handler = MessageHandler::new(
            &config.consumer.kafka_consumer_group,
            store.clone(),
            Arc::new(SystemTime {}),
            Duration::from_millis(config.processing_timeout_ms),
        );
        let ingestor = StreamIngestor::new(consumer, handler, consumer_liveness);
        Some(tokio::spawn(ingestor.run()))
    } else {
        info!("stream ingestion disabled");
        None
    };

    let app = router::router(
        SystemTime {},
        store,
        liveness,
        event_hub_configured,
        config.export_prometheus,
    );

    info!("listening on {:?}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("failed to serve")?;

    if let Some(task) = consumer_task {
        task.abort();
    }
    Ok(())
}
