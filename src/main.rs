//! Task Dispatch Service - Main Entry Point
//!
//! Serves the HTTP API and runs the long-lived broker workers.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use task_dispatch::api::handlers::{self, AppState};
use task_dispatch::gateway::{GatewayConfig, ScheduleGateway, TaskGateway};
use task_dispatch::jobs::{MemoryStore, ProvisionalStore, ResultRecorder};
use task_dispatch::messaging::{
    handoff, AmqpTransport, BrokerConnection, InboundWorker, OutboundDispatcher,
};
use task_dispatch::{BrokerError, ServiceConfig};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ServiceConfig::from_env()?;
    let registry = config.queues.registry();

    info!("Starting Task Dispatch Service v{}", env!("CARGO_PKG_VERSION"));
    info!(broker = ?config.broker, queues = ?config.queues, "Loaded configuration");

    let connect = || Arc::new(BrokerConnection::new(AmqpTransport, &config.broker));

    // Outbound dispatchers, one channel each
    let (task_handoff, task_intake) = handoff();
    let task_dispatcher = OutboundDispatcher::new(connect(), registry.clone());
    spawn_fatal("task dispatcher", task_dispatcher.run(task_intake));

    let (schedule_handoff, schedule_intake) = handoff();
    let schedule_dispatcher = OutboundDispatcher::new(connect(), registry.clone());
    spawn_fatal("schedule dispatcher", schedule_dispatcher.run(schedule_intake));

    // Result consumer
    let store: Arc<dyn ProvisionalStore> = Arc::new(MemoryStore::new());
    let result_worker = InboundWorker::new(connect(), registry.clone(), registry.result.name.clone())
        .with_prefetch(config.worker.prefetch)
        .with_consumer_tag("task-dispatch-results");
    spawn_fatal(
        "result worker",
        result_worker.run(ResultRecorder::new(Arc::clone(&store))),
    );

    let gateway_config = GatewayConfig::from(&config.gateway);
    let state = Arc::new(AppState {
        tasks: TaskGateway::new(task_handoff, gateway_config.clone()),
        schedules: ScheduleGateway::new(schedule_handoff, gateway_config),
        store,
        queues: registry,
    });

    // Build HTTP routes
    let app = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/tasks", post(handlers::submit_task))
        .route("/tasks/:id", get(handlers::get_task))
        .route("/schedules", put(handlers::update_schedule))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http.port));
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "task_dispatch=info,tower_http=debug".into()),
    );
    let registry = tracing_subscriber::registry().with(filter);

    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Run a long-lived broker worker. Setup failures and fail-stop exits
/// terminate the process so the supervisor restarts it.
fn spawn_fatal<F>(name: &'static str, worker: F)
where
    F: Future<Output = Result<(), BrokerError>> + Send + 'static,
{
    tokio::spawn(async move {
        match worker.await {
            Ok(()) => info!(worker = name, "Worker stopped"),
            Err(e) => {
                error!(worker = name, error = %e, "Worker failed, exiting");
                std::process::exit(1);
            }
        }
    });
}
