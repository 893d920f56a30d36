//! # paynotify: payment event webhook notifications
//!
//! `paynotify` tells customers about payment events by POSTing to a webhook URL they configure.
//! Every notification carries an idempotency key so the receiver can discard duplicates, which
//! lets the sender retry freely and lets operators resend a notification on request.
//!
//! ## Flow
//!
//! ```text
//! POST /payments
//!   └─ Dispatcher::notify_customer
//!        ├─ store.lookup_webhook(customer)      fails fast: unknown / not configured
//!        ├─ mint idempotency key (UUIDv4)
//!        ├─ store.create_notification(pending)  fails fast: no delivery without a record
//!        └─ queue.enqueue(message) ──► DeliveryQueue worker
//!                                         ├─ DeliveryClient::deliver (backoff, 5 attempts)
//!                                         └─ store.mark_delivered on 2xx
//!
//! POST /notifications/resend
//!   └─ ResendCoordinator::resend: same last steps, original key, current webhook
//! ```
//!
//! ## Components
//!
//! - [`store`]: the [`NotificationStore`](store::NotificationStore) seam and its PostgreSQL
//!   implementation over the repositories in [`db`]
//! - [`delivery`]: HTTP delivery with retry, and the background queue that runs it
//! - [`notifications`]: [`Dispatcher`](notifications::Dispatcher) and
//!   [`ResendCoordinator`](notifications::ResendCoordinator)
//! - [`api`]: axum handlers
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use paynotify::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = paynotify::config::Args::parse();
//!     let config = Config::load(&args)?;
//!     paynotify::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```
pub mod api;
pub mod config;
pub mod db;
pub mod delivery;
pub mod errors;
pub mod notifications;
pub mod store;
pub mod telemetry;
pub mod types;

#[cfg(test)]
mod test;

use axum::{
    Router,
    routing::{get, post},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
pub use config::Config;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::{CancellationToken, DropGuard};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, debug, info, instrument};

use crate::db::handlers::Customers;
use crate::delivery::{DeliveryClient, DeliveryQueue};
use crate::notifications::{Dispatcher, ResendCoordinator};
use crate::store::{NotificationStore, PgNotificationStore};

pub use types::{CustomerId, IdempotencyKey};

/// Application state shared across all request handlers.
///
/// # Example
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .store(store)
///     .dispatcher(dispatcher)
///     .resender(resender)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn NotificationStore>,
    pub dispatcher: Dispatcher,
    pub resender: ResendCoordinator,
}

/// Get the paynotify database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Insert `count` customers named `customer 0`, `customer 1`, ... when the customers table is
/// empty. Does nothing otherwise, so it is safe to run on every startup.
#[instrument(skip(db), err)]
pub async fn seed_customers(db: &PgPool, count: u32) -> anyhow::Result<()> {
    if count == 0 {
        return Ok(());
    }

    let mut tx = db.begin().await?;
    let mut customers = Customers::new(&mut tx);

    let existing = customers.count().await?;
    if existing > 0 {
        debug!(existing, "Customers already present, skipping seed");
        return Ok(());
    }

    for i in 0..count {
        customers.create(&format!("customer {i}")).await?;
    }
    tx.commit().await?;

    info!(count, "Seeded customers");
    Ok(())
}

/// Connect to PostgreSQL and run migrations
async fn setup_database(config: &Config) -> anyhow::Result<PgPool> {
    let settings = &config.database.pool;
    let optional_secs = |secs: u64| (secs > 0).then(|| Duration::from_secs(secs));

    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs))
        .idle_timeout(optional_secs(settings.idle_timeout_secs))
        .max_lifetime(optional_secs(settings.max_lifetime_secs))
        .connect(&config.database.url)
        .await?;

    migrator().run(&pool).await?;
    Ok(pool)
}

/// Build the HTTP router for the given state
pub fn build_router(state: &AppState) -> Router {
    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/notifications", post(api::handlers::notifications::configure_webhook))
        .route("/notifications/resend", post(api::handlers::notifications::resend_notification))
        .route(
            "/notifications/{idempotency_key}",
            get(api::handlers::notifications::get_notification),
        )
        .route("/payments", post(api::handlers::payments::create_payment))
        .with_state(state.clone());

    // Add Prometheus metrics if enabled
    let router = if state.config.enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router
            .route("/internal/metrics", get(move || std::future::ready(metric_handle.render())))
            .layer(prometheus_layer)
    } else {
        router
    };

    router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    )
}

/// Container for background services and their lifecycle management.
///
/// Currently this is the delivery worker. When dropped, the `drop_guard` cancels the shutdown
/// token, signalling every task to stop.
pub struct BackgroundServices {
    background_tasks: Vec<tokio::task::JoinHandle<()>>,
    shutdown_token: CancellationToken,
    // Pub so that we can disarm it if we want to
    pub drop_guard: Option<DropGuard>,
}

impl BackgroundServices {
    /// Gracefully shutdown all background tasks, draining queued deliveries
    pub async fn shutdown(self) {
        self.shutdown_token.cancel();

        for handle in self.background_tasks {
            let _ = handle.await;
        }
    }
}

/// Start the delivery worker
fn setup_background_services(
    config: &Config,
    store: Arc<dyn NotificationStore>,
    client: DeliveryClient,
    shutdown_token: CancellationToken,
) -> (DeliveryQueue, BackgroundServices) {
    let drop_guard = shutdown_token.clone().drop_guard();

    let (queue, handle) = DeliveryQueue::spawn(client, store, &config.delivery, shutdown_token.clone());
    info!(
        max_concurrent = config.delivery.max_concurrent_deliveries,
        capacity = config.delivery.channel_capacity,
        "Delivery worker started"
    );

    let services = BackgroundServices {
        background_tasks: vec![handle],
        shutdown_token,
        drop_guard: Some(drop_guard),
    };
    (queue, services)
}

/// Main application struct that owns all resources and lifecycle.
///
/// # Lifecycle
///
/// 1. **Create**: [`Application::new`] connects to the database, runs migrations, seeds
///    customers and starts the delivery worker
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and starts handling requests
/// 3. **Shutdown**: When the shutdown signal is received, stops accepting requests, drains
///    deliveries, then closes the pool
pub struct Application {
    router: Router,
    config: Config,
    pool: Option<PgPool>,
    bg_services: BackgroundServices,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        Self::new_with_pool(config, None).await
    }

    /// Create an application on an existing pool (migrations are still run), or connect using
    /// the configuration when `pool` is `None`.
    pub async fn new_with_pool(config: Config, pool: Option<PgPool>) -> anyhow::Result<Self> {
        debug!("Starting paynotify with configuration: {:#?}", config);

        let pool = match pool {
            Some(pool) => {
                migrator().run(&pool).await?;
                pool
            }
            None => setup_database(&config).await?,
        };
        seed_customers(&pool, config.seed_customers).await?;

        let client = DeliveryClient::new(&config.delivery)?;
        let store: Arc<dyn NotificationStore> = Arc::new(PgNotificationStore::new(pool.clone()));

        Ok(Self::with_store(config, store, client, Some(pool)))
    }

    /// Assemble the application around an arbitrary store.
    pub fn with_store(config: Config, store: Arc<dyn NotificationStore>, client: DeliveryClient, pool: Option<PgPool>) -> Self {
        let (queue, bg_services) = setup_background_services(&config, store.clone(), client, CancellationToken::new());

        let app_state = AppState::builder()
            .config(config.clone())
            .store(store.clone())
            .dispatcher(Dispatcher::new(store.clone(), queue.clone()))
            .resender(ResendCoordinator::new(store, queue))
            .build();

        let router = build_router(&app_state);

        Self {
            router,
            config,
            pool,
            bg_services,
        }
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> (axum_test::TestServer, BackgroundServices) {
        let server = axum_test::TestServer::new(self.router.into_make_service()).expect("Failed to create test server");
        (server, self.bg_services)
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("paynotify listening on http://{}", bind_addr);

        // Run the server with graceful shutdown
        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        // Requests are done; let queued and in-flight deliveries finish
        info!("Draining deliveries...");
        self.bg_services.shutdown().await;

        if let Some(pool) = self.pool {
            info!("Closing database connections...");
            pool.close().await;
        }

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
