//! Helpers for building test applications.

use std::sync::Arc;

use axum_test::TestServer;
use sqlx::PgPool;

use crate::config::{Config, DatabaseConfig, DeliveryConfig, PoolSettings};
use crate::delivery::DeliveryClient;
use crate::store::InMemoryStore;
use crate::{Application, BackgroundServices};

pub fn create_test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        database_url: None,
        database: DatabaseConfig {
            // Tests supply their own pool
            url: "Something".to_string(),
            pool: PoolSettings {
                max_connections: 2,
                min_connections: 0,
                ..Default::default()
            },
        },
        delivery: DeliveryConfig {
            timeout_secs: 5,
            initial_interval_ms: 1,
            max_interval_ms: 5,
            max_elapsed_secs: 30,
            ..Default::default()
        },
        seed_customers: 2,
        enable_metrics: false,
        enable_otel_export: false,
    }
}

/// Full application on a PostgreSQL pool, with customers 1 and 2 seeded.
pub async fn create_test_app(pool: PgPool) -> (TestServer, BackgroundServices) {
    let app = Application::new_with_pool(create_test_config(), Some(pool))
        .await
        .expect("Failed to create application");

    app.into_test_server()
}

/// Application over an in-memory store, for tests that do not need PostgreSQL.
pub fn create_memory_test_app(store: Arc<InMemoryStore>) -> (TestServer, BackgroundServices) {
    create_memory_test_app_with_config(store, create_test_config())
}

pub fn create_memory_test_app_with_config(store: Arc<InMemoryStore>, config: Config) -> (TestServer, BackgroundServices) {
    let client = DeliveryClient::new(&config.delivery).expect("Failed to create delivery client");
    Application::with_store(config, store, client, None).into_test_server()
}
