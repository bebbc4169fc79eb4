//! vss-server: entry point for the versioned storage service.
//!
//! Loads config, opens the record store and the authorizer, wires the
//! engine behind the HTTP service, then serves until Ctrl+C.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use vss_auth::{Authorizer, JwtAuthorizer, NoopAuthorizer};
use vss_config::{Backend, ServiceConfig};
use vss_http::VssService;
use vss_kv::KvEngine;
use vss_postgres::{PoolConfig, PostgresStore};
use vss_storage::{MemoryStore, RecordStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    vss_metrics::init_tracing();

    // First CLI arg is the YAML config path; defaults apply without one.
    let config_path = std::env::args().nth(1);
    let config = ServiceConfig::load(config_path.as_deref().map(Path::new))?;

    let store: Arc<dyn RecordStore> = match config.backend {
        Backend::Memory => {
            tracing::warn!("using the in-memory backend; data will not survive a restart");
            Arc::new(MemoryStore::new())
        }
        Backend::Postgres => {
            let db = &config.database;
            let store = PostgresStore::connect(&PoolConfig {
                host: db.host.clone(),
                port: db.port,
                username: db.username.clone(),
                password: db.password.clone(),
                database: db.database.clone(),
                max_pool_size: db.max_pool_size,
                min_idle: db.min_idle,
                acquire_timeout_ms: db.connection_timeout_ms,
                idle_timeout_ms: db.idle_timeout_ms,
                max_lifetime_ms: db.max_lifetime_ms,
                statement_cache_size: db.statement_cache_size,
            })
            .await?;
            store.init_schema().await?;
            Arc::new(store)
        }
    };

    let engine = Arc::new(KvEngine::new(store));

    let authorizer: Arc<dyn Authorizer> = match &config.auth.jwt_rsa_pem_path {
        Some(path) => {
            let pem = std::fs::read(path)?;
            tracing::info!("JWT authorization enabled (key: {})", path.display());
            Arc::new(JwtAuthorizer::from_rsa_pem(&pem)?)
        }
        None => {
            tracing::warn!("no JWT key configured, accepting every request as a single user");
            Arc::new(NoopAuthorizer)
        }
    };

    let service = VssService::new(engine, authorizer, config.http.max_body_bytes);

    // Prometheus scrape endpoint, if configured.
    if let Some(metrics_port) = config.metrics_port {
        let metrics_addr: SocketAddr = format!("0.0.0.0:{}", metrics_port)
            .parse()
            .expect("valid metrics address");
        let metrics_listener = tokio::net::TcpListener::bind(metrics_addr).await?;
        tokio::spawn(async move {
            if let Err(e) = vss_metrics::serve_metrics(metrics_listener).await {
                tracing::warn!("metrics server failed: {}", e);
            }
        });
    }

    let listener = tokio::net::TcpListener::bind(config.listen).await?;
    tracing::info!("serving VSS endpoints on http://{}/vss", config.listen);

    // Serve with graceful shutdown on Ctrl+C; the pool drains on drop.
    tokio::select! {
        result = vss_http::serve(listener, service) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
