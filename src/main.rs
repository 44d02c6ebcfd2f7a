use std::sync::Arc;

use actix_web::{middleware, web, App, HttpServer};

use patchwright::clients::{AnthropicCompleter, GithubApp, HttpJobRunner};
use patchwright::config;
use patchwright::db;
use patchwright::routes;
use patchwright::services::{EntitlementResolver, PgAccountStore, PgUsageStore};
use patchwright::state::AppState;

/// Largest webhook payload accepted (GitHub caps deliveries at 25 MB)
const MAX_WEBHOOK_BYTES: usize = 25 * 1024 * 1024;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = config::Config::from_env().map_err(|e| {
        log::error!("Configuration error: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    log::info!("Starting Patchwright on {}:{}", config.host, config.port);

    let db_pool = db::create_pool(&config.database).await.map_err(|e| {
        log::error!("Database pool error: {}", e);
        std::io::Error::other(e.to_string())
    })?;

    db::run_migrations(&db_pool).await.map_err(|e| {
        log::error!("Migration error: {}", e);
        std::io::Error::other(e.to_string())
    })?;

    let github = Arc::new(GithubApp::new(&config.github).map_err(|e| {
        log::error!("GitHub App setup failed: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?);
    let jobs = HttpJobRunner::new(&config.job_runner).map_err(|e| {
        log::error!("Job runner setup failed: {}", e);
        std::io::Error::other(e.to_string())
    })?;
    let llm = AnthropicCompleter::new(&config.llm).map_err(|e| {
        log::error!("LLM client setup failed: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    if config.github.webhook_secret.is_none() {
        log::warn!("GITHUB_WEBHOOK_SECRET not set, webhook signatures will not be verified");
    }

    let entitlements = EntitlementResolver::new(
        Arc::new(PgAccountStore::new(db_pool.clone())),
        github.clone(),
    );

    let state = AppState {
        pool: db_pool.clone(),
        webhook_secret: config.github.webhook_secret.clone(),
        workflow: config.workflow.clone(),
        vcs: github,
        jobs: Arc::new(jobs),
        llm: Arc::new(llm),
        usage: Arc::new(PgUsageStore::new(db_pool)),
        entitlements: Arc::new(entitlements),
    };

    let host = config.host.clone();
    let port = config.port;

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .app_data(web::PayloadConfig::new(MAX_WEBHOOK_BYTES))
            .wrap(middleware::Logger::default())
            .configure(routes::health::configure)
            .configure(routes::webhooks::configure)
    })
    .bind((host.as_str(), port))?
    .shutdown_timeout(30)
    .run();

    let server_handle = server.handle();
    tokio::spawn(async move {
        shutdown_signal().await;
        log::info!("Shutdown signal received, stopping server...");
        server_handle.stop(true).await;
    });

    server.await
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
