use std::sync::Arc;

use anyhow::{bail, Context, Result};
use dotenvy::dotenv;
use log::{error, info, warn};

use okrserver::api::build_router;
use okrserver::auth::TokenService;
use okrserver::config::AppConfig;
use okrserver::core::shared::{create_pool, run_migrations, DbPool};
use okrserver::okr::{MemoryStore, PgStore, Store};
use okrserver::AppState;

const USAGE: &str = "usage: okrserver [serve | migrate | issue-token <subject> [privilege...]]";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = AppConfig::load().context("Failed to load configuration")?;

    match args.first().map(String::as_str) {
        None | Some("serve") => serve(config).await,
        Some("migrate") => migrate(&config),
        Some("issue-token") => issue_token(&config, &args[1..]),
        Some("--help") | Some("-h") => {
            println!("{USAGE}");
            Ok(())
        }
        Some(other) => {
            eprintln!("{USAGE}");
            bail!("Unknown command: {other}")
        }
    }
}

fn connect(config: &AppConfig, url: &str) -> Result<DbPool> {
    let pool = create_pool(url, config.database.max_connections)
        .context("Failed to create database pool")?;
    if config.database.run_migrations {
        let applied = run_migrations(&pool).context("Failed to run migrations")?;
        info!("Database ready ({applied} migrations applied)");
    }
    Ok(pool)
}

fn migrate(config: &AppConfig) -> Result<()> {
    let Some(url) = config.database_url() else {
        bail!("database.url (or DATABASE_URL) is required for migrate");
    };
    let pool = create_pool(&url, 1).context("Failed to create database pool")?;
    let applied = run_migrations(&pool).context("Failed to run migrations")?;
    info!("Applied {applied} pending migrations");
    Ok(())
}

fn issue_token(config: &AppConfig, args: &[String]) -> Result<()> {
    let Some((subject, privileges)) = args.split_first() else {
        bail!("{USAGE}");
    };
    if config.auth.jwt_secret.is_none() {
        bail!("auth.jwt_secret must be set to issue tokens the server will accept");
    }
    let tokens = TokenService::from_config(&config.auth)?;
    println!("{}", tokens.issue(subject, privileges)?);
    Ok(())
}

async fn serve(config: AppConfig) -> Result<()> {
    let store = match config.database_url() {
        Some(url) => {
            let pool = {
                let config = config.clone();
                tokio::task::spawn_blocking(move || connect(&config, &url)).await??
            };
            Store::Postgres(PgStore::new(pool))
        }
        None => {
            warn!("No database configured, using the in-memory store; data is lost on exit");
            Store::Memory(MemoryStore::new())
        }
    };
    info!("Using {} store", store.backend_name());

    let tokens = TokenService::from_config(&config.auth)?;
    if let Some(token) = tokens.bootstrap_token()? {
        warn!("Tokens are only valid until this process exits; set auth.jwt_secret to keep them");
        println!("Bootstrap token: {token}");
    }
    let addr = config.bind_address();
    let state = Arc::new(AppState::new(store, tokens, config));
    let app = build_router(state);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {addr}: {e}");
            return Err(e.into());
        }
    };
    info!("HTTP server listening on {addr}");
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, draining connections");
}
