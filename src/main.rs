use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use std::time::Duration;

use storefront::config::Config;
use storefront::crypto::hash_password;
use storefront::db::{AppState, create_pool, init_db, queries};
use storefront::fulfillment::recover_unpropagated;
use storefront::handlers;
use storefront::models::{CreateProduct, price_to_cents};

#[derive(Parser, Debug)]
#[command(name = "storefront")]
#[command(about = "Game storefront with exactly-once order fulfillment")]
struct Cli {
    /// Seed the catalog and a dev admin account (dev mode only)
    #[arg(long)]
    seed: bool,

    /// Re-grant entitlements for unpropagated ledger entries, then exit
    #[arg(long)]
    reconcile: bool,
}

/// Create the first admin account from BOOTSTRAP_ADMIN_* if no accounts exist.
fn bootstrap_admin(state: &AppState, email: &str, password: &str) -> Result<(), String> {
    let conn = state.db.get().map_err(|e| e.to_string())?;
    if queries::count_accounts(&conn).map_err(|e| e.to_string())? > 0 {
        tracing::info!("Accounts already exist, skipping admin bootstrap");
        return Ok(());
    }
    let hash = hash_password(password).map_err(|e| e.to_string())?;
    let account = queries::create_account(&conn, email, &hash, true).map_err(|e| e.to_string())?;
    tracing::info!("Bootstrap admin created: {} ({})", account.email, account.id);
    Ok(())
}

/// Seeds a small catalog and an admin for local development.
fn seed_dev_data(state: &AppState) -> Result<(), String> {
    let conn = state.db.get().map_err(|e| e.to_string())?;
    if queries::count_accounts(&conn).map_err(|e| e.to_string())? > 0 {
        tracing::info!("Database already has data, skipping seed");
        return Ok(());
    }

    let hash = hash_password("devpassword").map_err(|e| e.to_string())?;
    let admin = queries::create_account(&conn, "admin@storefront.local", &hash, true)
        .map_err(|e| e.to_string())?;

    let catalog = [
        ("halo", "Halo Infinite", 59.99, "Shooter", true),
        ("celeste", "Celeste", 19.99, "Platformer", false),
        ("hades", "Hades", 24.99, "Roguelike", true),
        ("stardew", "Stardew Valley", 14.99, "Simulation", false),
    ];
    for (id, title, price, category, is_trending) in catalog {
        let input = CreateProduct {
            id: Some(id.to_string()),
            title: title.to_string(),
            description: String::new(),
            price,
            category: category.to_string(),
            is_trending,
            release_date: None,
            stock: 999,
        };
        let cents = price_to_cents(price).ok_or_else(|| format!("Invalid seed price for {}", id))?;
        queries::create_product(&conn, &input, cents).map_err(|e| e.to_string())?;
    }

    tracing::info!("============================================");
    tracing::info!("SEEDED DEV DATA");
    tracing::info!("Admin: {} / devpassword", admin.email);
    tracing::info!("Games: {}", catalog.len());
    tracing::info!("============================================");
    Ok(())
}

/// Periodic sweep: entitlement recovery, expired sessions, abandoned intents.
fn spawn_cleanup_task(state: AppState, intent_retention_days: i64) {
    tokio::spawn(async move {
        let interval = Duration::from_secs(5 * 60);

        loop {
            tokio::time::sleep(interval).await;

            if let Err(e) = recover_unpropagated(&state).await {
                tracing::warn!("Entitlement recovery failed: {}", e);
            }

            match state.db.get() {
                Ok(conn) => {
                    match queries::purge_expired_auth_sessions(&conn) {
                        Ok(count) if count > 0 => {
                            tracing::debug!("Purged {} expired sessions", count)
                        }
                        Ok(_) => {}
                        Err(e) => tracing::warn!("Failed to purge sessions: {}", e),
                    }

                    let cutoff = chrono::Utc::now().timestamp() - intent_retention_days * 86400;
                    match queries::purge_abandoned_checkout_intents(&conn, cutoff) {
                        Ok(count) if count > 0 => {
                            tracing::debug!("Purged {} abandoned checkout intents", count)
                        }
                        Ok(_) => {}
                        Err(e) => tracing::warn!("Failed to purge checkout intents: {}", e),
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to get db connection for cleanup: {}", e);
                }
            }
        }
    });

    tracing::info!("Background cleanup task started (runs every 5 minutes)");
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "storefront=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if config.stripe.secret_key.is_empty() {
        tracing::warn!("STRIPE_SECRET_KEY not set; checkout will fail");
    }
    if config.stripe.webhook_secret.is_empty() {
        tracing::warn!("STRIPE_WEBHOOK_SECRET not set; every webhook will be rejected");
    }

    let pool = match create_pool(&config.database_path) {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("Failed to create database pool: {}", e);
            std::process::exit(1);
        }
    };

    match pool.get() {
        Ok(conn) => {
            if let Err(e) = init_db(&conn) {
                tracing::error!("Failed to initialize database: {}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            tracing::error!("Failed to get db connection: {}", e);
            std::process::exit(1);
        }
    }

    let state = AppState::new(pool, &config);

    // Finish any fulfillment interrupted by a previous crash before serving
    match recover_unpropagated(&state).await {
        Ok(report) if cli.reconcile => {
            tracing::info!(
                "Reconcile complete: {} scanned, {} repaired, {} failed",
                report.scanned,
                report.repaired,
                report.failed
            );
            std::process::exit(if report.failed > 0 { 1 } else { 0 });
        }
        Ok(_) => {}
        Err(e) => {
            tracing::error!("Startup entitlement recovery failed: {}", e);
            if cli.reconcile {
                std::process::exit(1);
            }
        }
    }

    if cli.seed {
        if !config.dev_mode {
            tracing::warn!("--seed flag ignored: not in dev mode (set STOREFRONT_ENV=dev)");
        } else if let Err(e) = seed_dev_data(&state) {
            tracing::error!("Failed to seed dev data: {}", e);
        }
    }

    if let (Some(email), Some(password)) = (
        config.bootstrap_admin_email.as_deref(),
        config.bootstrap_admin_password.as_deref(),
    ) && let Err(e) = bootstrap_admin(&state, email, password)
    {
        tracing::error!("Failed to bootstrap admin: {}", e);
    }

    spawn_cleanup_task(state.clone(), config.intent_retention_days);

    let app = handlers::app(state, config.rate_limit);

    let addr = config.addr();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Storefront listening on {}", addr);

    // Connect info is required for per-IP rate limiting
    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    {
        tracing::error!("Server error: {}", e);
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, stopping server...");
}
