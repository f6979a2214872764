use axum::Router;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fondo::config::Config;
use fondo::db::{create_pool, init_db, AppState};
use fondo::handlers;
use fondo::payments::ProviderSet;
use fondo::reconcile::{self, SweepPolicy};

#[derive(Parser, Debug)]
#[command(name = "fondo")]
#[command(about = "Sales and payment reconciliation backend for numbered wallpaper drops")]
struct Cli {
    /// Run a single reconciliation sweep and exit (operational recovery
    /// tool; the server runs the sweep on its own schedule)
    #[arg(long)]
    sweep_once: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fondo=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    let pool = create_pool(&config.database_path).expect("Failed to create database pool");
    {
        let conn = pool.get().expect("Failed to get database connection");
        init_db(&conn).expect("Failed to initialize schema");
    }

    let state = AppState {
        db: pool,
        providers: ProviderSet::new(&config),
        pricing: config.pricing.clone(),
        base_url: config.base_url.clone(),
        redirect_url: config.redirect_url.clone(),
    };

    if cli.sweep_once {
        let policy = SweepPolicy::from(&config.sweep);
        match reconcile::run_sweep(&state.db, &state.providers, &policy).await {
            Ok(summary) => {
                println!(
                    "sweep finished: scanned={} transitioned={} errors={}",
                    summary.scanned,
                    summary.transitioned,
                    summary.errors.len()
                );
                for err in &summary.errors {
                    println!("  {}: {}", err.purchase_id, err.error);
                }
            }
            Err(e) => {
                eprintln!("sweep failed: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    if config.dev_mode {
        tracing::info!("Running in dev mode");
    }

    // Background reconciliation: the pull-based safety net for purchases
    // whose webhooks never arrive.
    reconcile::spawn_sweep_task(state.clone(), &config.sweep);

    let app = Router::new()
        .merge(handlers::public::router())
        .merge(handlers::webhooks::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Fondo server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Failed to start server");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
