use std::process::ExitCode;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};

use keyward::config::init_config;
use keyward::engine::{EngineSettings, LifecycleEngine};
use keyward::server::{authorizer_from_config, build_router, AppState};
use keyward::store::Database;

#[cfg(feature = "background-jobs")]
use keyward::jobs::{JobConfig, JobScheduler};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("fatal: {e}");
            eprintln!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = init_config()?;

    let level = config
        .logging
        .level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();

    info!(version = env!("CARGO_PKG_VERSION"), "keyward server starting");

    let db = Database::new().await?;
    db.migrate().await?;
    info!(backend = db.backend_name(), "database ready");

    let engine = Arc::new(LifecycleEngine::new(
        Arc::clone(&db),
        EngineSettings::from(&config.engine),
    ));

    // Scheduler handle must stay alive for the lifetime of the server.
    #[cfg(feature = "background-jobs")]
    let _scheduler = if config.jobs.enabled {
        let job_config = JobConfig {
            auto_check_cron: config.jobs.auto_check_cron.clone(),
        };
        let scheduler = JobScheduler::new(Arc::clone(&engine), job_config).await?;
        scheduler.start().await?;
        info!(cron = %config.jobs.auto_check_cron, "auto-check job scheduled");
        Some(scheduler)
    } else {
        info!("background jobs disabled by configuration");
        None
    };

    let state = AppState {
        engine,
        db,
        authorizer: authorizer_from_config(&config.admin),
    };
    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("listening on http://{addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
