use std::sync::Arc;

use cdattg::attendance::SystemClock;
use cdattg::{settings, storage, web};
use clap::Parser;
use miette::Result;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "cdattg",
    version,
    about = "Attendance and authorization service for a training center back-office"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    // load settings
    let settings = settings::Settings::load(&cli.config)?;
    tracing::info!(
        host = %settings.server.host,
        port = settings.server.port,
        reports_dir = %settings.attendance.reports_dir.display(),
        "Loaded configuration"
    );
    if settings.auth.token_secret == settings::Auth::default().token_secret {
        tracing::warn!("auth.token_secret is the built-in default; set CDATTG__AUTH__TOKEN_SECRET");
    }

    // init storage (database)
    let db = storage::init(&settings.database).await?;

    // enforcer, hub and attendance service
    let state = web::AppState::build(settings, db, Arc::new(SystemClock)).await?;

    // start web server
    web::serve(state).await?;
    Ok(())
}
