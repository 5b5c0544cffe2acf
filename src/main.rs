use dotenvy::dotenv;
use home_unit_calc::{config, context::AppContext, errors::Result, storage::Backend};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();
    info!("Attempted to load .env file.");

    // 3. Load the application configuration
    let app_config = config::load_app_configuration()
        .inspect_err(|e| error!("Critical error loading application configuration: {}", e))?;
    info!("Successfully processed application configuration.");

    // 4. Open the database and resolve the settings key
    let ctx = AppContext::bootstrap(app_config)
        .await
        .inspect(|_| info!("Application context ready."))
        .inspect_err(|e| error!("Failed to initialize application context: {}", e))?;

    // 5. Report what is stored
    match ctx.latest_period(Backend::Local).await? {
        Some(period) => info!("Latest calculation in the local database: {}", period),
        None => info!("No calculations stored in the local database yet."),
    }
    match ctx.settings.remote_credentials().await? {
        Some(creds) => info!("Remote store configured at {}", creds.url),
        None => warn!("Remote store is not configured; only CSV and local saves are available."),
    }

    Ok(())
}
