use crate::commands::CommandContext;
use crate::components::GoogleCalendar;
use crate::config::Config;
use crate::error::Error;
use crate::{server, shutdown};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Initialize logging with environment-based configuration.
///
/// Logs go to stderr, stdout belongs to the tool protocol.
pub fn init_logging() -> miette::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,reqwest=warn,hyper=warn")),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| Error::Other(format!("Failed to set up logging: {}", e)))?;

    Ok(())
}

/// Load and initialize the application config
pub async fn load_config() -> miette::Result<Arc<RwLock<Config>>> {
    match Config::load() {
        Ok(config) => Ok(Arc::new(RwLock::new(config))),
        Err(e) => {
            error!("Failed to load configuration: {:?}", e);
            Err(e.into())
        }
    }
}

/// Build the calendar tools and serve them on stdio
pub async fn start_server(config: Arc<RwLock<Config>>) -> miette::Result<()> {
    let calendar = GoogleCalendar::from_config(config).await;
    info!("Using calendar {}", calendar.calendar_id());

    let ctx = CommandContext::new(calendar);

    // Wait for either the input to end or a shutdown signal
    tokio::select! {
        result = server::serve_stdio(ctx) => {
            info!("Tool server ended");
            result.map_err(Into::into)
        }
        _ = shutdown::wait_for_signal() => {
            info!("Received shutdown signal, shutting down...");
            Ok(())
        }
    }
}
