use calendar_mcp::startup;
use tracing::info;

#[tokio::main]
async fn main() -> miette::Result<()> {
    // Initialize logging
    startup::init_logging()?;

    info!("Starting calendar tool server");

    // Load configuration
    let config = startup::load_config().await?;

    // Serve until stdin closes or a signal arrives
    startup::start_server(config).await
}
