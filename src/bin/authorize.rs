use calendar_mcp::components::google_calendar::{HandleProvider, SessionManager};
use calendar_mcp::config::Config;
use calendar_mcp::error::other_error;
use calendar_mcp::startup;
use std::sync::Arc;
use tokio::sync::RwLock;

#[tokio::main]
async fn main() -> miette::Result<()> {
    startup::init_logging()?;

    // Load configuration
    let config = Config::load()?;
    let token_path = config.token_path.clone();
    let config = Arc::new(RwLock::new(config));

    // Reuses a stored token when possible, otherwise runs the consent flow
    let session = SessionManager::new(config).await;
    if session.get_handle().await.is_none() {
        return Err(
            other_error("Google Calendar authorization failed, see the log for details").into(),
        );
    }

    println!("Token saved to {}", token_path.display());

    Ok(())
}
