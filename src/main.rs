mod shutdown;
mod startup;

use tracing::info;

#[tokio::main]
async fn main() -> miette::Result<()> {
    // Initialize logging
    startup::init_logging()?;

    info!("Starting showroom-sync");

    // Load configuration
    let config = startup::load_config().await?;

    // Start the components and wait for shutdown
    startup::run(config).await
}
