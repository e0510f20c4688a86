use crate::shutdown;
use showroom_sync::components::change_hub::hub_from_config;
use showroom_sync::components::event_store::EventStore;
use showroom_sync::components::ComponentManager;
use showroom_sync::config::Config;
use showroom_sync::error::Error;
use std::sync::Arc;
use tokio::sync::{oneshot, RwLock};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Initialize logging with environment-based configuration
pub fn init_logging() -> miette::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,reqwest=warn,hyper=warn")),
        )
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| Error::Other(format!("Failed to set up logging: {}", e)))?;

    Ok(())
}

/// Load and initialize the application config
pub async fn load_config() -> miette::Result<Arc<RwLock<Config>>> {
    match Config::load() {
        Ok(config) => {
            rust_i18n::set_locale(&config.bot_locale);
            info!("Using locale {}", config.bot_locale);
            Ok(Arc::new(RwLock::new(config)))
        }
        Err(e) => {
            error!("Failed to load configuration: {:?}", e);
            Err(e.into())
        }
    }
}

/// Start every component and keep running until a shutdown signal arrives
pub async fn run(config: Arc<RwLock<Config>>) -> miette::Result<()> {
    let hub = {
        let config_read = config.read().await;
        hub_from_config(&config_read)?
    };

    // Initialize component manager
    let mut component_manager = ComponentManager::new(Arc::clone(&config));

    // Register event store component
    component_manager.register(EventStore::new());

    // Create a shared component manager
    let component_manager = Arc::new(component_manager);

    component_manager.init_all(hub.clone()).await?;

    // Create shutdown channel
    let (shutdown_send, shutdown_recv) = oneshot::channel();

    // Spawn signal handler task
    let shutdown_components = Arc::clone(&component_manager);
    let shutdown_hub = hub.clone();
    tokio::spawn(async move {
        shutdown::handle_signals(shutdown_send, shutdown_components, shutdown_hub).await;
    });

    info!("Listening for changes on {:?}", hub.active_topics());

    if shutdown_recv.await.is_err() {
        error!("Signal handler stopped unexpectedly");
    }
    info!("Shutdown complete");
    Ok(())
}
