use tracing::{error, info, warn};

use packrat::{Config, UploadStore, WebServer};

#[tokio::main]
async fn main() {
    // Load configuration
    let config = match Config::load_with_env("config.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config.toml: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Initialize logging
    if let Err(e) = packrat::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        packrat::logging::init_console_only(&config.logging.level);
    }

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    info!("packrat - upload ingestion and compaction engine");

    let store = match UploadStore::open(&config.storage.uploads_path) {
        Ok(store) => store.with_limits(
            config.storage.folder_size_ceiling_bytes,
            config.storage.preview_max_bytes,
        ),
        Err(e) => {
            error!(
                "Failed to open uploads root {}: {}",
                config.storage.uploads_path, e
            );
            std::process::exit(1);
        }
    };
    info!("Uploads root: {}", store.root().display());

    if config.storage.compact_on_startup {
        let sweep_store = store.clone();
        match tokio::task::spawn_blocking(move || sweep_store.compact_all()).await {
            Ok(Ok(report)) => info!(
                compacted = report.compacted_count(),
                errors = report.error_count(),
                "Startup compaction finished"
            ),
            Ok(Err(e)) => warn!("Startup compaction failed: {}", e),
            Err(e) => warn!("Startup compaction task failed: {}", e),
        }
    }

    let server = match WebServer::new(
        &config.server,
        &config.web,
        store,
        config.storage.max_upload_size_mb,
    ) {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to configure web server: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run().await {
        error!("Web server error: {}", e);
        std::process::exit(1);
    }
}
