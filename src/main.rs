use axum::{Router, routing};
use jekyll_hook::error::HookError;
use jekyll_hook::handlers::{handle_hook, root};
use jekyll_hook::notify::Notifier;
use jekyll_hook::queue::TaskQueue;
use jekyll_hook::{AppState, Config, logging, pipeline};
use std::fs;
use std::sync::Arc;
use tracing::{error, info};

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";
const DEFAULT_CONFIG_PATH: &str = "jekyll_hook.toml";

/// Load and parse the configuration file
fn load_config(path: &str) -> Result<Config, HookError> {
    let config_str = fs::read_to_string(path).map_err(|e| {
        HookError::Config(format!("Failed to read config file '{}': {}", path, e))
    })?;

    let config: Config = toml::from_str(&config_str).map_err(|e| {
        HookError::Config(format!("Failed to parse config file '{}': {}", path, e))
    })?;

    Ok(config)
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let bind_address =
        std::env::var("BIND_ADDRESS").unwrap_or_else(|_| DEFAULT_BIND_ADDRESS.to_string());
    let config_path =
        std::env::var("JEKYLL_HOOK_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    let config: Config = match load_config(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Keep the guard alive; dropping it stops the file-log writer.
    let _log_guard = match logging::init(config.log_dir.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to set up logging: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let config = Arc::new(config);

    let notifier = match Notifier::from_config(config.clone()) {
        Ok(notifier) => Arc::new(notifier),
        Err(e) => {
            error!("Email configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // The queue workers own pipeline execution; with the default single
    // worker every admitted event runs to completion before the next starts.
    let worker_config = config.clone();
    let queue = TaskQueue::start(config.workers, move |task| {
        let config = worker_config.clone();
        let notifier = notifier.clone();
        async move { pipeline::process(task, &config, &notifier).await }
    });

    let state = Arc::new(AppState {
        config: config.clone(),
        queue,
    });

    let app = Router::new()
        .route("/", routing::get(root))
        .route("/hooks/jekyll/{branch}", routing::post(handle_hook))
        .with_state(state);

    info!("Listening on {}", bind_address);
    info!("Using config at {:?}", config_path);
    let listener = tokio::net::TcpListener::bind(bind_address).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
