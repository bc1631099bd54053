//! HTTP service entry point

use pdf2md_server::config::{load_dotenv, log_filter_from_env};
use pdf2md_server::{server, AppEnv, ServiceConfig};
use std::process;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let dotenv = load_dotenv();

    // The subscriber goes up before the config is read so its warnings show
    let env = AppEnv::from_env();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_filter_from_env()))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(env.is_local())
        .with_target(!env.is_local())
        .init();

    dotenv.log();

    let config = match ServiceConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Configuration error: {}", e);
            process::exit(2);
        }
    };

    if let Err(e) = server::serve(config).await {
        log::error!("Server error: {}", e);
        process::exit(1);
    }
}
