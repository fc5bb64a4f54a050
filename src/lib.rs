pub mod config;
pub mod db;
pub mod geocode;
pub mod hours;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod planner;
pub mod retry;
pub mod scraping;
pub mod utils;

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` overrides the default `info`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
