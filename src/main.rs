use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;

use sg_events::config::ConfigStore;
use sg_events::db::Store;
use sg_events::geocode::NominatimGeocoder;
use sg_events::llm::LlmExtractor;
use sg_events::models::{Coordinates, EventStatus, ListingStatus};
use sg_events::pipeline::{self, Pipeline};
use sg_events::planner::{self, PlanRequest};
use sg_events::scraping::{self, HttpPageSource};
use sg_events::utils;

#[derive(Parser)]
#[command(name = "sg-events")]
#[command(about = "Scrape, moderate and plan Singapore events")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered listing sources
    Sources,

    /// Scrape listing pages and record new listings as pending
    Scrape {
        /// Only scrape this source id
        #[arg(long)]
        source: Option<String>,
    },

    /// Show listings, optionally by status
    Listings {
        #[arg(long)]
        status: Option<ListingStatus>,
    },

    /// Approve a pending listing for processing
    Approve { url: String },

    /// Reject a pending listing
    Reject { url: String },

    /// Send an errored listing back to approved
    Retry { url: String },

    /// Turn approved listings into events
    Process {
        /// Only process this listing
        #[arg(long)]
        url: Option<String>,
    },

    /// Show events, optionally by status
    Events {
        #[arg(long)]
        status: Option<EventStatus>,
    },

    /// Moderate a single event
    Event {
        #[command(subcommand)]
        action: EventAction,
    },

    /// Expire events whose dates have passed
    Expire,

    /// Events open at a given date and time
    Plan {
        /// ISO date, defaults to today in Singapore
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Start time, HH:MM
        #[arg(long)]
        time: String,
        #[arg(long, requires = "lng")]
        lat: Option<f64>,
        #[arg(long, requires = "lat")]
        lng: Option<f64>,
        /// Category id; repeat for several
        #[arg(long = "category")]
        categories: Vec<i64>,
    },

    /// Inspect or change stored configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum EventAction {
    Approve { id: String },
    Delete { id: String },
}

#[derive(Subcommand)]
enum ConfigAction {
    Show,
    Set { key: String, value: String },
}

#[derive(Serialize)]
struct ScrapeReport {
    scraped: usize,
    inserted: usize,
}

fn output<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    sg_events::init_tracing();
    let cli = Cli::parse();
    let config_store = ConfigStore::load();

    match cli.command {
        Commands::Sources => output(&scraping::list_sources()),
        Commands::Scrape { source } => cmd_scrape(&config_store, source).await,
        Commands::Listings { status } => {
            let store = open_store(&config_store)?;
            output(&store.list_listings(status)?)
        }
        Commands::Approve { url } => transition(&config_store, &url, ListingStatus::Approved),
        Commands::Reject { url } => transition(&config_store, &url, ListingStatus::Rejected),
        Commands::Retry { url } => {
            let store = open_store(&config_store)?;
            output(&store.retry_listing(&url)?)
        }
        Commands::Process { url } => cmd_process(&config_store, url).await,
        Commands::Events { status } => {
            let store = open_store(&config_store)?;
            output(&store.list_events(status)?)
        }
        Commands::Event { action } => {
            let store = open_store(&config_store)?;
            match action {
                EventAction::Approve { id } => {
                    output(&store.set_event_status(&id, EventStatus::Approved)?)
                }
                EventAction::Delete { id } => {
                    let deleted = store.delete_event(&id)?;
                    anyhow::ensure!(deleted, "no event with id {id}");
                    output(&serde_json::json!({ "deleted": id }))
                }
            }
        }
        Commands::Expire => {
            let store = open_store(&config_store)?;
            let expired = store.expire_events(utils::today())?;
            output(&serde_json::json!({ "expired": expired }))
        }
        Commands::Plan {
            date,
            time,
            lat,
            lng,
            categories,
        } => {
            let store = open_store(&config_store)?;
            let events = store.list_events(Some(EventStatus::Approved))?;
            let request = PlanRequest {
                date: date.unwrap_or_else(utils::today),
                start_time: time,
                origin: lat.zip(lng).map(|(latitude, longitude)| Coordinates {
                    latitude,
                    longitude,
                }),
                categories,
            };
            output(&planner::candidates(&events, &request))
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => output(&config_store.read().redacted()),
            ConfigAction::Set { key, value } => {
                let updated = config_store
                    .update(|config| config.set(&key, &value))
                    .map_err(anyhow::Error::msg)?;
                output(&updated.redacted())
            }
        },
    }
}

fn open_store(config_store: &ConfigStore) -> Result<Store> {
    let path = config_store.read().database_path();
    Store::open(&path).with_context(|| format!("failed to open database {}", path.display()))
}

fn transition(config_store: &ConfigStore, url: &str, next: ListingStatus) -> Result<()> {
    let store = open_store(config_store)?;
    let listing = store.transition_listing(url, next, None)?;
    output(&listing)
}

async fn cmd_scrape(config_store: &ConfigStore, source: Option<String>) -> Result<()> {
    let listings = tokio::task::spawn_blocking(move || match source {
        Some(id) => scraping::run_single(&id),
        None => scraping::run_all(),
    })
    .await
    .context("scrape task failed")??;

    let store = open_store(config_store)?;
    let inserted = pipeline::record_listings(&store, &listings)?;
    output(&ScrapeReport {
        scraped: listings.len(),
        inserted,
    })
}

async fn cmd_process(config_store: &ConfigStore, url: Option<String>) -> Result<()> {
    let config = config_store.read();
    let store = open_store(config_store)?;
    let pages = HttpPageSource;
    let extractor = LlmExtractor::from_config(&config);
    let geocoder = NominatimGeocoder::new(&config.geocoder_endpoint, &config.user_agent)?;

    let pipeline = Pipeline::new(&store, &pages, &extractor, &geocoder)
        .with_retry(config.retry_policy())
        .with_item_delay(config.item_delay());

    match url {
        Some(url) => output(&pipeline.process_listing(&url).await?),
        None => output(&pipeline.process_approved().await?),
    }
}
