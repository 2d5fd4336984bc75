mod app;
mod composer;
mod config;
mod db;
mod error;
mod gateway;
mod ranking;
mod session;
mod shell;
mod utils;
mod votes;

pub use app::AppController;
pub use composer::{ApartmentDraft, SubmitOutcome, Wall};
pub use config::AppConfig;
pub use db::{ApartmentChoice, ApartmentListing, Database, VoteRecord};
pub use error::ValidationError;
pub use gateway::{ApartmentGateway, ChangeFeed, ListingSnapshot, SqliteGateway, Subscription};
pub use ranking::{rank, render_lines, RankedApartment};
pub use session::{email_is_valid, validate_email, SessionStore, Voter};
pub use votes::{
    EngineEvent, PendingToggle, ToggleOutcome, ToggleRejection, VoteEngine, VoteSnapshot, VoteState,
};

use anyhow::{Context, Result};

pub fn run() -> Result<()> {
    let config = AppConfig::load();
    utils::logging::init_logging(config.verbose);

    log::info!("aptvote starting up...");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;

    runtime.block_on(serve(config))
}

async fn serve(config: AppConfig) -> Result<()> {
    let mut app = AppController::open(&config)?;

    // Pick up where a restored session left off.
    if app.voter().is_some_and(|voter| voter.apartment.is_some()) {
        if let Err(err) = app.open_ranking().await {
            log::warn!("Could not reopen the ranking: {err:#}");
        }
    }

    shell::run(&mut app).await
}
