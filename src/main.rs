#![forbid(unsafe_code)]
#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

mod bot;
mod cli;
mod config;
mod db;
mod discord;
mod meetup;
mod utils;

use cli::Cli;
use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli)?;
    utils::logging::init_tracing(&config.logging);
    info!("meetup discord bot starting up");

    let db_manager = db::DatabaseManager::new(&config.database).await?;
    db_manager.migrate().await?;
    let room_store = db_manager.room_store();
    info!(
        "settings store opened path={} rooms={}",
        db_manager.sqlite_path(),
        room_store.count_rooms().await?
    );

    let meetup_client = Arc::new(meetup::MeetupClient::new(&config.meetup)?);
    let discord_client = Arc::new(discord::DiscordClient::new(&config));

    let bot = Arc::new(bot::BotCore::new(
        room_store,
        meetup_client,
        discord_client.clone(),
        config.meetup.events_page_size,
    ));
    discord_client.set_bot(bot).await;

    discord_client.start().await?;
    info!("meetup discord bot is running, press ctrl-c to exit");

    tokio::signal::ctrl_c().await?;
    info!("meetup discord bot shutting down");
    discord_client.stop().await?;
    Ok(())
}
