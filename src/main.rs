// src/main.rs
mod accrual;
mod api;
mod auth;
mod config;
mod db;
mod error;
mod market;
mod models;
mod plans;
mod portfolio;
mod trading;
mod watchlist;
mod websocket;

use crate::config::Config;
use crate::market::MarketFeed;
use env_logger::Builder;
use log::{error, info, LevelFilter};
use reqwest::Client;
use std::sync::Arc;
use tokio::task;
use warp::Filter;

#[tokio::main]
async fn main() {
    let mut logger = Builder::new();
    logger.filter_level(LevelFilter::Info).format_timestamp_secs();
    if let Ok(filters) = std::env::var("RUST_LOG") {
        logger.parse_filters(&filters);
    }
    logger.init();

    let config = match Config::from_env() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return;
        }
    };

    let session = match db::init(&config.scylla_node).await {
        Ok(session) => Arc::new(session),
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            return;
        }
    };
    info!("Starting the trade-pro service...");

    let feed = MarketFeed::start(market::seed_assets(), config.tick_interval);

    let ws_feed = feed.clone();
    let ws_addr = config.ws_addr;
    task::spawn(async move {
        if let Err(e) = websocket::serve(ws_addr, ws_feed).await {
            error!("Price stream stopped: {}", e);
        }
    });

    task::spawn(accrual::run(session.clone(), config.accrual_interval));

    let api = api::routes(session, feed, config.clone(), Client::new()).recover(error::recover);

    info!("Server running on http://{}", config.http_addr);
    warp::serve(api).run(config.http_addr).await;
}
