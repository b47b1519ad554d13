//! Built-in tool adapters
//!
//! Each adapter wraps one external API and normalizes its response into a
//! `ToolOutput`:
//! - `serper`: web and news search
//! - `worker_search`: search results from the companion scraping worker
//! - `coingecko`: crypto prices
//! - `weather`: current weather
//! - `wikipedia`: article HTML and image list
//! - `web_scrape`: readable text of a public page

mod http;
mod coingecko;
mod serper;
mod weather;
mod web_scrape;
mod wikipedia;
mod worker_search;

pub use coingecko::CoinGeckoTool;
pub use serper::SerperSearchTool;
pub use weather::WeatherTool;
pub use web_scrape::WebScrapeTool;
pub use wikipedia::WikipediaContentTool;
pub use worker_search::{WorkerSearchTool, SCRAPER_WORKER_URL};

/// Environment variable names tools read their keys from
pub const SERPER_API_KEY: &str = "SERPER_API_KEY";
pub const OPENWEATHER_API_KEY: &str = "OPENWEATHER_API_KEY";
