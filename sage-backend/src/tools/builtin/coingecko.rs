//! CoinGecko price lookup
//!
//! The query is a coin id or a common ticker ("btc", "bitcoin").

use super::http::{param_str, send_json};
use crate::error::ToolError;
use crate::tools::registry::Tool;
use crate::tools::types::{ToolContext, ToolDefinition, ToolName, ToolOutput};
use async_trait::async_trait;
use serde_json::{json, Value};

const DEFAULT_BASE_URL: &str = "https://api.coingecko.com/api/v3";

/// Tickers users type that differ from CoinGecko ids
const TICKER_ALIASES: &[(&str, &str)] = &[
    ("btc", "bitcoin"),
    ("eth", "ethereum"),
    ("sol", "solana"),
    ("ada", "cardano"),
    ("doge", "dogecoin"),
    ("xrp", "ripple"),
    ("dot", "polkadot"),
    ("ltc", "litecoin"),
    ("usdc", "usd-coin"),
    ("usdt", "tether"),
    ("bnb", "binancecoin"),
    ("matic", "matic-network"),
    ("avax", "avalanche-2"),
];

fn coin_id(query: &str) -> String {
    let normalized = query.trim().to_lowercase().replace(' ', "-");
    TICKER_ALIASES
        .iter()
        .find(|(ticker, _)| *ticker == normalized)
        .map(|(_, id)| id.to_string())
        .unwrap_or(normalized)
}

pub struct CoinGeckoTool;

impl CoinGeckoTool {
    pub fn new() -> Self {
        CoinGeckoTool
    }
}

impl Default for CoinGeckoTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for CoinGeckoTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            ToolName::Coingecko,
            "Current crypto price, 24h change and market cap. Query: coin id or ticker. Params: vs_currency (default usd).",
        )
    }

    async fn execute(
        &self,
        query: &str,
        params: &Value,
        context: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let name = ToolName::Coingecko;
        let id = coin_id(query);
        let currency = param_str(params, "vs_currency")
            .unwrap_or("usd")
            .to_lowercase();

        let base = context.endpoint(name, DEFAULT_BASE_URL);
        let url = format!(
            "{}/simple/price?ids={}&vs_currencies={}&include_24hr_change=true&include_market_cap=true",
            base,
            urlencoding::encode(&id),
            urlencoding::encode(&currency)
        );
        let response = send_json(name, context.http.get(&url)).await?;

        let quote = response.get(&id).ok_or_else(|| ToolError::InvalidResponse {
            tool: name.to_string(),
            message: format!("no price data for '{}'", id),
        })?;
        let price = quote.get(&currency).cloned().unwrap_or(Value::Null);
        if price.is_null() {
            return Err(ToolError::InvalidResponse {
                tool: name.to_string(),
                message: format!("no {} price for '{}'", currency, id),
            });
        }

        let data = json!({
            "coin": id,
            "currency": currency,
            "price": price,
            "change_24h": quote.get(format!("{}_24h_change", currency)).cloned().unwrap_or(Value::Null),
            "market_cap": quote.get(format!("{}_market_cap", currency)).cloned().unwrap_or(Value::Null),
        });
        Ok(ToolOutput::new(data).with_source(format!("https://www.coingecko.com/en/coins/{}", id)))
    }
}
