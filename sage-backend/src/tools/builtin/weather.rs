//! Current weather from OpenWeatherMap, registered as the `wheat` tool

use super::http::{param_str, require_api_key, send_json};
use super::OPENWEATHER_API_KEY;
use crate::error::ToolError;
use crate::tools::registry::Tool;
use crate::tools::types::{ToolContext, ToolDefinition, ToolName, ToolOutput};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org";

#[derive(Debug, Deserialize)]
struct WeatherResponse {
    id: Option<u64>,
    name: String,
    #[serde(default)]
    sys: WeatherSys,
    #[serde(default)]
    weather: Vec<WeatherCondition>,
    main: WeatherMain,
    #[serde(default)]
    wind: WeatherWind,
}

#[derive(Debug, Default, Deserialize)]
struct WeatherSys {
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WeatherCondition {
    description: String,
}

#[derive(Debug, Deserialize)]
struct WeatherMain {
    temp: f64,
    feels_like: Option<f64>,
    humidity: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct WeatherWind {
    speed: Option<f64>,
}

pub struct WeatherTool;

impl WeatherTool {
    pub fn new() -> Self {
        WeatherTool
    }
}

impl Default for WeatherTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WeatherTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            ToolName::Wheat,
            "Current weather for a city. Query: city name. Params: units (metric|imperial).",
        )
    }

    async fn execute(
        &self,
        query: &str,
        params: &Value,
        context: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let name = ToolName::Wheat;
        let api_key = require_api_key(context, name, OPENWEATHER_API_KEY)?;
        let units = match param_str(params, "units") {
            Some("imperial") => "imperial",
            _ => "metric",
        };

        let base = context.endpoint(name, DEFAULT_BASE_URL);
        let request = context.http.get(format!("{}/data/2.5/weather", base)).query(&[
            ("q", query),
            ("appid", api_key.as_str()),
            ("units", units),
        ]);
        let response = send_json(name, request).await?;

        let weather: WeatherResponse =
            serde_json::from_value(response).map_err(|e| ToolError::InvalidResponse {
                tool: name.to_string(),
                message: format!("unexpected weather payload: {}", e),
            })?;

        let description = weather
            .weather
            .iter()
            .map(|w| w.description.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        let data = json!({
            "location": weather.name,
            "country": weather.sys.country,
            "description": description,
            "temperature": weather.main.temp,
            "feels_like": weather.main.feels_like,
            "humidity": weather.main.humidity,
            "wind_speed": weather.wind.speed,
            "units": units,
        });

        let output = ToolOutput::new(data);
        Ok(match weather.id {
            Some(id) => output.with_source(format!("https://openweathermap.org/city/{}", id)),
            None => output,
        })
    }
}
