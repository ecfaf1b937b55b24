//! Current weather from OpenWeatherMap.

use async_trait::async_trait;
use cellchat_agent::{Capability, CredentialField, Credentials};
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, ToolError};
use crate::http::{self, str_field};

const OPENWEATHER_BASE_URL: &str = "https://api.openweathermap.org";

pub struct OpenWeatherSearch {
    client: reqwest::Client,
    base_url: String,
}

impl OpenWeatherSearch {
    pub const ID: &'static str = "openweather";

    pub fn new() -> Self {
        Self::with_base_url(OPENWEATHER_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: http::client(),
            base_url: base_url.into(),
        }
    }

    async fn lookup(&self, location: &str, api_key: &str) -> Result<String> {
        let location = location.trim();
        if location.is_empty() {
            return Err(ToolError::invalid_input(Self::ID, "location is empty"));
        }

        let request = self
            .client
            .get(format!("{}/data/2.5/weather", self.base_url.trim_end_matches('/')))
            .query(&[("q", location), ("appid", api_key), ("units", "metric")]);
        let body = http::send_json(Self::ID, request).await?;
        debug!(location, "openweather lookup completed");

        Ok(render_weather(location, &body))
    }
}

impl Default for OpenWeatherSearch {
    fn default() -> Self {
        Self::new()
    }
}

fn render_weather(location: &str, w: &Value) -> String {
    let num = |pointer: &str| w.pointer(pointer).and_then(Value::as_f64);
    let fmt = |v: Option<f64>, unit: &str| match v {
        Some(v) => format!("{v}{unit}"),
        None => "n/a".to_owned(),
    };

    format!(
        "In {location}, the current weather is as follows:\n\
         Detailed status: {}\n\
         Wind speed: {}, direction: {}\n\
         Humidity: {}\n\
         Temperature: \n  - Current: {}\n  - High: {}\n  - Low: {}\n  - Feels like: {}\n\
         Cloud cover: {}",
        str_field(w, "/weather/0/description"),
        fmt(num("/wind/speed"), " m/s"),
        fmt(num("/wind/deg"), "°"),
        fmt(num("/main/humidity"), "%"),
        fmt(num("/main/temp"), "°C"),
        fmt(num("/main/temp_max"), "°C"),
        fmt(num("/main/temp_min"), "°C"),
        fmt(num("/main/feels_like"), "°C"),
        fmt(num("/clouds/all"), "%"),
    )
}

#[async_trait]
impl Capability for OpenWeatherSearch {
    fn id(&self) -> &str {
        Self::ID
    }

    fn name(&self) -> &str {
        "WeatherQuery"
    }

    fn description(&self) -> &str {
        "Use this tool to get current or forecasted weather information for a given location. \
         The query is a place name such as \"London,GB\"."
    }

    fn required_credentials(&self) -> &'static [CredentialField] {
        &[CredentialField::ApiKey]
    }

    async fn search(&self, query: &str, credentials: &Credentials) -> cellchat_agent::Result<String> {
        let api_key = credentials.require(Self::ID, CredentialField::ApiKey)?;
        Ok(self.lookup(query, api_key).await?)
    }
}
