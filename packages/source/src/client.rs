//! Open-Meteo forecast client.
//!
//! Both calls hit `{base_url}/v1/forecast`. The readiness probe asks for
//! the current weather at `(0, 0)`; a fetch asks for a city's current
//! weather in UTC and returns the JSON body untouched.
//!
//! See <https://open-meteo.com/en/docs>

use std::time::Duration;

use async_trait::async_trait;
use weather_ingest_models::CityConfig;

use crate::SourceError;

/// `User-Agent` sent with every request.
const USER_AGENT: &str = "weather-ingest/0.1";

/// The two calls the pipeline makes against the weather API.
#[async_trait]
pub trait WeatherClient: Send + Sync {
    /// Sends the readiness probe. Returns `Ok(true)` on HTTP 200 and
    /// `Ok(false)` on any other status.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if no response arrives.
    async fn probe(&self) -> Result<bool, SourceError>;

    /// Fetches the current weather for `city`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] on transport failure, a non-200 status, or
    /// a body that is not JSON.
    async fn current_weather(&self, city: &CityConfig) -> Result<serde_json::Value, SourceError>;
}

/// [`WeatherClient`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct OpenMeteoClient {
    client: reqwest::Client,
    base_url: String,
}

impl OpenMeteoClient {
    /// Creates a client for `base_url` (scheme and host, e.g.
    /// `https://api.open-meteo.com`) with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Wraps an existing `reqwest` client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Returns the forecast endpoint URL.
    #[must_use]
    pub fn forecast_url(&self) -> String {
        format!("{}/v1/forecast", self.base_url)
    }
}

#[async_trait]
impl WeatherClient for OpenMeteoClient {
    async fn probe(&self) -> Result<bool, SourceError> {
        let response = self
            .client
            .get(self.forecast_url())
            .query(&[
                ("latitude", "0"),
                ("longitude", "0"),
                ("current_weather", "true"),
            ])
            .send()
            .await?;

        let status = response.status();
        log::debug!("Availability probe answered {status}");
        Ok(status == reqwest::StatusCode::OK)
    }

    async fn current_weather(&self, city: &CityConfig) -> Result<serde_json::Value, SourceError> {
        let url = self.forecast_url();
        let response = self
            .client
            .get(&url)
            .query(&[
                ("latitude", city.lat.to_string()),
                ("longitude", city.lon.to_string()),
                ("current_weather", "true".to_string()),
                ("timezone", "UTC".to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(SourceError::Status {
                url,
                status: status.as_u16(),
            });
        }

        // Read as text first so a parse failure can report the body size.
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            log::warn!(
                "{}: response is not JSON ({} bytes): {e}",
                city.name,
                text.len()
            );
            SourceError::Json(e)
        })
    }
}
