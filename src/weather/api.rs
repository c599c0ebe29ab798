//! WeatherAPI.com history client.

use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{WeatherError, WeatherLookup, WeatherObservation, WeatherResult, parse_history};

/// Connection settings for the weather provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub base_url: String,
    /// Credential for the history endpoint. Empty means unconfigured.
    pub api_key: String,
    pub timeout_secs: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            base_url: "http://api.weatherapi.com/v1".into(),
            api_key: String::new(),
            timeout_secs: 30,
        }
    }
}

/// Calls `GET {base_url}/history.json?key=..&q=..&dt=YYYY-MM-DD`.
#[derive(Clone)]
pub struct WeatherApiClient {
    config: WeatherConfig,
    agent: ureq::Agent,
}

impl WeatherApiClient {
    pub fn new(config: WeatherConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build();
        Self { config, agent }
    }
}

impl std::fmt::Debug for WeatherApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeatherApiClient")
            .field("base_url", &self.config.base_url)
            .field("api_key_set", &!self.config.api_key.is_empty())
            .finish()
    }
}

impl WeatherLookup for WeatherApiClient {
    fn fetch_observation(
        &self,
        location_code: &str,
        date: NaiveDate,
    ) -> WeatherResult<Option<WeatherObservation>> {
        if self.config.api_key.is_empty() {
            return Err(WeatherError::MissingApiKey);
        }

        let url = format!("{}/history.json", self.config.base_url.trim_end_matches('/'));
        let dt = date.format("%Y-%m-%d").to_string();
        tracing::debug!(location = location_code, date = %dt, "fetching weather history");

        let resp = self
            .agent
            .get(&url)
            .query("key", &self.config.api_key)
            .query("q", location_code)
            .query("dt", &dt)
            .call()
            .map_err(|e| match e {
                ureq::Error::Status(status, response) => {
                    let body = response.into_string().unwrap_or_default();
                    WeatherError::HttpStatus {
                        status,
                        message: super::error_message(&body).unwrap_or(body),
                    }
                }
                ureq::Error::Transport(transport) => WeatherError::Request {
                    message: transport.to_string(),
                },
            })?;

        let body = resp.into_string().map_err(|e| WeatherError::Request {
            message: e.to_string(),
        })?;
        parse_history(&body)
    }
}
