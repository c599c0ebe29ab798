//! Weather corroboration: historical conditions for the incident date and place.
//!
//! [`WeatherLookup`] resolves a location code and date to a
//! [`WeatherObservation`], or `None` when the provider has no day entry.
//! [`corroborate`] then asks the text model whether those conditions plausibly
//! explain the photographed damage.

pub mod api;
pub mod corroborate;

use std::fmt;

use chrono::NaiveDate;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm::LlmError;

pub use api::{WeatherApiClient, WeatherConfig};
pub use corroborate::{
    CorroborationScope, WeatherCorroborationJudgment, corroborate, corroboration_prompt,
};

#[derive(Debug, Error, Diagnostic)]
pub enum WeatherError {
    #[error("no weather API key configured")]
    #[diagnostic(
        code(intake::weather::missing_api_key),
        help("Set `weather.api_key` in the config file or export WEATHER_API_KEY.")
    )]
    MissingApiKey,

    #[error("weather request failed: {message}")]
    #[diagnostic(
        code(intake::weather::request),
        help("Check network connectivity and `weather.base_url`.")
    )]
    Request { message: String },

    #[error("weather service returned HTTP {status}: {message}")]
    #[diagnostic(
        code(intake::weather::http_status),
        help(
            "Historical lookups need a plan that includes history. \
             A 400 usually means the location code was not recognised."
        )
    )]
    HttpStatus { status: u16, message: String },

    #[error("unexpected weather response: {message}")]
    #[diagnostic(
        code(intake::weather::parse),
        help("The weather service returned JSON in an unexpected shape.")
    )]
    Parse { message: String },

    #[error("weather corroboration failed: {source}")]
    #[diagnostic(
        code(intake::weather::corroboration),
        help("The text model could not be reached or returned an unusable response.")
    )]
    Corroboration {
        #[source]
        source: LlmError,
    },
}

pub type WeatherResult<T> = std::result::Result<T, WeatherError>;

/// Capability: historical weather for a location and date.
pub trait WeatherLookup: Send + Sync {
    /// `Ok(None)` means the service answered but has no data for that day.
    fn fetch_observation(
        &self,
        location_code: &str,
        date: NaiveDate,
    ) -> WeatherResult<Option<WeatherObservation>>;
}

/// Daily summary for the incident date. Readings the provider omitted are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherObservation {
    pub location_name: String,
    pub region_name: String,
    pub condition_text: String,
    pub max_wind_mph: Option<f64>,
    pub total_precip_in: Option<f64>,
    pub max_temp_f: Option<f64>,
    pub min_temp_f: Option<f64>,
    pub avg_humidity_pct: Option<f64>,
}

impl WeatherObservation {
    /// "City, Region", or just the city when the region is blank.
    pub fn place(&self) -> String {
        if self.region_name.is_empty() {
            self.location_name.clone()
        } else {
            format!("{}, {}", self.location_name, self.region_name)
        }
    }

    /// The readings as display lines, in report order.
    pub fn summary_lines(&self) -> Vec<String> {
        vec![
            format!("Condition: {}", self.condition_text),
            format!("Max Wind: {} mph", Reading(self.max_wind_mph)),
            format!("Total Precipitation: {} inches", Reading(self.total_precip_in)),
            format!("Max Temp: {}°F", Reading(self.max_temp_f)),
            format!("Min Temp: {}°F", Reading(self.min_temp_f)),
            format!("Average Humidity: {}%", Reading(self.avg_humidity_pct)),
        ]
    }
}

/// Optional numeric reading, shown as `N/A` when missing.
pub struct Reading(pub Option<f64>);

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(v) => write!(f, "{v}"),
            None => f.write_str("N/A"),
        }
    }
}

// ---------------------------------------------------------------------------
// Provider response shape
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct HistoryResponse {
    location: Option<ApiLocation>,
    forecast: Option<ApiForecast>,
    error: Option<ApiErrorBody>,
}

#[derive(Deserialize)]
struct ApiLocation {
    name: String,
    #[serde(default)]
    region: String,
}

#[derive(Deserialize)]
struct ApiForecast {
    #[serde(default)]
    forecastday: Vec<ApiForecastDay>,
}

#[derive(Deserialize)]
struct ApiForecastDay {
    day: Option<ApiDay>,
}

#[derive(Deserialize)]
struct ApiDay {
    condition: Option<ApiCondition>,
    maxwind_mph: Option<f64>,
    totalprecip_in: Option<f64>,
    maxtemp_f: Option<f64>,
    mintemp_f: Option<f64>,
    avghumidity: Option<f64>,
}

impl ApiDay {
    fn is_empty(&self) -> bool {
        self.condition.is_none()
            && self.maxwind_mph.is_none()
            && self.totalprecip_in.is_none()
            && self.maxtemp_f.is_none()
            && self.mintemp_f.is_none()
            && self.avghumidity.is_none()
    }
}

#[derive(Deserialize)]
struct ApiCondition {
    text: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: String,
}

impl fmt::Display for ApiErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code {code})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Extract the error message from a provider error body, if it has one.
pub(crate) fn error_message(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct Envelope {
        error: ApiErrorBody,
    }
    serde_json::from_str::<Envelope>(body)
        .ok()
        .map(|e| e.error.to_string())
}

/// Parse a `history.json` body.
///
/// A missing or empty first forecast day is `Ok(None)`. A missing location
/// block alongside day data is a parse error.
pub fn parse_history(body: &str) -> WeatherResult<Option<WeatherObservation>> {
    let parsed: HistoryResponse = serde_json::from_str(body).map_err(|e| WeatherError::Parse {
        message: e.to_string(),
    })?;

    if let Some(err) = parsed.error {
        return Err(WeatherError::Parse {
            message: err.to_string(),
        });
    }

    let day = parsed
        .forecast
        .and_then(|f| f.forecastday.into_iter().next())
        .and_then(|d| d.day);
    let day = match day {
        Some(day) if !day.is_empty() => day,
        _ => return Ok(None),
    };

    let location = parsed.location.ok_or_else(|| WeatherError::Parse {
        message: "missing 'location' block".into(),
    })?;

    Ok(Some(WeatherObservation {
        location_name: location.name,
        region_name: location.region,
        condition_text: day
            .condition
            .and_then(|c| c.text)
            .unwrap_or_else(|| "Unknown".into()),
        max_wind_mph: day.maxwind_mph,
        total_precip_in: day.totalprecip_in,
        max_temp_f: day.maxtemp_f,
        min_temp_f: day.mintemp_f,
        avg_humidity_pct: day.avghumidity,
    }))
}
