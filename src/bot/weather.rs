//! OpenWeather client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info};

use super::outcome::{LookupOutcome, ProviderError};
use crate::config::WeatherConfig;

/// Current conditions for one place.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherReport {
    pub city_name: String,
    pub description: String,
    pub current_temp: f64,
    pub min_temp: f64,
    pub max_temp: f64,
    pub pressure: f64,
}

/// Anything that can answer weather questions. `WeatherLookup` is the real one.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn by_city(&self, name: &str) -> LookupOutcome<WeatherReport>;
    async fn by_coordinates(&self, latitude: f64, longitude: f64) -> LookupOutcome<WeatherReport>;
}

#[derive(Deserialize)]
struct ApiResponse {
    name: Option<String>,
    main: ApiMain,
    weather: Vec<ApiCondition>,
}

#[derive(Deserialize)]
struct ApiMain {
    temp: f64,
    temp_min: f64,
    temp_max: f64,
    pressure: f64,
}

#[derive(Deserialize)]
struct ApiCondition {
    description: String,
}

pub struct WeatherLookup {
    config: WeatherConfig,
    client: reqwest::Client,
    timeout: Duration,
}

impl WeatherLookup {
    pub fn new(config: WeatherConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { config, client, timeout })
    }

    /// One GET against the provider. `echo` is what a `NotFound` quotes back.
    async fn fetch(
        &self,
        location: &[(&str, String)],
        echo: String,
        city_name: Option<&str>,
    ) -> LookupOutcome<WeatherReport> {
        let common = [
            ("appid", self.config.api_key.clone()),
            ("units", "metric".to_string()),
            ("lang", self.config.lang.clone()),
        ];

        let response = match self
            .client
            .get(&self.config.api_url)
            .query(location)
            .query(&common)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return LookupOutcome::ProviderError(ProviderError::from_reqwest(e, self.timeout)),
        };

        let status = response.status();
        debug!("Weather response status: {status}");
        if status != StatusCode::OK {
            return LookupOutcome::NotFound(echo);
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return LookupOutcome::ProviderError(ProviderError::from_reqwest(e, self.timeout)),
        };

        match parse_report(&body, city_name) {
            Ok(report) => LookupOutcome::Success(report),
            Err(e) => LookupOutcome::ProviderError(e),
        }
    }
}

#[async_trait]
impl WeatherSource for WeatherLookup {
    async fn by_city(&self, name: &str) -> LookupOutcome<WeatherReport> {
        info!("🌤️ Weather for city \"{}\"", name);
        self.fetch(&[("q", name.to_string())], name.to_string(), Some(name))
            .await
    }

    async fn by_coordinates(&self, latitude: f64, longitude: f64) -> LookupOutcome<WeatherReport> {
        info!("🌤️ Weather for coordinates {}, {}", latitude, longitude);
        let location = [("lat", latitude.to_string()), ("lon", longitude.to_string())];
        self.fetch(&location, format!("{latitude}, {longitude}"), None)
            .await
    }
}

/// Build a report from an OpenWeather JSON body.
///
/// City queries report the name the user typed; coordinate queries use the
/// provider's `name`, and a blank one is treated as a malformed body.
fn parse_report(body: &str, city_name: Option<&str>) -> Result<WeatherReport, ProviderError> {
    let parsed: ApiResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Malformed(e.to_string()))?;

    let description = parsed
        .weather
        .into_iter()
        .next()
        .map(|c| c.description)
        .ok_or_else(|| ProviderError::Malformed("empty weather array".into()))?;

    let city_name = match city_name {
        Some(name) => name.to_string(),
        None => parsed
            .name
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| ProviderError::Malformed("no place name for coordinates".into()))?,
    };

    Ok(WeatherReport {
        city_name,
        description,
        current_temp: parsed.main.temp,
        min_temp: parsed.main.temp_min,
        max_temp: parsed.main.temp_max,
        pressure: parsed.main.pressure,
    })
}
