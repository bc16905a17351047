use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::models::{Coordinate, ForecastPeriod, GridPoint};

#[async_trait]
pub trait WeatherService: Send + Sync {
    /// Forecast URLs for the grid cell containing `point`; `None` outside coverage.
    async fn gridpoint(&self, point: Coordinate) -> Result<Option<GridPoint>>;

    /// Periods from a daily or hourly forecast URL.
    async fn periods(&self, forecast_url: &str) -> Result<Vec<ForecastPeriod>>;
}

/// api.weather.gov client. NWS asks for an identifying User-Agent with contact details.
pub struct NwsClient {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct PointResponse {
    properties: GridPoint,
}

#[derive(Deserialize)]
struct ForecastResponse {
    properties: ForecastProperties,
}

#[derive(Deserialize)]
struct ForecastProperties {
    #[serde(default)]
    periods: Vec<ForecastPeriod>,
}

impl NwsClient {
    pub fn new(user_agent: &str) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::USER_AGENT, header::HeaderValue::from_str(user_agent)?);
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/geo+json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: "https://api.weather.gov".to_string(),
        })
    }
}

#[async_trait]
impl WeatherService for NwsClient {
    async fn gridpoint(&self, point: Coordinate) -> Result<Option<GridPoint>> {
        let url = format!("{}/points/{}", self.base_url, point);
        tracing::debug!("Fetching gridpoint: {}", url);

        let response = self.client.get(&url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Weather(format!(
                "Failed to fetch gridpoint {}: {} - {}",
                point, status, body
            )));
        }

        let point: PointResponse = response.json().await?;
        Ok(Some(point.properties))
    }

    async fn periods(&self, forecast_url: &str) -> Result<Vec<ForecastPeriod>> {
        tracing::debug!("Fetching forecast: {}", forecast_url);

        let response = self.client.get(forecast_url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Weather(format!(
                "Failed to fetch forecast {}: {} - {}",
                forecast_url, status, body
            )));
        }

        let forecast: ForecastResponse = response.json().await?;
        Ok(forecast.properties.periods)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forecast_envelope_deserializes() {
        let json = r#"{
            "type": "Feature",
            "properties": {
                "units": "us",
                "periods": [
                    {"number": 1, "name": "Today", "isDaytime": true, "temperature": 71,
                     "probabilityOfPrecipitation": {"value": 20}, "shortForecast": "Sunny"}
                ]
            }
        }"#;
        let forecast: ForecastResponse = serde_json::from_str(json).unwrap();
        assert_eq!(forecast.properties.periods.len(), 1);
        assert_eq!(forecast.properties.periods[0].temperature, Some(71));
    }

    #[test]
    fn test_point_envelope_deserializes() {
        let json = r#"{"properties": {
            "gridId": "TOP",
            "forecast": "https://api.weather.gov/gridpoints/TOP/65,41/forecast",
            "forecastHourly": "https://api.weather.gov/gridpoints/TOP/65,41/forecast/hourly"
        }}"#;
        let point: PointResponse = serde_json::from_str(json).unwrap();
        assert!(point.properties.forecast_hourly.unwrap().ends_with("/hourly"));
    }
}
