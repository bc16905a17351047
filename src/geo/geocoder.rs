use async_trait::async_trait;
use reqwest::{header, Client};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::models::Coordinate;
use crate::rate_limiter::RateLimiter;

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Best-match coordinate for a free-text place, or `None` when nothing matched.
    async fn geocode(&self, query: &str) -> Result<Option<Coordinate>>;
}

pub struct NominatimGeocoder {
    client: Client,
    rate_limiter: RateLimiter,
    base_url: String,
}

#[derive(Deserialize)]
struct NominatimResult {
    lat: String,
    lon: String,
}

impl NominatimGeocoder {
    pub fn new(user_agent: &str) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::USER_AGENT, header::HeaderValue::from_str(user_agent)?);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            rate_limiter: RateLimiter::nominatim(),
            base_url: "https://nominatim.openstreetmap.org".to_string(),
        })
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, query: &str) -> Result<Option<Coordinate>> {
        self.rate_limiter.wait().await;
        tracing::debug!("Geocoding: {}", query);

        let response = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[("q", query), ("format", "json"), ("limit", "1")])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(Error::Geocoding(format!(
                "Nominatim returned {} for '{}'",
                status, query
            )));
        }

        let results: Vec<NominatimResult> = response.json().await?;
        let Some(first) = results.into_iter().next() else {
            return Ok(None);
        };

        let lat: f64 = first
            .lat
            .parse()
            .map_err(|_| Error::Geocoding(format!("bad latitude '{}'", first.lat)))?;
        let lon: f64 = first
            .lon
            .parse()
            .map_err(|_| Error::Geocoding(format!("bad longitude '{}'", first.lon)))?;

        Ok(Some(Coordinate::new(lat, lon)))
    }
}
