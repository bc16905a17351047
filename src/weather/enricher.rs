use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;

use crate::config::WeatherConfig;
use crate::geo::MarketTable;
use crate::llm::parser::parse_bullet;
use crate::llm::{LLMProvider, WeatherBulletRequest};
use crate::models::{Coordinate, ForecastPeriod, WeatherSnapshot};
use crate::storage::Storage;
use crate::weather::client::WeatherService;

/// Builds one weather snapshot per market city from NWS forecasts, with an
/// optional one-sentence narrative.
pub struct WeatherEnricher {
    service: Arc<dyn WeatherService>,
    llm: Option<Arc<dyn LLMProvider>>,
    markets: Arc<MarketTable>,
    config: WeatherConfig,
}

impl WeatherEnricher {
    pub fn new(
        service: Arc<dyn WeatherService>,
        llm: Option<Arc<dyn LLMProvider>>,
        markets: Arc<MarketTable>,
        config: WeatherConfig,
    ) -> Self {
        Self {
            service,
            llm,
            markets,
            config,
        }
    }

    /// `None` when the gridpoint or the daily forecast is unavailable.
    pub async fn refresh(&self, city: &str, point: Coordinate) -> Option<WeatherSnapshot> {
        let grid = match self.service.gridpoint(point).await {
            Ok(Some(grid)) => grid,
            Ok(None) => {
                tracing::warn!("No NWS gridpoint for {} ({})", city, point);
                return None;
            }
            Err(e) => {
                tracing::warn!("Gridpoint lookup failed for {}: {}", city, e);
                return None;
            }
        };

        let Some(forecast_url) = grid.forecast else {
            tracing::warn!("Gridpoint for {} has no forecast URL", city);
            return None;
        };

        let daily = match self.service.periods(&forecast_url).await {
            Ok(periods) if !periods.is_empty() => periods,
            Ok(_) => {
                tracing::warn!("Empty forecast for {}", city);
                return None;
            }
            Err(e) => {
                tracing::warn!("Forecast failed for {}: {}", city, e);
                return None;
            }
        };

        let hourly = match grid.forecast_hourly {
            Some(url) => self.service.periods(&url).await.unwrap_or_else(|e| {
                tracing::debug!("Hourly forecast failed for {}: {}", city, e);
                Vec::new()
            }),
            None => Vec::new(),
        };

        let mut snapshot = build_snapshot(city, &daily, &hourly, Utc::now());
        snapshot.bullet = self.bullet(city, &snapshot).await;
        Some(snapshot)
    }

    async fn bullet(&self, city: &str, snapshot: &WeatherSnapshot) -> Option<String> {
        let llm = self.llm.as_ref()?;
        let request = WeatherBulletRequest {
            city,
            region: &self.config.region,
            snapshot,
        };

        match llm.complete(request.into_completion()).await {
            Ok(text) => parse_bullet(&text),
            Err(e) => {
                tracing::warn!("Weather bullet failed for {}: {}", city, e);
                None
            }
        }
    }

    /// Refresh every market's weather city in table order, one at a time.
    /// Returns how many snapshots were stored.
    pub async fn refresh_all(&self, storage: &Storage) -> usize {
        let cities = self.markets.weather_cities();
        let pb = ProgressBar::new(cities.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} cities")
                .map(|style| style.progress_chars("#>-"))
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        let mut stored = 0;
        for (i, (city, point)) in cities.iter().enumerate() {
            if i > 0 && !self.config.city_delay.is_zero() {
                tokio::time::sleep(self.config.city_delay).await;
            }

            if let Some(snapshot) = self.refresh(city, *point).await {
                match storage.upsert_weather(&snapshot) {
                    Ok(()) => {
                        tracing::info!(
                            "{}: {}°F, {}",
                            city,
                            snapshot
                                .current_temp
                                .map(|t| t.to_string())
                                .unwrap_or_else(|| "?".to_string()),
                            snapshot.current_conditions.as_deref().unwrap_or("n/a")
                        );
                        stored += 1;
                    }
                    Err(e) => tracing::warn!("Failed to store weather for {}: {}", city, e),
                }
            }
            pb.inc(1);
        }

        pb.finish_with_message("Weather refreshed");
        stored
    }
}

fn build_snapshot(
    city: &str,
    daily: &[ForecastPeriod],
    hourly: &[ForecastPeriod],
    now: DateTime<Utc>,
) -> WeatherSnapshot {
    let mut snapshot = WeatherSnapshot {
        city: city.to_string(),
        current_temp: None,
        current_conditions: None,
        forecast_high: None,
        forecast_low: None,
        forecast_conditions: None,
        detailed_forecast: None,
        precip_chance: None,
        temperature_trend: None,
        bullet: None,
        updated_at: now,
    };

    if let Some(current) = hourly.first() {
        snapshot.current_temp = current.temperature;
        snapshot.current_conditions = current.short_forecast.clone();
    }

    if let Some(today) = daily.first() {
        snapshot.forecast_conditions = today.short_forecast.clone();
        snapshot.detailed_forecast = today.detailed_forecast.clone();
        snapshot.temperature_trend = today.temperature_trend.clone();
        snapshot.precip_chance = today
            .probability_of_precipitation
            .as_ref()
            .and_then(|p| p.value)
            .map(|v| v.round() as i64);

        // A forecast fetched in the evening starts with "Tonight".
        let next = daily.get(1).and_then(|p| p.temperature);
        if today.is_daytime.unwrap_or(false) {
            snapshot.forecast_high = today.temperature;
            snapshot.forecast_low = next;
        } else {
            snapshot.forecast_low = today.temperature;
            snapshot.forecast_high = next;
        }
    }

    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyzer::tests::ScriptedLLM;
    use crate::error::{Error, Result};
    use crate::models::{GridPoint, QuantitativeValue};
    use async_trait::async_trait;
    use std::time::Duration;

    const DAILY: &str = "https://nws.test/forecast";
    const HOURLY: &str = "https://nws.test/forecast/hourly";

    struct FakeNws {
        grid: Option<GridPoint>,
        daily: Option<Vec<ForecastPeriod>>,
        hourly: Option<Vec<ForecastPeriod>>,
    }

    impl FakeNws {
        fn new(daily: Vec<ForecastPeriod>, hourly: Vec<ForecastPeriod>) -> Self {
            Self {
                grid: Some(GridPoint {
                    forecast: Some(DAILY.to_string()),
                    forecast_hourly: Some(HOURLY.to_string()),
                }),
                daily: Some(daily),
                hourly: Some(hourly),
            }
        }
    }

    #[async_trait]
    impl WeatherService for FakeNws {
        async fn gridpoint(&self, _point: Coordinate) -> Result<Option<GridPoint>> {
            Ok(self.grid.clone())
        }

        async fn periods(&self, forecast_url: &str) -> Result<Vec<ForecastPeriod>> {
            let periods = if forecast_url == HOURLY {
                &self.hourly
            } else {
                &self.daily
            };
            periods
                .clone()
                .ok_or_else(|| Error::Weather("503 Service Unavailable".into()))
        }
    }

    fn period(daytime: bool, temperature: i64, precip: Option<f64>) -> ForecastPeriod {
        ForecastPeriod {
            name: Some(if daytime { "Today" } else { "Tonight" }.to_string()),
            is_daytime: Some(daytime),
            temperature: Some(temperature),
            temperature_trend: None,
            short_forecast: Some("Partly Cloudy".to_string()),
            detailed_forecast: Some("Partly cloudy, with a light south wind.".to_string()),
            probability_of_precipitation: Some(QuantitativeValue { value: precip }),
        }
    }

    fn enricher(nws: FakeNws, llm: Option<ScriptedLLM>) -> WeatherEnricher {
        WeatherEnricher::new(
            Arc::new(nws),
            llm.map(|l| Arc::new(l) as Arc<dyn LLMProvider>),
            Arc::new(MarketTable::kansas()),
            WeatherConfig {
                city_delay: Duration::ZERO,
                ..Default::default()
            },
        )
    }

    const TOPEKA: Coordinate = Coordinate::new(39.0473, -95.6752);

    #[tokio::test]
    async fn test_daytime_first_period_is_high() {
        let nws = FakeNws::new(
            vec![period(true, 75, Some(20.0)), period(false, 50, None)],
            vec![period(true, 68, None)],
        );
        let snapshot = enricher(nws, None).refresh("Topeka", TOPEKA).await.unwrap();

        assert_eq!(snapshot.forecast_high, Some(75));
        assert_eq!(snapshot.forecast_low, Some(50));
        assert_eq!(snapshot.current_temp, Some(68));
        assert_eq!(snapshot.precip_chance, Some(20));
        assert_eq!(snapshot.bullet, None);
    }

    #[tokio::test]
    async fn test_nighttime_first_period_inverts() {
        let nws = FakeNws::new(
            vec![period(false, 40, None), period(true, 70, Some(60.0))],
            vec![],
        );
        let snapshot = enricher(nws, None).refresh("Hays", TOPEKA).await.unwrap();

        assert_eq!(snapshot.forecast_low, Some(40));
        assert_eq!(snapshot.forecast_high, Some(70));
        assert_eq!(snapshot.precip_chance, None);
        assert_eq!(snapshot.current_temp, None);
    }

    #[tokio::test]
    async fn test_hourly_failure_is_not_fatal() {
        let mut nws = FakeNws::new(vec![period(true, 75, None)], vec![]);
        nws.hourly = None;
        let snapshot = enricher(nws, None).refresh("Salina", TOPEKA).await.unwrap();

        assert_eq!(snapshot.forecast_high, Some(75));
        assert_eq!(snapshot.forecast_low, None);
        assert_eq!(snapshot.current_conditions, None);
    }

    #[tokio::test]
    async fn test_missing_gridpoint_or_daily_yields_none() {
        let mut no_grid = FakeNws::new(vec![period(true, 75, None)], vec![]);
        no_grid.grid = None;
        assert!(enricher(no_grid, None).refresh("Liberal", TOPEKA).await.is_none());

        let mut no_daily = FakeNws::new(vec![], vec![]);
        no_daily.daily = None;
        assert!(enricher(no_daily, None).refresh("Liberal", TOPEKA).await.is_none());

        let empty_daily = FakeNws::new(vec![], vec![period(true, 60, None)]);
        assert!(enricher(empty_daily, None).refresh("Liberal", TOPEKA).await.is_none());
    }

    #[tokio::test]
    async fn test_bullet_from_llm_and_failure_tolerated() {
        let nws = FakeNws::new(vec![period(true, 75, None)], vec![period(true, 70, None)]);
        let llm = ScriptedLLM::new(vec![Ok("Warm and breezy in Topeka, topping out at 75.")]);
        let snapshot = enricher(nws, Some(llm)).refresh("Topeka", TOPEKA).await.unwrap();
        assert_eq!(
            snapshot.bullet.as_deref(),
            Some("Warm and breezy in Topeka, topping out at 75.")
        );

        let nws = FakeNws::new(vec![period(true, 75, None)], vec![]);
        let llm = ScriptedLLM::new(vec![Err("rate limited")]);
        let snapshot = enricher(nws, Some(llm)).refresh("Topeka", TOPEKA).await.unwrap();
        assert_eq!(snapshot.bullet, None);
        assert_eq!(snapshot.forecast_high, Some(75));
    }

    #[tokio::test]
    async fn test_refresh_all_upserts_every_city() {
        let storage = Storage::in_memory().unwrap();
        let nws = FakeNws::new(vec![period(true, 75, None), period(false, 52, None)], vec![]);
        let enricher = enricher(nws, None);

        assert_eq!(enricher.refresh_all(&storage).await, 16);
        assert_eq!(enricher.refresh_all(&storage).await, 16);

        let stored = storage.list_weather().unwrap();
        assert_eq!(stored.len(), 16);
        assert!(stored.iter().all(|w| w.forecast_low == Some(52)));
    }
}
