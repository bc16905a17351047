use crate::error::{Error, Result};
use std::env;
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Allowed range for the LLM body truncation budget, in characters.
pub const BODY_CHAR_BUDGET_RANGE: std::ops::RangeInclusive<usize> = 4_000..=6_000;

#[derive(Debug, Clone)]
pub struct Config {
    /// Absent key selects the degraded (no-LLM) analysis mode.
    pub anthropic_api_key: Option<String>,
    pub anthropic_model: String,
    pub database_path: String,
    pub geocode_region: String,
    pub geocode_country: String,
    pub market_radius_miles: f64,
    pub body_char_budget: usize,
    pub request_delay_ms: u64,
    pub webhook_secret: Option<String>,
    pub webhook_priority_floor: u8,
    pub contact_email: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let anthropic_api_key = env::var("ANTHROPIC_API_KEY")
            .ok()
            .filter(|v| !v.trim().is_empty());

        let anthropic_model =
            env::var("ANTHROPIC_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        let database_path =
            env::var("DATABASE_PATH").unwrap_or_else(|_| "marketwire.db".to_string());

        let geocode_region = env::var("GEOCODE_REGION").unwrap_or_else(|_| "Kansas".to_string());
        let geocode_country = env::var("GEOCODE_COUNTRY").unwrap_or_else(|_| "USA".to_string());

        let market_radius_miles = parse_var("MARKET_RADIUS_MILES")?.unwrap_or(30.0);
        if market_radius_miles <= 0.0 {
            return Err(Error::Config(
                "MARKET_RADIUS_MILES must be positive".to_string(),
            ));
        }

        let body_char_budget = check_body_budget(parse_var("BODY_CHAR_BUDGET")?.unwrap_or(4_000))?;
        let request_delay_ms = parse_var("REQUEST_DELAY_MS")?.unwrap_or(500);

        let webhook_secret = env::var("WEBHOOK_SECRET")
            .ok()
            .filter(|v| !v.is_empty());

        let webhook_priority_floor: u8 = parse_var("WEBHOOK_PRIORITY_FLOOR")?.unwrap_or(4);
        if !(1..=5).contains(&webhook_priority_floor) {
            return Err(Error::Config(
                "WEBHOOK_PRIORITY_FLOOR must be between 1 and 5".to_string(),
            ));
        }

        let contact_email =
            env::var("CONTACT_EMAIL").unwrap_or_else(|_| "newsroom@example.com".to_string());

        Ok(Self {
            anthropic_api_key,
            anthropic_model,
            database_path,
            geocode_region,
            geocode_country,
            market_radius_miles,
            body_char_budget,
            request_delay_ms,
            webhook_secret,
            webhook_priority_floor,
            contact_email,
        })
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn user_agent(&self) -> String {
        format!("(marketwire news aggregator, {})", self.contact_email)
    }
}

fn check_body_budget(budget: usize) -> Result<usize> {
    if !BODY_CHAR_BUDGET_RANGE.contains(&budget) {
        return Err(Error::Config(format!(
            "BODY_CHAR_BUDGET must be between {} and {}, got {}",
            BODY_CHAR_BUDGET_RANGE.start(),
            BODY_CHAR_BUDGET_RANGE.end(),
            budget
        )));
    }
    Ok(budget)
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(v) => v
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{} has an invalid value: {}", name, v))),
        Err(_) => Ok(None),
    }
}

#[derive(Debug, Clone)]
pub struct GeoConfig {
    pub region: String,
    pub country: String,
    pub radius_miles: f64,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            region: "Kansas".to_string(),
            country: "USA".to_string(),
            radius_miles: 30.0,
        }
    }
}

impl From<&Config> for GeoConfig {
    fn from(config: &Config) -> Self {
        Self {
            region: config.geocode_region.clone(),
            country: config.geocode_country.clone(),
            radius_miles: config.market_radius_miles,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub body_char_budget: usize,
    pub default_priority: u8,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            body_char_budget: 4_000,
            default_priority: 3,
        }
    }
}

impl From<&Config> for AnalyzerConfig {
    fn from(config: &Config) -> Self {
        Self {
            body_char_budget: config.body_char_budget,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Body budget used for first-party sources, which tend to run longer.
    pub first_party_char_budget: usize,
    pub request_delay: Duration,
    /// Fallback default location when a stored row has neither source city nor location.
    pub default_location: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            first_party_char_budget: 6_000,
            request_delay: Duration::from_millis(500),
            default_location: "Kansas".to_string(),
        }
    }
}

impl From<&Config> for PipelineConfig {
    fn from(config: &Config) -> Self {
        Self {
            request_delay: config.request_delay(),
            default_location: config.geocode_region.clone(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct WeatherConfig {
    pub user_agent: String,
    /// Region named in the forecast bullet prompt.
    pub region: String,
    pub city_delay: Duration,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            user_agent: "(marketwire news aggregator)".to_string(),
            region: "Kansas".to_string(),
            city_delay: Duration::from_millis(500),
        }
    }
}

impl From<&Config> for WeatherConfig {
    fn from(config: &Config) -> Self {
        Self {
            user_agent: config.user_agent(),
            region: config.geocode_region.clone(),
            city_delay: config.request_delay(),
        }
    }
}
