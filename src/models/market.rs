use serde::{Deserialize, Serialize};
use std::fmt;

pub const AT_LARGE: &str = "At Large";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4},{:.4}", self.lat, self.lon)
    }
}

/// A named market, or the catch-all for places that resolve near none of them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MarketName {
    Named(String),
    AtLarge,
}

impl MarketName {
    pub fn named(name: impl Into<String>) -> Self {
        MarketName::Named(name.into())
    }

    pub fn as_str(&self) -> &str {
        match self {
            MarketName::Named(name) => name,
            MarketName::AtLarge => AT_LARGE,
        }
    }

    pub fn is_at_large(&self) -> bool {
        matches!(self, MarketName::AtLarge)
    }
}

impl fmt::Display for MarketName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for MarketName {
    fn from(s: String) -> Self {
        if s.trim().eq_ignore_ascii_case(AT_LARGE) {
            MarketName::AtLarge
        } else {
            MarketName::Named(s)
        }
    }
}

impl From<&str> for MarketName {
    fn from(s: &str) -> Self {
        MarketName::from(s.to_string())
    }
}

impl From<MarketName> for String {
    fn from(m: MarketName) -> Self {
        match m {
            MarketName::Named(name) => name,
            MarketName::AtLarge => AT_LARGE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketAnchor {
    pub name: String,
    pub anchor: Coordinate,
    /// City whose forecast represents this market.
    pub weather_city: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_at_large_parses_case_insensitively() {
        assert_eq!(MarketName::from("at large"), MarketName::AtLarge);
        assert_eq!(MarketName::from("Topeka"), MarketName::named("Topeka"));
        assert_eq!(MarketName::AtLarge.to_string(), "At Large");
    }

    #[test]
    fn test_market_name_serializes_as_plain_string() {
        let json = serde_json::to_string(&MarketName::AtLarge).unwrap();
        assert_eq!(json, "\"At Large\"");
        let parsed: MarketName = serde_json::from_str("\"Hays\"").unwrap();
        assert_eq!(parsed, MarketName::named("Hays"));
    }
}
