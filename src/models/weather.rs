use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub city: String,
    pub current_temp: Option<i64>,
    pub current_conditions: Option<String>,
    pub forecast_high: Option<i64>,
    pub forecast_low: Option<i64>,
    pub forecast_conditions: Option<String>,
    pub detailed_forecast: Option<String>,
    pub precip_chance: Option<i64>,
    pub temperature_trend: Option<String>,
    pub bullet: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Forecast URLs for one NWS grid cell.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GridPoint {
    pub forecast: Option<String>,
    #[serde(rename = "forecastHourly")]
    pub forecast_hourly: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastPeriod {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub is_daytime: Option<bool>,
    #[serde(default)]
    pub temperature: Option<i64>,
    #[serde(default)]
    pub temperature_trend: Option<String>,
    #[serde(default)]
    pub short_forecast: Option<String>,
    #[serde(default)]
    pub detailed_forecast: Option<String>,
    #[serde(default)]
    pub probability_of_precipitation: Option<QuantitativeValue>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct QuantitativeValue {
    #[serde(default)]
    pub value: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_deserializes_nws_shape() {
        let json = r#"{
            "number": 1,
            "name": "Tonight",
            "isDaytime": false,
            "temperature": 28,
            "temperatureTrend": null,
            "probabilityOfPrecipitation": {"unitCode": "wmoUnit:percent", "value": null},
            "shortForecast": "Mostly Clear",
            "detailedForecast": "Mostly clear, with a low around 28."
        }"#;
        let period: ForecastPeriod = serde_json::from_str(json).unwrap();
        assert_eq!(period.is_daytime, Some(false));
        assert_eq!(period.temperature, Some(28));
        assert_eq!(period.probability_of_precipitation.unwrap().value, None);
    }
}
