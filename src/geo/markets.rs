use crate::models::{Coordinate, MarketAnchor};

/// Mean earth radius in miles.
pub const EARTH_RADIUS_MILES: f64 = 3959.0;

/// Great-circle distance between two points, in miles.
pub fn haversine_miles(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_MILES * c
}

/// Static market configuration: anchors, the large-city shortlist that always
/// maps to At Large, and exact-match aliases.
#[derive(Debug, Clone)]
pub struct MarketTable {
    anchors: Vec<MarketAnchor>,
    large_cities: Vec<String>,
    aliases: Vec<(String, String)>,
}

impl MarketTable {
    pub fn new(
        anchors: Vec<MarketAnchor>,
        large_cities: Vec<String>,
        aliases: Vec<(String, String)>,
    ) -> Self {
        Self {
            anchors,
            large_cities: large_cities.into_iter().map(|c| c.to_lowercase()).collect(),
            aliases: aliases
                .into_iter()
                .map(|(alias, market)| (alias.to_lowercase(), market))
                .collect(),
        }
    }

    /// The Kansas markets with approximate city-center anchors.
    pub fn kansas() -> Self {
        let mut table = Self::new(Vec::new(), Vec::new(), Vec::new());

        table.add_market("Ark Valley", 37.0619, -97.0386, "Arkansas City");
        table.add_market("Pittsburg", 37.4109, -94.7049, "Pittsburg");
        table.add_market("Liberal", 37.0431, -100.9212, "Liberal");
        table.add_market("Garden City", 37.9717, -100.8727, "Garden City");
        table.add_market("Dodge City", 37.7528, -100.0171, "Dodge City");
        table.add_market("Great Bend", 38.3645, -98.7648, "Great Bend");
        table.add_market("McPherson", 38.3706, -97.6642, "McPherson");
        table.add_market("Salina", 38.8403, -97.6114, "Salina");
        table.add_market("Hutchinson", 38.0608, -97.9298, "Hutchinson");
        table.add_market("Abilene", 38.9172, -97.2137, "Abilene");
        table.add_market("Junction City", 39.0286, -96.8314, "Junction City");
        table.add_market("Manhattan", 39.1836, -96.5717, "Manhattan");
        table.add_market("Topeka", 39.0473, -95.6752, "Topeka");
        table.add_market("Lawrence", 38.9717, -95.2353, "Lawrence");
        table.add_market("Hays", 38.8794, -99.3268, "Hays");
        table.add_market("Emporia", 38.4039, -96.1817, "Emporia");

        // Metros large enough to be their own audience
        for city in ["wichita", "kansas city", "overland park", "olathe"] {
            table.large_cities.push(city.to_string());
        }

        for alias in ["ark city", "arkansas city", "winfield", "wellington"] {
            table.aliases.push((alias.to_string(), "Ark Valley".to_string()));
        }

        table
    }

    fn add_market(&mut self, name: &str, lat: f64, lon: f64, weather_city: &str) {
        self.anchors.push(MarketAnchor {
            name: name.to_string(),
            anchor: Coordinate::new(lat, lon),
            weather_city: weather_city.to_string(),
        });
    }

    pub fn is_large_city(&self, location: &str) -> bool {
        let lower = location.to_lowercase();
        self.large_cities.iter().any(|city| lower.contains(city.as_str()))
    }

    pub fn alias(&self, location: &str) -> Option<&str> {
        let lower = location.trim().to_lowercase();
        self.aliases
            .iter()
            .find(|(alias, _)| *alias == lower)
            .map(|(_, market)| market.as_str())
    }

    pub fn by_name(&self, location: &str) -> Option<&MarketAnchor> {
        let lower = location.trim().to_lowercase();
        self.anchors.iter().find(|m| m.name.to_lowercase() == lower)
    }

    /// Nearest anchor and its distance. Ties keep the earlier anchor.
    pub fn nearest(&self, point: Coordinate) -> Option<(&MarketAnchor, f64)> {
        let mut best: Option<(&MarketAnchor, f64)> = None;
        for market in &self.anchors {
            let distance = haversine_miles(point, market.anchor);
            match best {
                Some((_, d)) if distance >= d => {}
                _ => best = Some((market, distance)),
            }
        }
        best
    }

    /// Market names in display order, At Large last.
    pub fn market_names(&self) -> Vec<String> {
        self.anchors
            .iter()
            .map(|m| m.name.clone())
            .chain(std::iter::once(crate::models::AT_LARGE.to_string()))
            .collect()
    }

    /// One `(city, coordinate)` per market, for forecasts.
    pub fn weather_cities(&self) -> Vec<(String, Coordinate)> {
        self.anchors
            .iter()
            .map(|m| (m.weather_city.clone(), m.anchor))
            .collect()
    }
}

impl Default for MarketTable {
    fn default() -> Self {
        Self::kansas()
    }
}
