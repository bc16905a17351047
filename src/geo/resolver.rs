use std::sync::Arc;

use crate::config::GeoConfig;
use crate::geo::geocoder::Geocoder;
use crate::geo::markets::MarketTable;
use crate::models::MarketName;

/// Maps free-text locations onto markets.
///
/// Resolution order, first match wins:
/// 1. substring match against the large-city shortlist → At Large
/// 2. exact alias match
/// 3. exact market-name match
/// 4. geocode, then nearest anchor within the configured radius; anything
///    farther (or any geocoding failure) → At Large
pub struct GeoResolver {
    markets: Arc<MarketTable>,
    geocoder: Arc<dyn Geocoder>,
    config: GeoConfig,
}

impl GeoResolver {
    pub fn new(markets: Arc<MarketTable>, geocoder: Arc<dyn Geocoder>, config: GeoConfig) -> Self {
        Self {
            markets,
            geocoder,
            config,
        }
    }

    pub fn markets(&self) -> &MarketTable {
        &self.markets
    }

    pub async fn resolve(&self, location: &str) -> MarketName {
        if self.markets.is_large_city(location) {
            return MarketName::AtLarge;
        }

        if let Some(market) = self.markets.alias(location) {
            return MarketName::from(market);
        }

        if let Some(market) = self.markets.by_name(location) {
            return MarketName::named(market.name.clone());
        }

        let query = format!(
            "{}, {}, {}",
            location, self.config.region, self.config.country
        );

        let point = match self.geocoder.geocode(&query).await {
            Ok(Some(point)) => point,
            Ok(None) => {
                tracing::debug!("No geocoding result for '{}'", location);
                return MarketName::AtLarge;
            }
            Err(e) => {
                tracing::warn!("Geocoding failed for '{}': {}", location, e);
                return MarketName::AtLarge;
            }
        };

        match self.markets.nearest(point) {
            Some((market, distance)) if distance <= self.config.radius_miles => {
                tracing::debug!(
                    "'{}' is {:.1}mi from {}",
                    location,
                    distance,
                    market.name
                );
                MarketName::named(market.name.clone())
            }
            _ => MarketName::AtLarge,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::models::Coordinate;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Geocoder returning a fixed answer and recording every query.
    pub(crate) struct StubGeocoder {
        answer: Option<Coordinate>,
        fail: bool,
        pub queries: Mutex<Vec<String>>,
    }

    impl StubGeocoder {
        pub(crate) fn returning(answer: Option<Coordinate>) -> Self {
            Self {
                answer,
                fail: false,
                queries: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn failing() -> Self {
            Self {
                answer: None,
                fail: true,
                queries: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.queries.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Geocoder for StubGeocoder {
        async fn geocode(&self, query: &str) -> Result<Option<Coordinate>> {
            self.queries.lock().unwrap().push(query.to_string());
            if self.fail {
                return Err(Error::Geocoding("connection refused".into()));
            }
            Ok(self.answer)
        }
    }

    fn resolver(geocoder: Arc<StubGeocoder>) -> GeoResolver {
        GeoResolver::new(
            Arc::new(MarketTable::kansas()),
            geocoder,
            GeoConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_exact_market_name_skips_geocoding() {
        let geocoder = Arc::new(StubGeocoder::returning(None));
        let resolver = resolver(geocoder.clone());

        assert_eq!(resolver.resolve("Topeka").await, MarketName::named("Topeka"));
        assert_eq!(resolver.resolve("garden city").await, MarketName::named("Garden City"));
        assert_eq!(geocoder.calls(), 0);
    }

    #[tokio::test]
    async fn test_large_city_is_at_large_without_geocoding() {
        let geocoder = Arc::new(StubGeocoder::returning(Some(Coordinate::new(39.0473, -95.6752))));
        let resolver = resolver(geocoder.clone());

        assert_eq!(resolver.resolve("Wichita").await, MarketName::AtLarge);
        assert_eq!(resolver.resolve("downtown Overland Park").await, MarketName::AtLarge);
        assert_eq!(geocoder.calls(), 0);
    }

    #[tokio::test]
    async fn test_alias_maps_to_market() {
        let geocoder = Arc::new(StubGeocoder::returning(None));
        let resolver = resolver(geocoder.clone());

        assert_eq!(resolver.resolve("Winfield").await, MarketName::named("Ark Valley"));
        assert_eq!(geocoder.calls(), 0);
    }

    #[tokio::test]
    async fn test_nearby_town_resolves_to_nearest_market() {
        // 6 miles due north of the Topeka anchor
        let point = Coordinate::new(39.1342, -95.6752);
        let geocoder = Arc::new(StubGeocoder::returning(Some(point)));
        let resolver = resolver(geocoder.clone());

        let market = resolver.resolve("Smallville, 5 miles from Topeka").await;
        assert_eq!(market, MarketName::named("Topeka"));

        let queries = geocoder.queries.lock().unwrap();
        assert_eq!(queries.as_slice(), ["Smallville, 5 miles from Topeka, Kansas, USA"]);
    }

    #[tokio::test]
    async fn test_far_from_every_anchor_is_at_large() {
        // Denver
        let geocoder = Arc::new(StubGeocoder::returning(Some(Coordinate::new(39.7392, -104.9903))));
        let resolver = resolver(geocoder);

        assert_eq!(resolver.resolve("Denver").await, MarketName::AtLarge);
    }

    #[tokio::test]
    async fn test_radius_boundary() {
        // ~14.3mi from Manhattan
        let point = Coordinate::new(39.2028, -96.3050);
        let geocoder = Arc::new(StubGeocoder::returning(Some(point)));
        let markets = Arc::new(MarketTable::kansas());

        let wide = GeoResolver::new(markets.clone(), geocoder.clone(), GeoConfig::default());
        assert_eq!(wide.resolve("Wamego").await, MarketName::named("Manhattan"));

        let narrow = GeoResolver::new(
            markets,
            geocoder,
            GeoConfig {
                radius_miles: 10.0,
                ..GeoConfig::default()
            },
        );
        assert_eq!(narrow.resolve("Wamego").await, MarketName::AtLarge);
    }

    #[tokio::test]
    async fn test_geocoding_failure_degrades_to_at_large() {
        let geocoder = Arc::new(StubGeocoder::failing());
        let resolver = resolver(geocoder.clone());

        assert_eq!(resolver.resolve("Nowhere Junction").await, MarketName::AtLarge);
        assert_eq!(geocoder.calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_location_is_sent_to_geocoder() {
        let geocoder = Arc::new(StubGeocoder::returning(None));
        let resolver = resolver(geocoder.clone());

        assert_eq!(resolver.resolve("").await, MarketName::AtLarge);
        assert_eq!(geocoder.calls(), 1);
    }
}
