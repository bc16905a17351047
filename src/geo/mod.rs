pub mod geocoder;
pub mod markets;
pub mod resolver;

pub use geocoder::{Geocoder, NominatimGeocoder};
pub use markets::{haversine_miles, MarketTable};
pub use resolver::GeoResolver;
