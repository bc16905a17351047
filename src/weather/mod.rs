pub mod client;
pub mod enricher;

pub use client::{NwsClient, WeatherService};
pub use enricher::WeatherEnricher;
