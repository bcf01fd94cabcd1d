pub mod persistence;
pub mod repositories;

pub use repositories::{InMemoryFeatureRepository, InMemoryPriceRepository};
