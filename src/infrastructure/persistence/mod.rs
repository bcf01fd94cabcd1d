pub mod database;
pub mod repositories;

pub use database::{PostgresDatabase, SqliteDatabase};
pub use repositories::{
    PgFeatureRepository, PgPriceRepository, SqliteFeatureRepository, SqlitePriceRepository,
};
