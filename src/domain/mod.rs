// Price bars, feature rows, ranges
pub mod types;

// Repository traits
pub mod repositories;

// Domain-specific error types
pub mod errors;
