// Pure feature computation
pub mod feature_calculator;

// CSV export of computed rows
pub mod export;

// Reader -> Calculator -> Loader orchestration
pub mod pipeline;
