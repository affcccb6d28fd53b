pub mod acquisition;
pub mod classifier;
pub mod config;
pub mod features;
pub mod metrics;
pub mod plot;
pub mod recordings;
pub mod relay;
