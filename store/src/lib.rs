pub mod config;
pub mod store;

pub use config::InsightsConfig;
pub use store::Store;
