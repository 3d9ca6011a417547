pub mod config;
pub mod types;

pub use config::BeaconConfig;
pub use types::*;
