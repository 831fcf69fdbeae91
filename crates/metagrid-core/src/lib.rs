pub mod config;
pub mod types;

pub use config::MetagridConfig;
pub use types::*;
