pub mod authz;
pub mod commands;
pub mod config;
pub mod core_link;
pub mod core_membership;
pub mod core_rally;
pub mod core_sweep;
pub mod gateway;
pub mod http;
pub mod logging;
pub mod metrics;
pub mod shutdown;

pub use config::Config;
pub use logging::{init_logging, LogLevel};
