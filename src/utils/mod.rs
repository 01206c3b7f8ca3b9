pub mod env;
pub mod logging;
pub mod progress_config;
