//! mdb-config — configuration loading for mdb-bridge.
pub mod config;
pub mod error;
pub mod load;
pub mod logging;
pub mod merge;
pub mod paths;
pub mod validate;

pub use config::{Config, DebuggerConfig, LogConfig, LogLevel, OptionEntry, TargetConfig, TimeoutConfig};
pub use error::ConfigError;
pub use load::{load_config, load_file, load_from_str};
pub use paths::{DefaultPaths, PlatformPaths};
