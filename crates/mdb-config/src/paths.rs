use std::path::PathBuf;

use crate::error::ConfigError;

const APP_DIR: &str = "mdb-bridge";

/// Standard directories used by the bridge.
pub trait PlatformPaths: Send + Sync {
    /// Returns the configuration directory (`~/.config/mdb-bridge`).
    fn config_dir(&self) -> PathBuf;
    /// Returns the data directory (`~/.local/share/mdb-bridge`).
    fn data_dir(&self) -> PathBuf;
    /// Returns the log directory (`<data_dir>/logs`).
    fn log_dir(&self) -> PathBuf {
        self.data_dir().join("logs")
    }
}

/// [`PlatformPaths`] rooted at the user's home directory.
pub struct DefaultPaths {
    home: PathBuf,
}

impl DefaultPaths {
    /// Resolve the home directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Path`] if the home directory cannot be
    /// determined.
    pub fn new() -> Result<Self, ConfigError> {
        let home = dirs::home_dir()
            .or_else(|| std::env::var("HOME").ok().map(PathBuf::from))
            .ok_or_else(|| ConfigError::Path("could not determine home directory".into()))?;
        Ok(Self { home })
    }

    /// Paths under an explicit home directory.
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }
}

impl PlatformPaths for DefaultPaths {
    fn config_dir(&self) -> PathBuf {
        self.home.join(".config").join(APP_DIR)
    }

    fn data_dir(&self) -> PathBuf {
        self.home.join(".local").join("share").join(APP_DIR)
    }
}
