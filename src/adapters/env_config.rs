//! Environment + JSON-file configuration adapter.
//!
//! Layering, later wins:
//!
//! 1. [`SupervisorConfig::default()`]
//! 2. optional JSON file (any subset of fields)
//! 3. environment: `TB_URL`, `TB_USERNAME`, `TB_PASSWORD`, `DEVICE_ID`,
//!    `OLLAMA_URL`, `OLLAMA_MODEL`
//!
//! The result is validated before it is returned.

use std::path::PathBuf;

use log::info;

use crate::app::ports::ConfigPort;
use crate::config::SupervisorConfig;
use crate::error::ConfigError;

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

pub struct EnvConfigAdapter {
    file: Option<PathBuf>,
    lookup: Lookup,
}

impl EnvConfigAdapter {
    /// Read overrides from the process environment.
    pub fn new(file: Option<PathBuf>) -> Self {
        Self::from_lookup(file, |key| std::env::var(key).ok())
    }

    /// Read overrides through `lookup` instead of the process environment.
    pub fn from_lookup(
        file: Option<PathBuf>,
        lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            file,
            lookup: Box::new(lookup),
        }
    }

    fn read_file(&self) -> Result<SupervisorConfig, ConfigError> {
        let Some(path) = &self.file else {
            return Ok(SupervisorConfig::default());
        };
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        let cfg = serde_json::from_str(&text)
            .map_err(|e| ConfigError::Parse(format!("{}: {e}", path.display())))?;
        info!("Config file {} loaded", path.display());
        Ok(cfg)
    }

    fn apply_env(&self, cfg: &mut SupervisorConfig) {
        let overrides: [(&str, &mut String); 6] = [
            ("TB_URL", &mut cfg.platform_url),
            ("TB_USERNAME", &mut cfg.username),
            ("TB_PASSWORD", &mut cfg.password),
            ("DEVICE_ID", &mut cfg.device_id),
            ("OLLAMA_URL", &mut cfg.oracle_url),
            ("OLLAMA_MODEL", &mut cfg.oracle_model),
        ];
        for (key, field) in overrides {
            if let Some(v) = (self.lookup)(key).filter(|v| !v.trim().is_empty()) {
                *field = v.trim().to_string();
            }
        }
    }
}

impl ConfigPort for EnvConfigAdapter {
    fn load(&self) -> Result<SupervisorConfig, ConfigError> {
        let mut cfg = self.read_file()?;
        self.apply_env(&mut cfg);
        cfg.validate()?;
        Ok(cfg)
    }
}
