//! Runtime configuration for fused subgraph execution.
//!
//! Loads [`SubgraphConfig`] from a TOML file with environment variable
//! overrides via `FUSENET_*` prefixed variables.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::SimdLevel;

/// Upper bound on the vector tier used when choosing internal layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimdPreference {
    /// Use whatever the host supports.
    #[default]
    Auto,
    Avx512,
    Avx2,
    /// Never pick a blocked layout.
    Scalar,
}

impl SimdPreference {
    /// Highest tier allowed, or `None` for no cap.
    pub fn cap(self) -> Option<SimdLevel> {
        match self {
            Self::Auto => None,
            Self::Avx512 => Some(SimdLevel::Avx512),
            Self::Avx2 => Some(SimdLevel::Avx2),
            Self::Scalar => Some(SimdLevel::Scalar),
        }
    }
}

impl std::fmt::Display for SimdPreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Avx512 => write!(f, "avx512"),
            Self::Avx2 => write!(f, "avx2"),
            Self::Scalar => write!(f, "scalar"),
        }
    }
}

impl std::str::FromStr for SimdPreference {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "avx512" => Ok(Self::Avx512),
            "avx2" => Ok(Self::Avx2),
            "scalar" | "none" => Ok(Self::Scalar),
            other => Err(format!("unknown simd preference: {other}")),
        }
    }
}

/// Configuration loaded from TOML with environment variable overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubgraphConfig {
    /// Vector tier cap for layout selection.
    /// Override: `FUSENET_SIMD`
    pub simd: SimdPreference,

    /// Idle scratch bytes kept for reuse across binds.
    /// Override: `FUSENET_SCRATCH_POOL_LIMIT`
    pub scratch_pool_limit: usize,

    /// Maximum live scratch plus intermediate bytes; unset means unbounded.
    /// Override: `FUSENET_ALLOCATION_LIMIT`
    pub allocation_limit: Option<usize>,
}

impl Default for SubgraphConfig {
    fn default() -> Self {
        Self { simd: SimdPreference::Auto, scratch_pool_limit: 64 * 1024 * 1024, allocation_limit: None }
    }
}

/// Errors that can occur when loading or validating a [`SubgraphConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to render TOML: {0}")]
    Render(#[from] toml::ser::Error),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("invalid environment override {key}={value}: {reason}")]
    EnvOverride { key: String, value: String, reason: String },
}

impl SubgraphConfig {
    /// Default configuration rendered as TOML.
    pub fn default_toml() -> Result<String, ConfigFileError> {
        Ok(toml::to_string_pretty(&Self::default())?)
    }

    /// Load from a TOML file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigFileError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigFileError> {
        let mut cfg: SubgraphConfig = toml::from_str(toml_str)?;
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Result<Self, ConfigFileError> {
        let mut cfg = Self::default();
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigFileError> {
        if let Some(limit) = self.allocation_limit {
            if limit == 0 {
                return Err(ConfigFileError::Validation("allocation_limit must be > 0 when set".into()));
            }
            if self.scratch_pool_limit > limit {
                return Err(ConfigFileError::Validation(format!(
                    "scratch_pool_limit ({}) exceeds allocation_limit ({limit})",
                    self.scratch_pool_limit
                )));
            }
        }
        Ok(())
    }

    /// Apply `FUSENET_*` environment variable overrides.
    ///
    /// `FUSENET_ALLOCATION_LIMIT` accepts `none` or an empty value to clear
    /// the limit. `0` is a limit like any other and fails validation.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigFileError> {
        if let Ok(val) = std::env::var("FUSENET_SIMD") {
            self.simd = val.parse::<SimdPreference>().map_err(|reason| ConfigFileError::EnvOverride {
                key: "FUSENET_SIMD".into(),
                value: val.clone(),
                reason,
            })?;
        }

        if let Ok(val) = std::env::var("FUSENET_SCRATCH_POOL_LIMIT") {
            self.scratch_pool_limit = val.parse::<usize>().map_err(|e| ConfigFileError::EnvOverride {
                key: "FUSENET_SCRATCH_POOL_LIMIT".into(),
                value: val.clone(),
                reason: e.to_string(),
            })?;
        }

        if let Ok(val) = std::env::var("FUSENET_ALLOCATION_LIMIT") {
            self.allocation_limit = match val.as_str() {
                "" | "none" => None,
                _ => Some(val.parse::<usize>().map_err(|e| ConfigFileError::EnvOverride {
                    key: "FUSENET_ALLOCATION_LIMIT".into(),
                    value: val.clone(),
                    reason: e.to_string(),
                })?),
            };
        }

        Ok(())
    }
}
