use std::env;
use std::path::PathBuf;
use std::time::Duration;

use cad_ai::{DEFAULT_GEMINI_BASE_URL, DEFAULT_GEMINI_MODEL, GeminiConfig};
use cad_artifacts::{DEFAULT_COMPILER, DEFAULT_CONVERSION_TIMEOUT, MeshConverter};

pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8000";
pub const DEFAULT_ARTIFACT_DIR: &str = "artifacts";

/// Server configuration read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    pub artifact_dir: PathBuf,
    pub gemini: GeminiConfig,
    /// Geometry compiler executable.
    pub compiler: String,
    /// Extra compiler arguments placed before `-o`.
    pub compiler_args: Vec<String>,
    pub conversion_timeout: Option<Duration>,
    /// Single allowed CORS origin; any origin when unset.
    pub frontend_origin: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let api_key = get("GEMINI_API_KEY").ok_or(ConfigError::Missing("GEMINI_API_KEY"))?;
        let gemini = GeminiConfig {
            api_key,
            model: get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            base_url: get("GEMINI_BASE_URL").unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            timeout: parse_seconds("MODEL_TIMEOUT_SECS", get("MODEL_TIMEOUT_SECS"))?,
        };

        let conversion_timeout = match get("CONVERSION_TIMEOUT_SECS") {
            Some(value) => parse_seconds("CONVERSION_TIMEOUT_SECS", Some(value))?,
            None => Some(DEFAULT_CONVERSION_TIMEOUT),
        };

        Ok(Self {
            bind_address: get("BIND_ADDRESS").unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string()),
            artifact_dir: get("ARTIFACT_DIR")
                .unwrap_or_else(|| DEFAULT_ARTIFACT_DIR.to_string())
                .into(),
            gemini,
            compiler: get("OPENSCAD_BIN").unwrap_or_else(|| DEFAULT_COMPILER.to_string()),
            compiler_args: get("OPENSCAD_ARGS")
                .map(|args| args.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            conversion_timeout,
            frontend_origin: get("FRONTEND_ORIGIN"),
        })
    }

    pub fn mesh_converter(&self) -> MeshConverter {
        MeshConverter::new(&self.compiler)
            .with_args(&self.compiler_args)
            .with_timeout(self.conversion_timeout)
    }
}

/// `0` disables the timeout.
fn parse_seconds(key: &'static str, value: Option<String>) -> Result<Option<Duration>, ConfigError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let seconds = value
        .trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid {
            key,
            value: value.clone(),
        })?;
    Ok((seconds > 0).then(|| Duration::from_secs(seconds)))
}
