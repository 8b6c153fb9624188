//! Environment configuration

use crate::generation::Prompts;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_IMAGE_MODEL: &str = "dall-e-3";
const DEFAULT_TEXT_MODEL: &str = "gpt-4o";
const DEFAULT_IMAGE_QUALITY: &str = "standard";
const DEFAULT_IMAGE_STYLE: &str = "vivid";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const TIMEOUT_RANGE_SECS: (u64, u64) = (10, 300);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{var} has invalid value {value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Settings for the `OpenAI`-compatible image pipeline
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub image_model: String,
    pub text_model: String,
    pub image_quality: String,
    pub image_style: String,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub telegram_token: String,
    pub openai: OpenAiConfig,
    pub prompts: Prompts,
    pub db_path: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let require = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));
        let or_default = |name: &str, default: &str| get(name).unwrap_or_else(|| default.to_string());

        let timeout_secs = match get("OPENAI_REQUEST_TIMEOUT_SECS") {
            None => DEFAULT_TIMEOUT_SECS,
            Some(raw) => parse_timeout(&raw)?,
        };

        let defaults = Prompts::default();
        let prompts = Prompts {
            outfit_system: get("PROMPT_OUTFIT_SYSTEM").unwrap_or(defaults.outfit_system),
            outfit_user: get("PROMPT_OUTFIT_USER").unwrap_or(defaults.outfit_user),
            matching_system: get("PROMPT_MATCHING_SYSTEM").unwrap_or(defaults.matching_system),
            matching_user: get("PROMPT_MATCHING_USER").unwrap_or(defaults.matching_user),
        };

        let db_path = get("OUTFIT_BOT_DB_PATH").map_or_else(
            || {
                let home = get("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(format!("{home}/.outfit-bot/outfit.db"))
            },
            PathBuf::from,
        );

        Ok(Self {
            telegram_token: require("TELEGRAM_BOT_TOKEN")?,
            openai: OpenAiConfig {
                api_key: require("OPENAI_API_KEY")?,
                base_url: or_default("OPENAI_BASE_URL", DEFAULT_BASE_URL)
                    .trim_end_matches('/')
                    .to_string(),
                image_model: or_default("OPENAI_IMAGE_MODEL", DEFAULT_IMAGE_MODEL),
                text_model: or_default("OPENAI_TEXT_MODEL", DEFAULT_TEXT_MODEL),
                image_quality: or_default("OPENAI_IMAGE_QUALITY", DEFAULT_IMAGE_QUALITY),
                image_style: or_default("OPENAI_IMAGE_STYLE", DEFAULT_IMAGE_STYLE),
                request_timeout: Duration::from_secs(timeout_secs),
            },
            prompts,
            db_path,
        })
    }
}

fn parse_timeout(raw: &str) -> Result<u64, ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid {
        var: "OPENAI_REQUEST_TIMEOUT_SECS",
        value: raw.to_string(),
        reason,
    };
    let secs: u64 = raw.trim().parse().map_err(|e| invalid(format!("{e}")))?;
    let (min, max) = TIMEOUT_RANGE_SECS;
    if !(min..=max).contains(&secs) {
        return Err(invalid(format!("must be between {min} and {max} seconds")));
    }
    Ok(secs)
}
