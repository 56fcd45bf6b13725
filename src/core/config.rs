use std::env;
use std::time::Duration;

use anyhow::{Error, Result, anyhow};

pub const API_KEY_VAR: &str = "GROQ_API_KEY";
pub const LLM_HOST_VAR: &str = "GYM_LLM_HOST";
pub const LLM_MODEL_VAR: &str = "GYM_LLM_MODEL";
pub const MAX_HISTORY_TURNS_VAR: &str = "GYM_MAX_HISTORY_TURNS";
pub const SESSION_IDLE_SECS_VAR: &str = "GYM_SESSION_IDLE_SECS";

const DEFAULT_LLM_HOST: &str = "https://api.groq.com/openai";
const DEFAULT_LLM_MODEL: &str = "llama3-70b-8192";
const DEFAULT_SESSION_IDLE_SECS: u64 = 60 * 60;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub llm_api_hostname: String,
    pub llm_api_key: String,
    pub llm_model: String,
    /// Limits how many of the most recent turns are sent with each
    /// request. `None` sends the whole transcript.
    pub max_history_turns: Option<usize>,
    /// Server sessions with no activity for this long are discarded.
    pub session_idle_timeout: Duration,
}

impl AppConfig {
    /// Reads the config from the process environment after loading an
    /// optional `.env` file from the working directory.
    pub fn from_env() -> Result<Self, Error> {
        if let Ok(path) = dotenv::dotenv() {
            tracing::debug!("Loaded environment from {}", path.display());
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config using `lookup` to resolve each variable. The API
    /// key is required and an empty value counts as missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let llm_api_key = lookup(API_KEY_VAR)
            .filter(|v| !v.trim().is_empty())
            .ok_or(anyhow!(
                "Missing env var {}. Set it in a .env file for local development or in your deployment's secret store.",
                API_KEY_VAR
            ))?;
        let llm_api_hostname =
            lookup(LLM_HOST_VAR).unwrap_or_else(|| DEFAULT_LLM_HOST.to_string());
        let llm_model = lookup(LLM_MODEL_VAR).unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string());
        let max_history_turns = match lookup(MAX_HISTORY_TURNS_VAR) {
            Some(v) => {
                let n = v.trim().parse::<usize>().map_err(|e| {
                    anyhow!("Invalid {}={:?}: {}", MAX_HISTORY_TURNS_VAR, v, e)
                })?;
                if n == 0 {
                    return Err(anyhow!("{} must be greater than 0", MAX_HISTORY_TURNS_VAR));
                }
                Some(n)
            }
            None => None,
        };
        let idle_secs = match lookup(SESSION_IDLE_SECS_VAR) {
            Some(v) => v.trim().parse::<u64>().map_err(|e| {
                anyhow!("Invalid {}={:?}: {}", SESSION_IDLE_SECS_VAR, v, e)
            })?,
            None => DEFAULT_SESSION_IDLE_SECS,
        };
        if idle_secs == 0 {
            return Err(anyhow!("{} must be greater than 0", SESSION_IDLE_SECS_VAR));
        }

        Ok(Self {
            llm_api_hostname,
            llm_api_key,
            llm_model,
            max_history_turns,
            session_idle_timeout: Duration::from_secs(idle_secs),
        })
    }
}
