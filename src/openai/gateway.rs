use std::sync::Arc;

use anyhow::{Error, Result};
use async_trait::async_trait;

use super::core::{CompletionParams, FragmentStream, Message, completion_stream};
use crate::core::AppConfig;

/// The boundary to the hosted model. Implementations send `messages` as
/// a single request and return the reply as it arrives. They never touch
/// the transcript.
#[async_trait]
pub trait CompletionGateway {
    async fn stream(&self, messages: &[Message]) -> Result<FragmentStream, Error>;
}

pub type BoxedGateway = Arc<dyn CompletionGateway + Send + Sync + 'static>;

/// Gateway for any OpenAI compatible chat completion API (Groq by
/// default).
#[derive(Clone, Debug)]
pub struct OpenAiGateway {
    api_hostname: String,
    api_key: String,
    model: String,
    params: CompletionParams,
}

impl OpenAiGateway {
    pub fn new(api_hostname: &str, api_key: &str, model: &str) -> Self {
        Self {
            api_hostname: api_hostname.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            params: CompletionParams::default(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            &config.llm_api_hostname,
            &config.llm_api_key,
            &config.llm_model,
        )
    }
}

#[async_trait]
impl CompletionGateway for OpenAiGateway {
    async fn stream(&self, messages: &[Message]) -> Result<FragmentStream, Error> {
        tracing::debug!(
            "Requesting completion from {} with {} messages",
            self.model,
            messages.len()
        );
        completion_stream(
            messages,
            &self.params,
            &self.api_hostname,
            &self.api_key,
            &self.model,
        )
        .await
    }
}
