//! Test utilities for integration tests
#![allow(dead_code)]

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use axum::{Router, body::Body};
use futures_util::{StreamExt, stream};

use gym_assistant::api::AppState;
use gym_assistant::api::app;
use gym_assistant::core::AppConfig;
use gym_assistant::openai::{BoxedGateway, CompletionGateway, FragmentStream, Message};

pub const TEST_SYSTEM_PROMPT: &str = "You're a gym buddy texting fitness advice.";

/// What the simulated completion API does for every request.
#[derive(Clone)]
pub enum Script {
    Reply(Vec<&'static str>),
    Fail(&'static str),
    // Streams some fragments and then the connection drops
    FailAfter(Vec<&'static str>, &'static str),
    // Never produces a fragment
    Hang,
}

/// Stands in for the hosted model and records every request.
pub struct FakeGateway {
    script: Script,
    pub requests: Mutex<Vec<Vec<Message>>>,
}

impl FakeGateway {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionGateway for FakeGateway {
    async fn stream(&self, messages: &[Message]) -> Result<FragmentStream, Error> {
        self.requests.lock().unwrap().push(messages.to_vec());
        match &self.script {
            Script::Reply(fragments) => {
                let items: Vec<Result<String, Error>> =
                    fragments.iter().map(|f| Ok(f.to_string())).collect();
                Ok(stream::iter(items).boxed())
            }
            Script::Fail(reason) => Err(anyhow!("{}", reason)),
            Script::FailAfter(fragments, reason) => {
                let mut items: Vec<Result<String, Error>> =
                    fragments.iter().map(|f| Ok(f.to_string())).collect();
                items.push(Err(anyhow!("{}", reason)));
                Ok(stream::iter(items).boxed())
            }
            Script::Hang => Ok(stream::pending().boxed()),
        }
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        llm_api_hostname: String::from("http://localhost:9"),
        llm_api_key: String::from("test-api-key"),
        llm_model: String::from("llama3-70b-8192"),
        max_history_turns: None,
        session_idle_timeout: Duration::from_secs(3600),
    }
}

/// Creates a test application router backed by `gateway`.
pub fn test_app(gateway: Arc<FakeGateway>) -> Router {
    let gateway: BoxedGateway = gateway;
    let app_state = AppState::new(test_config(), gateway, TEST_SYSTEM_PROMPT);
    app(Arc::new(RwLock::new(app_state)))
}

pub async fn body_to_string(body: Body) -> String {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Failed to read body");
    String::from_utf8(bytes.to_vec()).expect("Body is not valid UTF-8")
}

/// Extracts the JSON payload of each SSE event in `body`.
pub fn sse_payloads(body: &str) -> Vec<serde_json::Value> {
    body.split("\n\n")
        .filter_map(|event| {
            let data: Vec<&str> = event
                .lines()
                .filter_map(|line| line.strip_prefix("data:"))
                .map(str::trim)
                .collect();
            if data.is_empty() {
                None
            } else {
                serde_json::from_str(&data.join("\n")).ok()
            }
        })
        .collect()
}
