use std::time::Duration;

use anyhow::{Error, Result, anyhow, bail};
use async_stream::try_stream;
use futures_util::{Stream, StreamExt, stream::BoxStream};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum Role {
    #[serde(rename = "system")]
    System,
    #[serde(rename = "assistant")]
    Assistant,
    #[serde(rename = "user")]
    User,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: &str) -> Self {
        Message {
            role,
            content: content.to_string(),
        }
    }
}

/// Sampling parameters sent with every completion request.
#[derive(Clone, Debug, PartialEq)]
pub struct CompletionParams {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub stop: Option<Vec<String>>,
}

impl Default for CompletionParams {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            top_p: 1.0,
            max_tokens: 1024,
            stop: None,
        }
    }
}

/// A lazy sequence of reply fragments. Concatenating the fragments in
/// order yields the full reply.
pub type FragmentStream = BoxStream<'static, Result<String, Error>>;

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionChunkChoice {
    delta: Delta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<CompletionChunkChoice>,
    // Some providers report failures in-band after the stream started
    error: Option<Value>,
}

#[derive(Debug, PartialEq)]
enum ChunkEvent {
    Fragment(String),
    Skip,
    Finished(Option<String>),
}

fn parse_chunk(data: &str) -> Result<ChunkEvent, Error> {
    if data == "[DONE]" {
        return Ok(ChunkEvent::Finished(None));
    }

    let chunk = serde_json::from_str::<CompletionChunk>(data).inspect_err(|e| {
        tracing::error!("Parsing completion chunk failed for {}\nError:{}", data, e)
    })?;

    if let Some(err) = chunk.error {
        bail!("Completion stream returned an error: {}", err);
    }

    // Usage-only chunks have no choices
    let Some(choice) = chunk.choices.into_iter().next() else {
        return Ok(ChunkEvent::Skip);
    };
    let content = choice.delta.content.filter(|c| !c.is_empty());

    if choice.finish_reason.is_some() {
        return Ok(ChunkEvent::Finished(content));
    }

    Ok(match content {
        Some(c) => ChunkEvent::Fragment(c),
        None => ChunkEvent::Skip,
    })
}

/// Reassembles Server-Sent Events that arrive split across HTTP frames.
#[derive(Default)]
struct SseBuffer {
    buf: Vec<u8>,
}

impl SseBuffer {
    fn push(&mut self, bytes: &[u8]) {
        self.buf.extend(bytes.iter().filter(|b| **b != b'\r'));
    }

    /// Pops the payload of the next complete event that carries data.
    fn next_data(&mut self) -> Result<Option<String>, Error> {
        while let Some(end) = self.buf.windows(2).position(|w| w == b"\n\n") {
            let event: Vec<u8> = self.buf.drain(..end + 2).collect();
            let event = std::str::from_utf8(&event[..end])?;
            let data = event
                .lines()
                .filter_map(|line| line.strip_prefix("data:"))
                .map(str::trim)
                .collect::<Vec<_>>()
                .join("\n");

            if !data.is_empty() {
                return Ok(Some(data));
            }
        }
        Ok(None)
    }

    /// Terminates a trailing event that never got its blank line.
    fn finish(&mut self) -> Result<Option<String>, Error> {
        if self.buf.iter().all(u8::is_ascii_whitespace) {
            self.buf.clear();
            return Ok(None);
        }
        self.buf.extend_from_slice(b"\n\n");
        self.next_data()
    }
}

fn fragments<S, B>(bytes: S) -> impl Stream<Item = Result<String, Error>> + Send + 'static
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    try_stream! {
        let mut bytes = Box::pin(bytes);
        let mut buffer = SseBuffer::default();
        let mut finished = false;

        while !finished {
            let data = match buffer.next_data()? {
                Some(data) => data,
                None => match bytes.next().await {
                    Some(chunk) => {
                        buffer.push(chunk?.as_ref());
                        continue;
                    }
                    None => match buffer.finish()? {
                        Some(data) => data,
                        None => break,
                    },
                },
            };

            match parse_chunk(&data)? {
                ChunkEvent::Fragment(text) => yield text,
                ChunkEvent::Skip => {}
                ChunkEvent::Finished(text) => {
                    if let Some(text) = text {
                        yield text;
                    }
                    finished = true;
                }
            }
        }
    }
}

/// Sends `messages` to an OpenAI compatible chat completion endpoint
/// with streaming enabled and returns the reply as a stream of text
/// fragments. Fails early if the request can't be sent or the server
/// responds with a non-success status.
pub async fn completion_stream(
    messages: &[Message],
    params: &CompletionParams,
    api_hostname: &str,
    api_key: &str,
    model: &str,
) -> Result<FragmentStream, Error> {
    let payload = json!({
        "model": model,
        "messages": messages,
        "temperature": params.temperature,
        "top_p": params.top_p,
        "max_tokens": params.max_tokens,
        "stream": true,
        "stop": params.stop,
    });
    let url = format!("{}/v1/chat/completions", api_hostname.trim_end_matches("/"));
    let response = reqwest::Client::new()
        .post(url)
        .bearer_auth(api_key)
        .header("Content-Type", "application/json")
        .timeout(Duration::from_secs(60 * 5))
        .json(&payload)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(anyhow!(
            "Completion request failed with status {}: {}",
            status,
            body
        ));
    }

    Ok(fragments(response.bytes_stream()).boxed())
}
