use anyhow::{Error, Result};
use futures_util::StreamExt;

use super::models::{Transcript, Turn};
use crate::openai::{BoxedGateway, Message, Role};

/// One conversation with the hosted model.
///
/// Owns the transcript for the lifetime of the session. Every turn sends
/// the system prompt, the stored transcript and the new user message to
/// the gateway and records the streamed reply. Failures talking to the
/// model never escape `next_msg`: they become the assistant's reply so
/// the conversation can carry on.
///
/// Use `ChatBuilder` to construct a `Chat`.
pub struct Chat {
    gateway: BoxedGateway,
    system_prompt: String,
    transcript: Transcript,
    max_history_turns: Option<usize>,
}

impl Chat {
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn clear(&mut self) {
        tracing::debug!("Clearing transcript of {} turns", self.transcript.len());
        self.transcript.clear();
    }

    /// The messages sent to the model when `text` is submitted next.
    pub fn request_messages(&self, text: &str) -> Vec<Message> {
        let history = self.transcript.recent(self.max_history_turns);
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::new(Role::System, &self.system_prompt));
        messages.extend(history.iter().map(Message::from));
        messages.push(Message::new(Role::User, text));
        messages
    }

    /// Runs the next turn of the chat. Each fragment of the reply is
    /// passed to `on_fragment` as it arrives and the assembled reply is
    /// recorded in the transcript and returned.
    pub async fn next_msg<F>(&mut self, text: &str, mut on_fragment: F) -> Turn
    where
        F: FnMut(&str) + Send,
    {
        let messages = self.request_messages(text);
        self.transcript.append(Turn::user(text));

        let reply = match self.stream_reply(&messages, &mut on_fragment).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!("Chat completion error: {}. Root cause: {}", e, e.root_cause());
                let err_msg = format!(
                    "Sorry, I'm having trouble connecting right now. Error: {}",
                    e
                );
                on_fragment(&err_msg);
                err_msg
            }
        };

        let turn = Turn::assistant(&reply);
        self.transcript.append(turn.clone());
        turn
    }

    async fn stream_reply<F>(&self, messages: &[Message], on_fragment: &mut F) -> Result<String, Error>
    where
        F: FnMut(&str) + Send,
    {
        let mut fragments = self.gateway.stream(messages).await?;
        let mut reply = String::new();

        while let Some(fragment) = fragments.next().await {
            let fragment = fragment?;
            on_fragment(&fragment);
            reply.push_str(&fragment);
        }

        Ok(reply)
    }
}

pub struct ChatBuilder {
    gateway: BoxedGateway,
    system_prompt: String,
    transcript: Transcript,
    max_history_turns: Option<usize>,
}

impl ChatBuilder {
    pub fn new(gateway: BoxedGateway, system_prompt: &str) -> Self {
        Self {
            gateway,
            system_prompt: system_prompt.to_string(),
            transcript: Transcript::new(),
            max_history_turns: None,
        }
    }

    pub fn build(self) -> Chat {
        Chat {
            gateway: self.gateway,
            system_prompt: self.system_prompt,
            transcript: self.transcript,
            max_history_turns: self.max_history_turns,
        }
    }

    pub fn transcript(mut self, turns: Vec<Turn>) -> Self {
        self.transcript = Transcript::new_with_turns(turns);
        self
    }

    pub fn max_history_turns(mut self, limit: Option<usize>) -> Self {
        self.max_history_turns = limit;
        self
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use anyhow::anyhow;
    use async_trait::async_trait;
    use futures_util::stream;

    use super::*;
    use crate::ai::chat::Speaker;
    use crate::openai::{CompletionGateway, FragmentStream, OpenAiGateway};

    /// Replays a fixed reply and records every request it receives.
    #[derive(Default)]
    struct ScriptedGateway {
        fragments: Vec<&'static str>,
        fail_to_connect: bool,
        fail_mid_stream: bool,
        requests: Mutex<Vec<Vec<Message>>>,
    }

    #[async_trait]
    impl CompletionGateway for ScriptedGateway {
        async fn stream(&self, messages: &[Message]) -> Result<FragmentStream, Error> {
            self.requests.lock().unwrap().push(messages.to_vec());
            if self.fail_to_connect {
                return Err(anyhow!("error sending request: connection refused"));
            }
            let mut items: Vec<Result<String, Error>> = self
                .fragments
                .iter()
                .map(|f| Ok(f.to_string()))
                .collect();
            if self.fail_mid_stream {
                items.push(Err(anyhow!("connection reset")));
            }
            Ok(stream::iter(items).boxed())
        }
    }

    fn chat_with(gateway: Arc<ScriptedGateway>) -> Chat {
        ChatBuilder::new(gateway, "You're a gym buddy.").build()
    }

    #[tokio::test]
    async fn test_fragments_are_assembled_in_order() {
        let gateway = Arc::new(ScriptedGateway {
            fragments: vec!["Hi", " there", "!"],
            ..Default::default()
        });
        let mut chat = chat_with(gateway);

        let mut seen = Vec::new();
        let reply = chat
            .next_msg("Hello", |fragment| seen.push(fragment.to_string()))
            .await;

        assert_eq!(reply, Turn::assistant("Hi there!"));
        assert_eq!(seen, vec!["Hi", " there", "!"]);
        assert_eq!(
            chat.transcript().all(),
            &[Turn::user("Hello"), Turn::assistant("Hi there!")]
        );
    }

    #[tokio::test]
    async fn test_n_submissions_alternate() {
        let gateway = Arc::new(ScriptedGateway {
            fragments: vec!["Yeah", " totally"],
            ..Default::default()
        });
        let mut chat = chat_with(gateway);

        for i in 0..5 {
            chat.next_msg(&format!("question {}", i), |_| {}).await;
        }

        let turns = chat.transcript().all();
        assert_eq!(turns.len(), 10);
        for (i, turn) in turns.iter().enumerate() {
            let expected = if i % 2 == 0 {
                Speaker::User
            } else {
                Speaker::Assistant
            };
            assert_eq!(turn.role(), expected);
        }
        assert_eq!(turns[8].text(), "question 4");
    }

    #[tokio::test]
    async fn test_request_contains_prompt_history_and_new_message() {
        let gateway = Arc::new(ScriptedGateway {
            fragments: vec!["ok"],
            ..Default::default()
        });
        let mut chat = chat_with(Arc::clone(&gateway));

        chat.next_msg("first", |_| {}).await;
        chat.next_msg("second", |_| {}).await;

        let requests = gateway.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(
            requests[0],
            vec![
                Message::new(Role::System, "You're a gym buddy."),
                Message::new(Role::User, "first"),
            ]
        );
        assert_eq!(
            requests[1],
            vec![
                Message::new(Role::System, "You're a gym buddy."),
                Message::new(Role::User, "first"),
                Message::new(Role::Assistant, "ok"),
                Message::new(Role::User, "second"),
            ]
        );
        // The system prompt never drifts between requests
        assert_eq!(requests[0][0], requests[1][0]);
    }

    #[tokio::test]
    async fn test_connection_failure_becomes_reply() {
        let gateway = Arc::new(ScriptedGateway {
            fail_to_connect: true,
            ..Default::default()
        });
        let mut chat = chat_with(gateway);

        let mut seen = Vec::new();
        let reply = chat
            .next_msg("Hello", |fragment| seen.push(fragment.to_string()))
            .await;

        assert_eq!(reply.role(), Speaker::Assistant);
        assert!(reply.text().starts_with("Sorry, I'm having trouble connecting right now."));
        assert!(reply.text().contains("connection refused"));
        assert_eq!(seen, vec![reply.text().to_string()]);
        assert_eq!(chat.transcript().len(), 2);
        assert_eq!(chat.transcript().all()[1], reply);
    }

    #[tokio::test]
    async fn test_mid_stream_failure_replaces_partial_reply() {
        let gateway = Arc::new(ScriptedGateway {
            fragments: vec!["Honestly", "?"],
            fail_mid_stream: true,
            ..Default::default()
        });
        let mut chat = chat_with(gateway);

        let reply = chat.next_msg("Hello", |_| {}).await;

        assert!(reply.text().contains("connection reset"));
        assert!(!reply.text().starts_with("Honestly"));
        assert_eq!(chat.transcript().len(), 2);

        // The conversation continues normally afterwards
        chat.next_msg("Still there?", |_| {}).await;
        assert_eq!(chat.transcript().len(), 4);
    }

    #[tokio::test]
    async fn test_clear() {
        let gateway = Arc::new(ScriptedGateway {
            fragments: vec!["ok"],
            ..Default::default()
        });
        let mut chat = chat_with(Arc::clone(&gateway));

        chat.next_msg("one", |_| {}).await;
        chat.next_msg("two", |_| {}).await;
        chat.clear();
        assert!(chat.transcript().is_empty());

        chat.next_msg("three", |_| {}).await;
        let requests = gateway.requests.lock().unwrap();
        assert_eq!(requests[2].len(), 2);
    }

    #[tokio::test]
    async fn test_max_history_turns_limits_request_not_transcript() {
        let gateway = Arc::new(ScriptedGateway {
            fragments: vec!["ok"],
            ..Default::default()
        });
        let mut chat = ChatBuilder::new(gateway.clone(), "prompt")
            .max_history_turns(Some(2))
            .build();

        for i in 0..3 {
            chat.next_msg(&format!("msg {}", i), |_| {}).await;
        }

        assert_eq!(chat.transcript().len(), 6);
        let requests = gateway.requests.lock().unwrap();
        let last = &requests[2];
        // system prompt + 2 history turns + new message
        assert_eq!(last.len(), 4);
        assert_eq!(last[0].role, Role::System);
        assert_eq!(last[1], Message::new(Role::User, "msg 1"));
        assert_eq!(last[3], Message::new(Role::User, "msg 2"));
    }

    #[test]
    fn test_builder_transcript() {
        let gateway = Arc::new(ScriptedGateway::default());
        let chat = ChatBuilder::new(gateway, "prompt")
            .transcript(vec![Turn::user("Hello")])
            .build();
        assert_eq!(chat.transcript().len(), 1);
        assert_eq!(chat.system_prompt(), "prompt");
    }

    #[tokio::test]
    async fn test_chat_stream_over_http() {
        let mut server = mockito::Server::new_async().await;

        let sse_response = r#"data: {"id":"chunk1","choices":[{"index":0,"delta":{"content":"Hello"},"finish_reason":null}]}

data: {"id":"chunk2","choices":[{"index":0,"delta":{"content":" World"},"finish_reason":null}]}

data: {"id":"chunk3","choices":[{"index":0,"delta":{"content":"!"},"finish_reason":"stop"}]}

data: [DONE]

"#;

        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(sse_response)
            .create_async()
            .await;

        let url = server.url();
        let gateway = Arc::new(OpenAiGateway::new(&url, "test-key", "llama3-70b-8192"));
        let mut chat = ChatBuilder::new(gateway, "prompt").build();

        let reply = chat.next_msg("Say hello", |_| {}).await;
        assert_eq!(reply.text(), "Hello World!");
    }

    #[tokio::test]
    async fn test_chat_http_error_becomes_reply() {
        let mut server = mockito::Server::new_async().await;

        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(503)
            .with_body("upstream unavailable")
            .create_async()
            .await;

        let url = server.url();
        let gateway = Arc::new(OpenAiGateway::new(&url, "test-key", "llama3-70b-8192"));
        let mut chat = ChatBuilder::new(gateway, "prompt").build();

        let reply = chat.next_msg("Hi", |_| {}).await;
        assert!(reply.text().contains("503"));
        assert_eq!(chat.transcript().len(), 2);
    }
}
