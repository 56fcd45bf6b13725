use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

use crate::ai::chat::{Chat, ChatBuilder};
use crate::core::AppConfig;
use crate::openai::BoxedGateway;

/// A live chat session. The mutex is held for the whole of a turn so
/// there is never more than one request in flight per session.
pub type SessionHandle = Arc<Mutex<Chat>>;

// Upper bound on how long an idle session outlives its timeout
const MAX_SWEEP_PERIOD: Duration = Duration::from_secs(60);

struct Session {
    chat: SessionHandle,
    last_active: StdMutex<Instant>,
}

impl Session {
    fn touch(&self) {
        if let Ok(mut last_active) = self.last_active.lock() {
            *last_active = Instant::now();
        }
    }

    fn idle_for(&self, now: Instant) -> Duration {
        self.last_active
            .lock()
            .map(|last_active| now.saturating_duration_since(*last_active))
            .unwrap_or_default()
    }
}

pub struct AppState {
    pub config: AppConfig,
    pub gateway: BoxedGateway,
    // Rendered once at startup and shared by every session
    pub system_prompt: String,
    sessions: HashMap<String, Session>,
}

impl AppState {
    pub fn new(config: AppConfig, gateway: BoxedGateway, system_prompt: &str) -> Self {
        Self {
            config,
            gateway,
            system_prompt: system_prompt.to_string(),
            sessions: HashMap::new(),
        }
    }

    /// Starts a new session with an empty transcript and returns its ID.
    pub fn start_session(&mut self) -> String {
        let id = Uuid::new_v4().to_string();
        let chat = ChatBuilder::new(Arc::clone(&self.gateway), &self.system_prompt)
            .max_history_turns(self.config.max_history_turns)
            .build();
        let session = Session {
            chat: Arc::new(Mutex::new(chat)),
            last_active: StdMutex::new(Instant::now()),
        };
        self.sessions.insert(id.clone(), session);
        tracing::info!(
            "Started chat session {} ({} active)",
            id,
            self.sessions.len()
        );
        id
    }

    /// Looks up a session and marks it as active.
    pub fn session(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.get(id).map(|session| {
            session.touch();
            Arc::clone(&session.chat)
        })
    }

    /// Discards the session and its transcript. Returns false if there
    /// was no such session.
    pub fn end_session(&mut self, id: &str) -> bool {
        let ended = self.sessions.remove(id).is_some();
        if ended {
            tracing::info!("Ended chat session {}", id);
        }
        ended
    }

    /// Ends every session nobody has used for longer than the configured
    /// idle timeout. Sessions with a reply in flight are kept. Returns
    /// the number of sessions ended.
    pub fn end_idle_sessions(&mut self) -> usize {
        let now = Instant::now();
        let timeout = self.config.session_idle_timeout;
        let idle: Vec<String> = self
            .sessions
            .iter()
            .filter(|(_, session)| {
                session.idle_for(now) > timeout && session.chat.try_lock().is_ok()
            })
            .map(|(id, _)| id.clone())
            .collect();

        for id in idle.iter() {
            tracing::debug!("Chat session {} is idle", id);
            self.end_session(id);
        }
        idle.len()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

/// Periodically ends idle sessions so clients that disappear without
/// ending their session don't keep their transcript alive.
pub fn spawn_session_sweeper(state: Arc<RwLock<AppState>>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let period = match state.read() {
            Ok(state) => state.config.session_idle_timeout.min(MAX_SWEEP_PERIOD),
            Err(e) => {
                tracing::error!("Unable to read shared state: {}", e);
                return;
            }
        };
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            match state.write() {
                Ok(mut state) => {
                    let ended = state.end_idle_sessions();
                    if ended > 0 {
                        tracing::info!(
                            "Ended {} idle chat sessions ({} active)",
                            ended,
                            state.session_count()
                        );
                    }
                }
                Err(e) => {
                    tracing::error!("Unable to write shared state: {}", e);
                    return;
                }
            }
        }
    })
}
