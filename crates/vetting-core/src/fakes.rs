//! In-memory fakes for capability traits (testing only)
//!
//! Provides `StaticSearch`, `FailingSearch`, `ScriptedGeneration`,
//! `DeterministicGeneration` and `RecordingMessaging`, which satisfy the
//! capability contracts without any network access.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::capability::{
    CapabilityError, ChatMessage, GenerationCapability, GenerationReply, GenerationRequest,
    MessageAck, MessagingCapability, Recipient, SearchCapability, SearchSnippet,
};
use crate::domain::Dimension;
use crate::stage::StageKind;
use crate::tooling::{FIND_USER_BY_NAME, SEND_MESSAGE, WEB_SEARCH};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// Returns the same snippets for every query and remembers the queries.
#[derive(Debug, Default)]
pub struct StaticSearch {
    snippets: Vec<SearchSnippet>,
    queries: Mutex<Vec<String>>,
}

impl StaticSearch {
    pub fn new(snippets: Vec<SearchSnippet>) -> Self {
        Self {
            snippets,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<String> {
        lock(&self.queries).clone()
    }
}

#[async_trait]
impl SearchCapability for StaticSearch {
    async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchSnippet>, CapabilityError> {
        lock(&self.queries).push(query.to_string());
        Ok(self.snippets.iter().take(limit).cloned().collect())
    }
}

/// Fails every query with the configured error.
#[derive(Debug)]
pub struct FailingSearch {
    error: CapabilityError,
}

impl FailingSearch {
    pub fn new(error: CapabilityError) -> Self {
        Self { error }
    }
}

#[async_trait]
impl SearchCapability for FailingSearch {
    async fn search(
        &self,
        _query: &str,
        _limit: usize,
    ) -> Result<Vec<SearchSnippet>, CapabilityError> {
        Err(self.error.clone())
    }
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Replays queued replies per stage, then the fallback (if any).
///
/// An exhausted script without fallback answers `Unavailable`.
#[derive(Debug, Default)]
pub struct ScriptedGeneration {
    replies: Mutex<HashMap<StageKind, VecDeque<GenerationReply>>>,
    fallback: Option<GenerationReply>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGeneration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `reply` for the next request from `stage`.
    pub fn then(self, stage: StageKind, reply: GenerationReply) -> Self {
        lock(&self.replies).entry(stage).or_default().push_back(reply);
        self
    }

    pub fn with_fallback(mut self, reply: GenerationReply) -> Self {
        self.fallback = Some(reply);
        self
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl GenerationCapability for ScriptedGeneration {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationReply, CapabilityError> {
        lock(&self.requests).push(request.clone());
        let queued = lock(&self.replies)
            .get_mut(&request.stage)
            .and_then(VecDeque::pop_front);
        queued.or_else(|| self.fallback.clone()).ok_or_else(|| {
            CapabilityError::Unavailable(format!("no scripted reply for stage {}", request.stage))
        })
    }
}

/// A well-behaved model that reacts to the transcript.
///
/// - research: one `web_search` for the first task line, then a brief
///   quoting the results
/// - evaluate: every dimension scored `score`, reasoning quoting the first
///   line of the brief
/// - deliver: `find_user_by_name(recipient)`, then `send_message` with the
///   report from the task context
#[derive(Debug, Clone)]
pub struct DeterministicGeneration {
    recipient: String,
    score: i64,
}

impl DeterministicGeneration {
    pub fn new(recipient: impl Into<String>, score: i64) -> Self {
        Self {
            recipient: recipient.into(),
            score,
        }
    }

    fn research(&self, task_line: &str, results: &[&str]) -> GenerationReply {
        if results.is_empty() {
            return GenerationReply::tool_call(
                "search-1",
                WEB_SEARCH,
                json!({ "query": task_line }),
            );
        }
        GenerationReply::text(format!("Findings for {task_line}\n{}", results.join("\n")))
    }

    fn evaluate(&self, context_line: &str) -> GenerationReply {
        let mut scorecard = serde_json::Map::new();
        for dimension in Dimension::ALL {
            scorecard.insert(
                dimension.key().to_string(),
                json!({
                    "score": self.score,
                    "reasoning": format!("{}: {}", dimension.title(), context_line),
                }),
            );
        }
        GenerationReply::text(Value::Object(scorecard).to_string())
    }

    fn deliver(&self, context: &str, results: &[&str]) -> GenerationReply {
        match results {
            [] => GenerationReply::tool_call(
                "find-1",
                FIND_USER_BY_NAME,
                json!({ "name": self.recipient }),
            ),
            [lookup] => {
                let lookup: Value = serde_json::from_str(lookup).unwrap_or_default();
                match lookup["user_id"].as_str() {
                    Some(user_id) if lookup["found"] == json!(true) => GenerationReply::tool_call(
                        "send-1",
                        SEND_MESSAGE,
                        json!({ "recipient_id": user_id, "text": context }),
                    ),
                    _ => GenerationReply::text(format!("Could not find {}", self.recipient)),
                }
            }
            _ => GenerationReply::text(format!("Report sent to {}", self.recipient)),
        }
    }
}

fn task_text(request: &GenerationRequest) -> &str {
    request
        .messages
        .iter()
        .find_map(|m| match m {
            ChatMessage::User { content } => Some(content.as_str()),
            _ => None,
        })
        .unwrap_or_default()
}

fn task_context(task: &str) -> &str {
    task.split_once("\n\nContext:\n")
        .map(|(_, context)| context)
        .unwrap_or_default()
}

fn tool_results(request: &GenerationRequest) -> Vec<&str> {
    request
        .messages
        .iter()
        .filter_map(|m| match m {
            ChatMessage::ToolResult { content, .. } => Some(content.as_str()),
            _ => None,
        })
        .collect()
}

#[async_trait]
impl GenerationCapability for DeterministicGeneration {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationReply, CapabilityError> {
        let task = task_text(request);
        let results = tool_results(request);
        Ok(match request.stage {
            StageKind::Research => {
                self.research(task.lines().next().unwrap_or_default(), &results)
            }
            StageKind::Evaluate => {
                self.evaluate(task_context(task).lines().next().unwrap_or_default())
            }
            StageKind::Deliver => self.deliver(task_context(task), &results),
        })
    }
}

// ---------------------------------------------------------------------------
// Messaging
// ---------------------------------------------------------------------------

/// A message accepted by [`RecordingMessaging`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub recipient_id: String,
    pub text: String,
}

/// Directory lookup over a fixed user list; records every accepted message.
#[derive(Debug, Default)]
pub struct RecordingMessaging {
    users: Vec<Recipient>,
    send_error: Option<CapabilityError>,
    sent: Mutex<Vec<SentMessage>>,
}

impl RecordingMessaging {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, display_name: &str, id: &str) -> Self {
        self.users.push(Recipient {
            id: id.to_string(),
            display_name: display_name.to_string(),
        });
        self
    }

    /// Make every `send_message` fail with `error`.
    pub fn failing_sends(mut self, error: CapabilityError) -> Self {
        self.send_error = Some(error);
        self
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        lock(&self.sent).clone()
    }
}

#[async_trait]
impl MessagingCapability for RecordingMessaging {
    async fn find_user_by_name(
        &self,
        display_name: &str,
    ) -> Result<Option<Recipient>, CapabilityError> {
        Ok(self
            .users
            .iter()
            .find(|u| u.display_name.eq_ignore_ascii_case(display_name.trim()))
            .cloned())
    }

    async fn send_message(
        &self,
        recipient_id: &str,
        text: &str,
    ) -> Result<MessageAck, CapabilityError> {
        if let Some(error) = &self.send_error {
            return Err(error.clone());
        }
        if !self.users.iter().any(|u| u.id == recipient_id) {
            return Err(CapabilityError::Rejected(format!(
                "user_not_found: {recipient_id}"
            )));
        }
        let mut sent = lock(&self.sent);
        sent.push(SentMessage {
            recipient_id: recipient_id.to_string(),
            text: text.to_string(),
        });
        Ok(MessageAck {
            channel: format!("D-{recipient_id}"),
            message_id: format!("1700000000.{:06}", sent.len()),
        })
    }
}
