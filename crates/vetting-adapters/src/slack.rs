//! Slack Web API as a [`MessagingCapability`].
//!
//! Lookup pages through `users.list` and matches the requested name against
//! the handle, real name and display name. Sending opens (or reuses) a DM
//! with `conversations.open` and posts with `chat.postMessage`.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use vetting_core::{CapabilityError, MessageAck, MessagingCapability, Recipient};

use crate::{http_client, require_env, send_for_text};

pub const SLACK_BASE_URL: &str = "https://slack.com/api";

/// Members requested per `users.list` page.
const PAGE_SIZE: usize = 200;

/// Upper bound on pages read per lookup.
const MAX_PAGES: usize = 50;

#[derive(Clone)]
pub struct SlackMessaging {
    token: String,
    client: reqwest::Client,
    base_url: String,
}

impl SlackMessaging {
    pub fn new(token: String) -> Result<Self> {
        Ok(Self {
            token,
            client: http_client()?,
            base_url: SLACK_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Create from `SLACK_BOT_TOKEN`.
    pub fn from_env() -> Result<Self> {
        Self::new(require_env("SLACK_BOT_TOKEN")?)
    }

    async fn call(
        &self,
        method: &str,
        body: Option<Value>,
        query: &[(&str, String)],
    ) -> Result<Value, CapabilityError> {
        let url = format!("{}/{method}", self.base_url);
        let request = match body {
            Some(body) => self.client.post(url).json(&body),
            None => self.client.get(url).query(query),
        };
        let text = send_for_text("slack", request.bearer_auth(&self.token)).await?;
        let value: Value = serde_json::from_str(&text)
            .map_err(|e| CapabilityError::Malformed(format!("slack {method}: {e}")))?;
        check_ok(method, &value)?;
        Ok(value)
    }
}

impl std::fmt::Debug for SlackMessaging {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackMessaging")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Slack answers HTTP 200 with `"ok": false` for API-level errors.
pub fn check_ok(method: &str, value: &Value) -> Result<(), CapabilityError> {
    if value["ok"].as_bool() == Some(true) {
        return Ok(());
    }
    let error = value["error"].as_str().unwrap_or("unknown_error");
    let detail = format!("slack {method}: {error}");
    match error {
        "ratelimited" | "service_unavailable" | "request_timeout" | "fatal_error" => {
            Err(CapabilityError::Unavailable(detail))
        }
        _ => Err(CapabilityError::Rejected(detail)),
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SlackProfile {
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    real_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlackUser {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    real_name: String,
    #[serde(default)]
    deleted: bool,
    #[serde(default)]
    is_bot: bool,
    #[serde(default)]
    profile: SlackProfile,
}

impl SlackUser {
    fn names(&self) -> [&str; 4] {
        [
            &self.profile.display_name,
            &self.profile.real_name,
            &self.real_name,
            &self.name,
        ]
    }

    fn best_name(&self) -> &str {
        self.names()
            .into_iter()
            .find(|n| !n.trim().is_empty())
            .unwrap_or(&self.id)
    }
}

#[derive(Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

#[derive(Deserialize)]
struct UsersPage {
    #[serde(default)]
    members: Vec<SlackUser>,
    response_metadata: Option<ResponseMetadata>,
}

/// Parse one `users.list` page into members and the next cursor, if any.
pub fn parse_users_page(
    value: &Value,
) -> Result<(Vec<SlackUser>, Option<String>), CapabilityError> {
    let page = UsersPage::deserialize(value)
        .map_err(|e| CapabilityError::Malformed(format!("slack users.list: {e}")))?;
    let cursor = page
        .response_metadata
        .map(|m| m.next_cursor)
        .filter(|c| !c.is_empty());
    Ok((page.members, cursor))
}

/// Case-insensitive match on any of the user's names. Deleted users and bots
/// never match.
pub fn match_user(users: &[SlackUser], name: &str) -> Option<Recipient> {
    let wanted = name.trim().trim_start_matches('@');
    users
        .iter()
        .filter(|u| !u.deleted && !u.is_bot)
        .find(|u| u.names().iter().any(|n| n.trim().eq_ignore_ascii_case(wanted)))
        .map(|u| Recipient {
            id: u.id.clone(),
            display_name: u.best_name().to_string(),
        })
}

pub fn parse_open_channel(value: &Value) -> Result<String, CapabilityError> {
    value["channel"]["id"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| {
            CapabilityError::Malformed("slack conversations.open: no channel id".to_string())
        })
}

pub fn parse_post_message(value: &Value) -> Result<MessageAck, CapabilityError> {
    match (value["channel"].as_str(), value["ts"].as_str()) {
        (Some(channel), Some(ts)) => Ok(MessageAck {
            channel: channel.to_string(),
            message_id: ts.to_string(),
        }),
        _ => Err(CapabilityError::Malformed(
            "slack chat.postMessage: missing channel or ts".to_string(),
        )),
    }
}

#[async_trait]
impl MessagingCapability for SlackMessaging {
    async fn find_user_by_name(
        &self,
        display_name: &str,
    ) -> Result<Option<Recipient>, CapabilityError> {
        let mut cursor: Option<String> = None;
        for _ in 0..MAX_PAGES {
            let mut query = vec![("limit", PAGE_SIZE.to_string())];
            if let Some(cursor) = &cursor {
                query.push(("cursor", cursor.clone()));
            }
            let page = self.call("users.list", None, &query).await?;
            let (members, next) = parse_users_page(&page)?;
            if let Some(recipient) = match_user(&members, display_name) {
                tracing::debug!(name = display_name, user_id = %recipient.id, "slack user resolved");
                return Ok(Some(recipient));
            }
            match next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        tracing::debug!(name = display_name, "slack user not found");
        Ok(None)
    }

    async fn send_message(
        &self,
        recipient_id: &str,
        text: &str,
    ) -> Result<MessageAck, CapabilityError> {
        let opened = self
            .call(
                "conversations.open",
                Some(json!({ "users": recipient_id })),
                &[],
            )
            .await?;
        let channel = parse_open_channel(&opened)?;
        let posted = self
            .call(
                "chat.postMessage",
                Some(json!({ "channel": channel, "text": text })),
                &[],
            )
            .await?;
        parse_post_message(&posted)
    }
}
