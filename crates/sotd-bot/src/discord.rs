// Discord REST client implementing the chat venue.
//
// Only the handful of endpoints the bracket needs: reading who holds a
// reaction, removing and adding reactions, and posting or deleting messages.
// Gateway (websocket) traffic arrives through the relay, not here.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use sotd_core::bracket::Choice;
use sotd_core::ports::{ChatUser, ChatVenue, MessageRef};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const USER_AGENT: &str = concat!("DiscordBot (sotd, ", env!("CARGO_PKG_VERSION"), ")");
const CDN_BASE: &str = "https://cdn.discordapp.com";
/// Maximum page size of the reactions endpoint.
const REACTION_PAGE: usize = 100;
const MAX_RATE_LIMIT_RETRIES: u32 = 3;
/// Longest single back-off honored from a 429 body.
const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ApiUser {
    id: String,
    username: String,
    #[serde(default)]
    global_name: Option<String>,
    #[serde(default)]
    avatar: Option<String>,
    #[serde(default)]
    bot: bool,
}

impl ApiUser {
    fn into_chat_user(self) -> ChatUser {
        let avatar_url = avatar_url(&self.id, self.avatar.as_deref());
        ChatUser {
            name: self.global_name.unwrap_or(self.username),
            avatar_url,
            id: self.id,
            bot: self.bot,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreatedMessage {
    id: String,
}

// ---------------------------------------------------------------------------
// DiscordClient
// ---------------------------------------------------------------------------

/// Bot-token REST client for one Discord application.
pub struct DiscordClient {
    http: reqwest::Client,
    api_base: Url,
    token: String,
}

impl DiscordClient {
    pub fn new(api_base: &str, token: String) -> Result<Self> {
        let api_base =
            Url::parse(api_base).with_context(|| format!("invalid Discord api_base {api_base}"))?;
        if api_base.cannot_be_a_base() {
            bail!("Discord api_base {api_base} cannot carry a path");
        }
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build Discord HTTP client")?;
        Ok(Self {
            http,
            api_base,
            token,
        })
    }

    /// Build an endpoint URL from raw path segments. Each segment is
    /// percent-encoded, which is what reaction emoji need.
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Url {
        endpoint(&self.api_base, segments)
    }

    /// Send a request, waiting out rate limits. Non-success statuses other
    /// than 429 come back to the caller untouched.
    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<reqwest::Response> {
        let mut attempt = 0;
        loop {
            let mut request = self
                .http
                .request(method.clone(), url.clone())
                .header("Authorization", format!("Bot {}", self.token));
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request
                .send()
                .await
                .with_context(|| format!("{method} {} failed", url.path()))?;

            if response.status() != StatusCode::TOO_MANY_REQUESTS
                || attempt >= MAX_RATE_LIMIT_RETRIES
            {
                return Ok(response);
            }

            attempt += 1;
            let text = response.text().await.unwrap_or_default();
            let wait = retry_after(&text).unwrap_or(Duration::from_secs(1));
            warn!(path = url.path(), ?wait, attempt, "rate limited by Discord");
            tokio::time::sleep(wait).await;
        }
    }

    async fn expect_success(&self, method: Method, url: Url, body: Option<&Value>) -> Result<reqwest::Response> {
        let path = url.path().to_string();
        let response = self.send(method.clone(), url, body).await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("{method} {path} returned {status}: {text}"));
        }
        Ok(response)
    }

    fn reaction_url(&self, message: &MessageRef, emoji: &str, tail: &[&str]) -> Url {
        let mut segments = vec![
            "channels",
            message.channel_id.as_str(),
            "messages",
            message.message_id.as_str(),
            "reactions",
            emoji,
        ];
        segments.extend_from_slice(tail);
        self.endpoint(&segments)
    }

    /// Every user holding `emoji` on `message`, following pagination.
    pub async fn reaction_users(&self, message: &MessageRef, emoji: &str) -> Result<Vec<ChatUser>> {
        let mut users = Vec::new();
        let mut after: Option<String> = None;

        loop {
            let mut url = self.reaction_url(message, emoji, &[]);
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("limit", &REACTION_PAGE.to_string());
                if let Some(after) = &after {
                    query.append_pair("after", after);
                }
            }

            let page: Vec<ApiUser> = self
                .expect_success(Method::GET, url, None)
                .await?
                .json()
                .await
                .context("failed to decode reaction users")?;

            let full_page = page.len() == REACTION_PAGE;
            after = page.last().map(|u| u.id.clone());
            users.extend(page.into_iter().map(ApiUser::into_chat_user));

            if !full_page {
                break;
            }
        }

        debug!(message = %message.message_id, emoji, count = users.len(), "fetched reaction holders");
        Ok(users)
    }
}

#[async_trait]
impl ChatVenue for DiscordClient {
    async fn marker_holders(&self, message: &MessageRef, choice: Choice) -> Result<Vec<ChatUser>> {
        self.reaction_users(message, choice.marker()).await
    }

    async fn remove_marker(&self, message: &MessageRef, choice: Choice, user_id: &str) -> Result<()> {
        let url = self.reaction_url(message, choice.marker(), &[user_id]);
        self.expect_success(Method::DELETE, url, None).await?;
        Ok(())
    }

    async fn clear_reaction(&self, message: &MessageRef, emoji: &str) -> Result<()> {
        let url = self.reaction_url(message, emoji, &[]);
        self.expect_success(Method::DELETE, url, None).await?;
        Ok(())
    }

    async fn add_marker(&self, message: &MessageRef, choice: Choice) -> Result<()> {
        let url = self.reaction_url(message, choice.marker(), &["@me"]);
        self.expect_success(Method::PUT, url, None).await?;
        Ok(())
    }

    async fn delete_message(&self, message: &MessageRef) -> Result<()> {
        let url = self.endpoint(&[
            "channels",
            &message.channel_id,
            "messages",
            &message.message_id,
        ]);
        let response = self.send(Method::DELETE, url, None).await?;
        let status = response.status();
        // Already gone counts as deleted.
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        let text = response.text().await.unwrap_or_default();
        Err(anyhow!(
            "deleting message {} returned {status}: {text}",
            message.message_id
        ))
    }

    async fn send_message(&self, channel_id: &str, content: &str) -> Result<String> {
        let url = self.endpoint(&["channels", channel_id, "messages"]);
        let body = serde_json::json!({ "content": content });
        let created: CreatedMessage = self
            .expect_success(Method::POST, url, Some(&body))
            .await?
            .json()
            .await
            .context("failed to decode created message")?;
        Ok(created.id)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn endpoint(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    // `new` rejects cannot-be-a-base URLs, so this always succeeds.
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

/// CDN URL for a user's avatar, falling back to the default avatar when the
/// user never set one.
pub fn avatar_url(user_id: &str, avatar_hash: Option<&str>) -> String {
    match avatar_hash {
        Some(hash) => {
            let ext = if hash.starts_with("a_") { "gif" } else { "png" };
            format!("{CDN_BASE}/avatars/{user_id}/{hash}.{ext}")
        }
        None => {
            let index = user_id.parse::<u64>().map(|id| (id >> 22) % 6).unwrap_or(0);
            format!("{CDN_BASE}/embed/avatars/{index}.png")
        }
    }
}

/// Wait time from a 429 body: `{"retry_after": 1.5, ...}` in seconds, capped
/// at [`MAX_RATE_LIMIT_WAIT`]. Negative or unrepresentable values are ignored.
fn retry_after(body: &str) -> Option<Duration> {
    let v: Value = serde_json::from_str(body).ok()?;
    let secs = v.get("retry_after")?.as_f64()?;
    Duration::try_from_secs_f64(secs)
        .ok()
        .map(|wait| wait.min(MAX_RATE_LIMIT_WAIT))
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
