//! Telegram approval gate.
//!
//! The approval station sends one request per project (remembered by a
//! `TELEGRAM_GATE.json` marker in the project folder), then long-polls
//! `getUpdates` until the operator answers `APPROVE <ID>` / `REJECT <ID>` or
//! the wall-clock deadline passes. A deadline is reported as pending, never as
//! a rejection.
//!
//! The update offset lives in `<projects_dir>/telegram_listener_state.json`
//! together with answers that arrived for other projects, so a poll never
//! swallows a decision meant for someone else.

use crate::config::TelegramSettings;
use crate::station::{Station, StationContext, StationOutcome};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Marker written once the approval request has been sent.
pub const GATE_MARKER_FILE: &str = "TELEGRAM_GATE.json";

/// Upper bound for one `getUpdates` long poll.
const MAX_LONG_POLL_SECS: u64 = 25;

/// An operator's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Approve,
    Reject,
}

/// Parse `APPROVE <ID>` / `REJECT <ID>`, case-insensitive.
pub fn parse_command(text: &str) -> Option<(Decision, String)> {
    let mut parts = text.split_whitespace();
    let verb = parts.next()?.to_uppercase();
    let project_id = parts.next()?.to_string();
    if parts.next().is_some() {
        return None;
    }
    let decision = match verb.trim_start_matches('/') {
        "APPROVE" => Decision::Approve,
        "REJECT" => Decision::Reject,
        _ => return None,
    };
    Some((decision, project_id))
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub data: Option<String>,
}

impl Update {
    /// The decision carried by a text message or an inline button press.
    pub fn decision(&self) -> Option<(Decision, String)> {
        let text = self
            .message
            .as_ref()
            .and_then(|m| m.text.as_deref())
            .or_else(|| self.callback_query.as_ref().and_then(|c| c.data.as_deref()))?;
        parse_command(text)
    }
}

/// Persisted listener state shared by every project in the root.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListenerState {
    #[serde(default)]
    pub last_update_id: Option<i64>,
    /// Decisions received for projects that were not polling at the time.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub decisions: BTreeMap<String, Decision>,
}

impl ListenerState {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read listener state: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse listener state: {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize listener state")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write listener state: {}", path.display()))
    }

    /// Next offset to ask Telegram for.
    pub fn offset(&self) -> Option<i64> {
        self.last_update_id.map(|id| id + 1)
    }

    /// Removes and returns the stored decision for `project_id`. Project ids
    /// match case-insensitively, as they do in operator messages.
    pub fn take_decision(&mut self, project_id: &str) -> Option<Decision> {
        let key = self
            .decisions
            .keys()
            .find(|k| k.eq_ignore_ascii_case(project_id))?
            .clone();
        self.decisions.remove(&key)
    }

    /// Consumes one `getUpdates` batch on behalf of `project_id`.
    ///
    /// The first answer for `project_id` is returned. Later answers for it in
    /// the same batch are dropped so they cannot decide a future gate.
    /// Answers for other projects are stored under their upper-cased id.
    pub fn apply_updates(&mut self, project_id: &str, updates: &[Update]) -> Option<Decision> {
        let mut found = None;
        for update in updates {
            self.last_update_id = Some(update.update_id);
            let Some((decision, target)) = update.decision() else {
                continue;
            };
            if !target.eq_ignore_ascii_case(project_id) {
                tracing::debug!(project = %target, ?decision, "keeping decision for another project");
                self.decisions.insert(target.to_ascii_uppercase(), decision);
            } else if found.is_none() {
                found = Some(decision);
            } else {
                tracing::debug!(project = %target, ?decision, "ignoring repeated decision");
            }
        }
        found
    }
}

/// Minimal Bot API client: `sendMessage` and `getUpdates`.
pub struct TelegramClient {
    http: reqwest::Client,
    base_url: String,
    chat_id: String,
}

impl TelegramClient {
    pub fn new(settings: &TelegramSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: format!("{}/bot{}", settings.api_base, settings.bot_token),
            chat_id: settings.chat_id.clone(),
        }
    }

    /// Send a message with inline APPROVE / REJECT buttons for `project_id`.
    pub async fn send_approval_request(&self, project_id: &str, phase: &str) -> Result<()> {
        let text = format!(
            "FlowMind approval requested\nproject: {id}\nphase: {phase}\n\nReply APPROVE {id} or REJECT {id}",
            id = project_id,
            phase = phase
        );
        let keyboard = serde_json::json!({
            "inline_keyboard": [[
                { "text": "APPROVE", "callback_data": format!("APPROVE {}", project_id) },
                { "text": "REJECT", "callback_data": format!("REJECT {}", project_id) },
            ]]
        });
        self.send_message(&text, Some(keyboard.to_string())).await
    }

    pub async fn send_message(&self, text: &str, reply_markup: Option<String>) -> Result<()> {
        let mut form = vec![
            ("chat_id", self.chat_id.clone()),
            ("text", text.to_string()),
            ("disable_web_page_preview", "true".to_string()),
        ];
        if let Some(markup) = reply_markup {
            form.push(("reply_markup", markup));
        }

        let resp = self
            .http
            .post(format!("{}/sendMessage", self.base_url))
            .form(&form)
            .timeout(Duration::from_secs(15))
            .send()
            .await
            .context("Failed to send Telegram message")?
            .json::<ApiResponse<serde_json::Value>>()
            .await
            .context("Failed to parse Telegram sendMessage response")?;

        if !resp.ok {
            anyhow::bail!(
                "Telegram rejected sendMessage: {}",
                resp.description.unwrap_or_default()
            );
        }
        Ok(())
    }

    pub async fn get_updates(&self, offset: Option<i64>, timeout_secs: u64) -> Result<Vec<Update>> {
        let mut query = vec![("timeout", timeout_secs.to_string())];
        if let Some(offset) = offset {
            query.push(("offset", offset.to_string()));
        }

        let resp = self
            .http
            .get(format!("{}/getUpdates", self.base_url))
            .query(&query)
            .timeout(Duration::from_secs(timeout_secs + 10))
            .send()
            .await
            .context("Failed to poll Telegram updates")?
            .json::<ApiResponse<Vec<Update>>>()
            .await
            .context("Failed to parse Telegram getUpdates response")?;

        if !resp.ok {
            anyhow::bail!(
                "Telegram rejected getUpdates: {}",
                resp.description.unwrap_or_default()
            );
        }
        Ok(resp.result.unwrap_or_default())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct GateMarker {
    project_id: String,
    phase: String,
    sent_at: DateTime<Utc>,
}

/// Station that turns a Telegram conversation into an approval verdict.
pub struct TelegramApprovalStation {
    client: Arc<TelegramClient>,
    listener_state: PathBuf,
    timeout: Duration,
}

impl TelegramApprovalStation {
    pub fn new(client: Arc<TelegramClient>, listener_state: PathBuf, timeout: Duration) -> Self {
        Self {
            client,
            listener_state,
            timeout,
        }
    }

    fn verdict(decision: Decision, project_dir: &Path) -> StationOutcome {
        let _ = std::fs::remove_file(project_dir.join(GATE_MARKER_FILE));
        match decision {
            Decision::Approve => StationOutcome::pass(),
            Decision::Reject => StationOutcome::fail("rejected via Telegram"),
        }
    }

    async fn ensure_request_sent(&self, ctx: &StationContext) -> Result<()> {
        let marker = ctx.project_dir.join(GATE_MARKER_FILE);
        if marker.exists() {
            return Ok(());
        }
        self.client
            .send_approval_request(&ctx.project_id, ctx.phase.as_str())
            .await?;
        let record = GateMarker {
            project_id: ctx.project_id.clone(),
            phase: ctx.phase.to_string(),
            sent_at: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&record).context("Failed to serialize gate marker")?;
        std::fs::write(&marker, json)
            .with_context(|| format!("Failed to write {}", marker.display()))?;
        tracing::info!(project = %ctx.project_id, "approval request sent to Telegram");
        Ok(())
    }

    async fn poll(&self, ctx: &StationContext) -> Result<Option<Decision>> {
        let mut state = ListenerState::load(&self.listener_state)?;
        if let Some(decision) = state.take_decision(&ctx.project_id) {
            state.save(&self.listener_state)?;
            return Ok(Some(decision));
        }

        self.ensure_request_sent(ctx).await?;

        let deadline = Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let poll_secs = remaining.as_secs().min(MAX_LONG_POLL_SECS);

            let updates = self.client.get_updates(state.offset(), poll_secs).await?;
            let found = state.apply_updates(&ctx.project_id, &updates);
            if !updates.is_empty() {
                state.save(&self.listener_state)?;
            }
            if found.is_some() {
                return Ok(found);
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
        }
    }
}

#[async_trait]
impl Station for TelegramApprovalStation {
    fn name(&self) -> String {
        "telegram-approval".to_string()
    }

    async fn run(&self, ctx: &StationContext) -> StationOutcome {
        match self.poll(ctx).await {
            Ok(Some(decision)) => Self::verdict(decision, &ctx.project_dir),
            Ok(None) => StationOutcome::pending(format!(
                "no Telegram answer within {}s",
                self.timeout.as_secs()
            )),
            Err(e) => {
                tracing::warn!(project = %ctx.project_id, error = %format!("{:#}", e), "telegram poll failed");
                StationOutcome::pending(format!("telegram unavailable: {:#}", e))
            }
        }
    }
}
