//! Instant messages held for agents who were offline when they were sent.
//!
//! Direct and group messages are kept in separate buckets per recipient, each
//! with its own cap. Fetching drains both buckets.

mod rest;

pub use self::rest::OfflineMessagesHandler;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Mutex};
use tracing::debug;
use uuid::Uuid;

const DEFAULT_MAX_OFFLINE_MESSAGES: i32 = 20;
const DEFAULT_MAX_GROUP_OFFLINE_MESSAGES: i32 = 50;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridInstantMessage {
    pub from_agent_id: Uuid,
    pub from_agent_name: String,
    pub to_agent_id: Uuid,
    pub message: String,
    #[serde(default)]
    pub from_group: bool,
    /// Unix seconds.
    #[serde(default)]
    pub timestamp: u32,
    #[serde(default)]
    pub dialog: u8,
    #[serde(default)]
    pub session_id: Uuid,
}

/// Per-recipient caps. A cap of zero or less means unbounded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OfflineLimits {
    pub max_messages: i32,
    pub max_group_messages: i32,
    pub save_group_messages: bool,
}

impl Default for OfflineLimits {
    fn default() -> Self {
        Self {
            max_messages: DEFAULT_MAX_OFFLINE_MESSAGES,
            max_group_messages: DEFAULT_MAX_GROUP_OFFLINE_MESSAGES,
            save_group_messages: true,
        }
    }
}

fn has_room(max: i32, count: usize) -> bool {
    usize::try_from(max).map_or(true, |max| max == 0 || count < max)
}

#[async_trait]
pub trait OfflineMessageStore: Send + Sync {
    /// All held messages for `agent_id`, direct first, then group. Both buckets
    /// are emptied.
    async fn offline_messages(&self, agent_id: Uuid) -> Result<Vec<GridInstantMessage>>;

    /// Returns `false` when the message was not kept.
    async fn add_offline_message(&self, message: GridInstantMessage) -> Result<bool>;
}

#[derive(Debug, Default)]
struct Mailbox {
    direct: Vec<GridInstantMessage>,
    group: Vec<GridInstantMessage>,
}

#[derive(Debug, Default)]
pub struct InMemoryOfflineMessages {
    limits: OfflineLimits,
    mailboxes: Mutex<HashMap<Uuid, Mailbox>>,
}

impl InMemoryOfflineMessages {
    #[must_use]
    pub fn new(limits: OfflineLimits) -> Self {
        Self {
            limits,
            mailboxes: Mutex::default(),
        }
    }
}

#[async_trait]
impl OfflineMessageStore for InMemoryOfflineMessages {
    async fn offline_messages(&self, agent_id: Uuid) -> Result<Vec<GridInstantMessage>> {
        let mailbox = self
            .mailboxes
            .lock()
            .map_err(|_| anyhow!("offline message lock poisoned"))?
            .remove(&agent_id)
            .unwrap_or_default();

        let mut messages = mailbox.direct;
        messages.extend(mailbox.group);
        Ok(messages)
    }

    async fn add_offline_message(&self, message: GridInstantMessage) -> Result<bool> {
        if message.from_group && !self.limits.save_group_messages {
            return Ok(false);
        }

        let mut mailboxes = self
            .mailboxes
            .lock()
            .map_err(|_| anyhow!("offline message lock poisoned"))?;
        let mailbox = mailboxes.entry(message.to_agent_id).or_default();

        let (bucket, max) = if message.from_group {
            (&mut mailbox.group, self.limits.max_group_messages)
        } else {
            (&mut mailbox.direct, self.limits.max_messages)
        };

        if !has_room(max, bucket.len()) {
            debug!(to_agent_id = %message.to_agent_id, "offline mailbox full");
            return Ok(false);
        }

        bucket.push(message);
        Ok(true)
    }
}
