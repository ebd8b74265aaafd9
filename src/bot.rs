use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::db::RoomStateStore;
use crate::discord::{DiscordCommand, DiscordCommandHandler};
use crate::meetup::{Event, EventDirectory};

pub mod error;
pub mod format;
pub(crate) mod logic;

pub use self::error::{CommandError, INVALID_GROUP_REPLY, NO_BINDING_REPLY};
pub use self::format::format_next_event;

use self::logic::{is_own_message, preview_text, room_key, snapshot_is_usable};

pub const NO_EVENT_REPLY: &str = "No future, public events found";

/// A chat message as seen by the dispatcher, stripped of transport details.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub author_id: String,
    pub channel_id: String,
    pub guild_id: Option<String>,
    pub content: String,
}

impl InboundMessage {
    pub fn room_id(&self) -> &str {
        room_key(self.guild_id.as_deref(), &self.channel_id)
    }
}

/// Where replies go. The Discord client implements this; tests record.
#[async_trait]
pub trait ChatOutbound: Send + Sync {
    async fn send_text(&self, channel_id: &str, text: &str) -> Result<()>;
}

#[derive(Debug)]
struct CommandReply {
    text: String,
    /// Set after a successful bind so the next event is fetched once the
    /// confirmation has gone out.
    warm_group: Option<String>,
}

impl CommandReply {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            warm_group: None,
        }
    }
}

pub struct BotCore {
    store: Arc<dyn RoomStateStore>,
    directory: Arc<dyn EventDirectory>,
    chat: Arc<dyn ChatOutbound>,
    command_handler: DiscordCommandHandler,
    bot_user_id: RwLock<Option<String>>,
    events_page_size: u32,
}

impl BotCore {
    pub fn new(
        store: Arc<dyn RoomStateStore>,
        directory: Arc<dyn EventDirectory>,
        chat: Arc<dyn ChatOutbound>,
        events_page_size: u32,
    ) -> Self {
        Self {
            store,
            directory,
            chat,
            command_handler: DiscordCommandHandler::new(),
            bot_user_id: RwLock::new(None),
            events_page_size,
        }
    }

    pub fn command_handler(&self) -> &DiscordCommandHandler {
        &self.command_handler
    }

    pub fn set_bot_user_id(&self, user_id: impl Into<String>) {
        *self.bot_user_id.write() = Some(user_id.into());
    }

    /// Records our own identity and makes sure every guild we are already in
    /// has a settings partition.
    pub async fn handle_ready(&self, bot_user_id: &str, room_ids: &[String]) -> Result<()> {
        self.set_bot_user_id(bot_user_id);
        for room_id in room_ids {
            self.store.ensure_room(room_id).await?;
        }
        let total = self.store.count_rooms().await?;
        info!(
            "settings partitions ready joined={} stored={}",
            room_ids.len(),
            total
        );
        Ok(())
    }

    pub async fn handle_room_joined(&self, room_id: &str) -> Result<()> {
        self.store.ensure_room(room_id).await?;
        debug!("settings partition ensured room_id={}", room_id);
        Ok(())
    }

    pub async fn handle_room_left(&self, room_id: &str) -> Result<()> {
        self.store.remove_room(room_id).await?;
        info!("settings partition removed room_id={}", room_id);
        Ok(())
    }

    pub async fn handle_message(&self, msg: InboundMessage) -> Result<()> {
        if is_own_message(self.bot_user_id.read().as_deref(), &msg.author_id) {
            return Ok(());
        }

        let Some(command) = self.command_handler.parse(&msg.content) else {
            return Ok(());
        };

        let room_id = msg.room_id().to_string();
        debug!(
            "discord command detected room_id={} channel_id={} sender={} command_preview={}",
            room_id,
            msg.channel_id,
            msg.author_id,
            preview_text(&msg.content)
        );

        let reply = match self.execute(&room_id, command).await {
            Ok(reply) => reply,
            Err(err) => {
                warn!("command failed room_id={} error={}", room_id, err);
                CommandReply::text(err.user_message())
            }
        };

        let sent = self.chat.send_text(&msg.channel_id, &reply.text).await;

        if let Some(group) = reply.warm_group {
            self.warm_next_event(&room_id, &group).await;
            self.log_room_entries(&room_id).await;
        }

        sent
    }

    async fn execute(
        &self,
        room_id: &str,
        command: DiscordCommand,
    ) -> Result<CommandReply, CommandError> {
        match command {
            DiscordCommand::SetGroup { urlname } => self.set_group(room_id, urlname).await,
            DiscordCommand::GetEvents => self.get_events(room_id).await.map(CommandReply::text),
            DiscordCommand::NextEvent => self.next_event(room_id).await.map(CommandReply::text),
        }
    }

    async fn set_group(&self, room_id: &str, urlname: String) -> Result<CommandReply, CommandError> {
        if urlname.is_empty() {
            return Err(CommandError::NotFound { group: urlname });
        }

        if !self.directory.group_exists(&urlname).await? {
            info!(
                "rejected unknown meetup group room_id={} group={}",
                room_id, urlname
            );
            return Err(CommandError::NotFound { group: urlname });
        }

        self.store.ensure_room(room_id).await?;
        self.store.set_group(room_id, &urlname).await?;
        info!("room bound to meetup group room_id={} group={}", room_id, urlname);

        Ok(CommandReply {
            text: format!("Group url now set to: {urlname}"),
            warm_group: Some(urlname),
        })
    }

    async fn get_events(&self, room_id: &str) -> Result<String, CommandError> {
        let group = self.bound_group(room_id).await?;
        let body = self
            .directory
            .fetch_events_raw(&group, self.events_page_size)
            .await?;
        debug!(
            "fetched raw event listing room_id={} group={} bytes={}",
            room_id,
            group,
            body.len()
        );
        Ok(body)
    }

    async fn next_event(&self, room_id: &str) -> Result<String, CommandError> {
        let group = self.bound_group(room_id).await?;

        match self.directory.resolve_next(&group).await {
            Ok(Some(event)) => {
                self.cache_snapshot(room_id, &event).await;
                Ok(format_next_event(&event))
            }
            Ok(None) => Ok(NO_EVENT_REPLY.to_string()),
            Err(err) => {
                let err = CommandError::from(err);
                if !matches!(err, CommandError::Transport { .. }) {
                    return Err(err);
                }
                let Some(cached) = self.usable_snapshot(room_id).await else {
                    return Err(err);
                };
                warn!(
                    "meetup unreachable, answering from cached snapshot room_id={} event_id={} error={}",
                    room_id, cached.id, err
                );
                Ok(format_next_event(&cached))
            }
        }
    }

    async fn bound_group(&self, room_id: &str) -> Result<String, CommandError> {
        self.store
            .get_group(room_id)
            .await?
            .ok_or_else(|| CommandError::NoBinding {
                room_id: room_id.to_string(),
            })
    }

    async fn usable_snapshot(&self, room_id: &str) -> Option<Event> {
        match self.store.get_event_snapshot(room_id).await {
            Ok(snapshot) => {
                let now_ms = Utc::now().timestamp_millis();
                snapshot.filter(|event| snapshot_is_usable(event, now_ms))
            }
            Err(err) => {
                warn!("ignoring unreadable event snapshot room_id={} error={}", room_id, err);
                None
            }
        }
    }

    async fn cache_snapshot(&self, room_id: &str, event: &Event) {
        if let Err(err) = self.store.set_event_snapshot(room_id, event).await {
            warn!(
                "failed to cache next event room_id={} event_id={} error={}",
                room_id, event.id, err
            );
        }
    }

    async fn warm_next_event(&self, room_id: &str, group: &str) {
        match self.directory.resolve_next(group).await {
            Ok(Some(event)) => self.cache_snapshot(room_id, &event).await,
            Ok(None) => debug!("no announceable event to cache room_id={} group={}", room_id, group),
            Err(err) => warn!(
                "failed to resolve next event after bind room_id={} group={} error={}",
                room_id, group, err
            ),
        }
    }

    async fn log_room_entries(&self, room_id: &str) {
        match self.store.room_entries(room_id).await {
            Ok(entries) => {
                for entry in entries {
                    debug!(
                        "room setting room_id={} key={} updated_at={} value={}",
                        room_id,
                        entry.key,
                        entry.updated_at.to_rfc3339(),
                        preview_text(&entry.value)
                    );
                }
            }
            Err(err) => warn!("failed to list room settings room_id={} error={}", room_id, err),
        }
    }
}
