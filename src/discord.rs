use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serenity::all::{
    ChannelId, Client as SerenityClient, Context as SerenityContext, CreateMessage,
    EventHandler as SerenityEventHandler, GatewayIntents, Guild, Http,
    Message as SerenityMessage, Ready, UnavailableGuild,
};
use tokio::sync::{Mutex as AsyncMutex, RwLock, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bot::{BotCore, ChatOutbound, InboundMessage};
use crate::config::Config;

const FIRST_RETRY_DELAY: Duration = Duration::from_secs(2);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(300);
const READY_TIMEOUT: Duration = Duration::from_secs(30);

/// Discord rejects message content longer than this many characters.
pub const DISCORD_MESSAGE_LIMIT: usize = 2000;

pub mod command_handler;

pub use self::command_handler::{DiscordCommand, DiscordCommandHandler};

#[derive(Clone)]
pub struct DiscordClient {
    bot_token: SecretString,
    send_delay_ms: u64,
    send_lock: Arc<AsyncMutex<()>>,
    gateway: Arc<AsyncMutex<Option<JoinHandle<()>>>>,
    bot: Arc<RwLock<Option<Arc<BotCore>>>>,
    http: Arc<RwLock<Option<Arc<Http>>>>,
}

struct GatewayHandler {
    ready_sender: Arc<AsyncMutex<Option<oneshot::Sender<()>>>>,
    bot: Arc<RwLock<Option<Arc<BotCore>>>>,
}

impl GatewayHandler {
    async fn bot(&self) -> Option<Arc<BotCore>> {
        self.bot.read().await.clone()
    }
}

#[serenity::async_trait]
impl SerenityEventHandler for GatewayHandler {
    async fn ready(&self, _ctx: SerenityContext, ready: Ready) {
        info!(
            "discord gateway ready as {} ({}) guilds={}",
            ready.user.name,
            ready.user.id,
            ready.guilds.len()
        );

        if let Some(bot) = self.bot().await {
            let guild_ids: Vec<String> = ready.guilds.iter().map(|g| g.id.to_string()).collect();
            if let Err(err) = bot.handle_ready(&ready.user.id.to_string(), &guild_ids).await {
                error!("failed to prepare guild settings on ready: {err}");
            }
            info!(
                "listening for commands: {}",
                bot.command_handler().available_commands().join(", ")
            );
        }

        if let Some(sender) = self.ready_sender.lock().await.take() {
            let _ = sender.send(());
        }
    }

    async fn guild_create(&self, _ctx: SerenityContext, guild: Guild, is_new: Option<bool>) {
        let Some(bot) = self.bot().await else {
            return;
        };

        debug!(
            "discord guild available guild_id={} name={} is_new={:?}",
            guild.id, guild.name, is_new
        );
        if let Err(err) = bot.handle_room_joined(&guild.id.to_string()).await {
            error!("failed to ensure settings for guild {}: {err}", guild.id);
        }
    }

    async fn guild_delete(
        &self,
        _ctx: SerenityContext,
        incomplete: UnavailableGuild,
        _full: Option<Guild>,
    ) {
        if incomplete.unavailable {
            warn!(
                "discord guild became unavailable guild_id={}, keeping settings",
                incomplete.id
            );
            return;
        }

        let Some(bot) = self.bot().await else {
            return;
        };

        if let Err(err) = bot.handle_room_left(&incomplete.id.to_string()).await {
            error!("failed to remove settings for guild {}: {err}", incomplete.id);
        }
    }

    async fn message(&self, _ctx: SerenityContext, msg: SerenityMessage) {
        let Some(bot) = self.bot().await else {
            debug!("ignoring discord message before bot binding");
            return;
        };

        if let Err(err) = bot
            .handle_message(InboundMessage {
                author_id: msg.author.id.to_string(),
                channel_id: msg.channel_id.to_string(),
                guild_id: msg.guild_id.map(|id| id.to_string()),
                content: msg.content.clone(),
            })
            .await
        {
            error!("failed to handle discord message: {err}");
        }
    }
}

/// Cuts `text` to at most `limit` characters, marking the cut with an
/// ellipsis.
pub fn truncate_message(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(limit.saturating_sub(1)).collect();
    truncated.push('…');
    truncated
}

fn next_retry_delay(current: Duration) -> Duration {
    (current * 2).min(MAX_RETRY_DELAY)
}

fn gateway_intents() -> GatewayIntents {
    GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
}

impl DiscordClient {
    pub fn new(config: &Config) -> Self {
        info!("initializing discord client");
        Self {
            bot_token: SecretString::from(config.auth.bot_token.clone()),
            send_delay_ms: config.limits.discord_send_delay,
            send_lock: Arc::new(AsyncMutex::new(())),
            gateway: Arc::new(AsyncMutex::new(None)),
            bot: Arc::new(RwLock::new(None)),
            http: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn set_bot(&self, bot: Arc<BotCore>) {
        *self.bot.write().await = Some(bot);
    }

    /// Connects the gateway once; later calls are no-ops while it runs.
    pub async fn login(&self) -> Result<()> {
        let mut gateway = self.gateway.lock().await;
        if gateway.is_some() {
            return Ok(());
        }

        let (task, ready) = self.spawn_gateway().await?;
        let outcome = match tokio::time::timeout(READY_TIMEOUT, ready).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(anyhow!("discord gateway exited before receiving Ready event")),
            Err(_) => Err(anyhow!("timed out waiting for discord Ready event")),
        };

        match outcome {
            Ok(()) => {
                info!("discord gateway connected");
                *gateway = Some(task);
                Ok(())
            }
            Err(err) => {
                task.abort();
                *self.http.write().await = None;
                Err(err)
            }
        }
    }

    async fn spawn_gateway(&self) -> Result<(JoinHandle<()>, oneshot::Receiver<()>)> {
        let (ready_tx, ready_rx) = oneshot::channel();
        let handler = GatewayHandler {
            ready_sender: Arc::new(AsyncMutex::new(Some(ready_tx))),
            bot: self.bot.clone(),
        };

        let mut client = SerenityClient::builder(self.bot_token.expose_secret(), gateway_intents())
            .event_handler(handler)
            .await
            .map_err(|err| anyhow!("failed to build discord gateway client: {err}"))?;
        *self.http.write().await = Some(client.http.clone());

        let task = tokio::spawn(async move {
            if let Err(err) = client.start_autosharded().await {
                error!("discord gateway stopped: {err}");
            }
        });
        Ok((task, ready_rx))
    }

    /// Retries `login` with exponential backoff until it succeeds.
    pub async fn start(&self) -> Result<()> {
        let mut delay = FIRST_RETRY_DELAY;
        while let Err(err) = self.login().await {
            error!(
                "discord login failed: {err}. retrying in {} seconds",
                delay.as_secs()
            );
            tokio::time::sleep(delay).await;
            delay = next_retry_delay(delay);
        }
        info!("discord client is ready");
        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        let Some(task) = self.gateway.lock().await.take() else {
            return Ok(());
        };

        task.abort();
        if let Err(join_err) = task.await {
            if !join_err.is_cancelled() {
                error!("discord gateway task join error: {join_err}");
            }
        }
        *self.http.write().await = None;
        info!("discord client stopped");
        Ok(())
    }

    pub async fn send_message(&self, channel_id: &str, content: &str) -> Result<String> {
        if content.trim().is_empty() {
            warn!("refusing to send empty message to discord channel {}", channel_id);
            return Err(anyhow!("message content is empty"));
        }

        let _guard = self.send_lock.lock().await;

        if self.send_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.send_delay_ms)).await;
        }

        let http_guard = self.http.read().await;
        let Some(http) = http_guard.as_deref() else {
            return Err(anyhow!("discord http client not available"));
        };

        let channel_id_num: u64 = channel_id
            .parse()
            .map_err(|_| anyhow!("invalid channel id: {}", channel_id))?;

        let content = truncate_message(content, DISCORD_MESSAGE_LIMIT);
        let message = ChannelId::new(channel_id_num)
            .send_message(http, CreateMessage::new().content(content))
            .await
            .map_err(|e| anyhow!("direct message send failed: {}", e))?;

        debug!(
            "sent message to channel {}, message_id={}",
            channel_id, message.id
        );
        Ok(message.id.to_string())
    }
}

#[async_trait]
impl ChatOutbound for DiscordClient {
    async fn send_text(&self, channel_id: &str, text: &str) -> Result<()> {
        self.send_message(channel_id, text).await.map(|_| ())
    }
}
