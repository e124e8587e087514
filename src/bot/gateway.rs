//! Serenity-backed implementations of [`Gateway`] and [`Notifier`].
//!
//! Both adapters are built before the client exists (the core needs them at
//! construction time) and receive the client's cache and HTTP handle through
//! [`DiscordHandles::attach`] once it has been built.

use async_trait::async_trait;
use serenity::{
    all::{Cache, ChannelType, CreateMessage, GuildChannel, Http, Permissions},
    model::id::{ChannelId, GuildId, UserId},
};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

use crate::audio::transport::{Gateway, Notifier};

/// Handles de caché y HTTP compartidos por los adaptadores
#[derive(Default)]
pub struct DiscordHandles {
    cache: OnceLock<Arc<Cache>>,
    http: OnceLock<Arc<Http>>,
}

impl DiscordHandles {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Llamadas posteriores se ignoran
    pub fn attach(&self, cache: Arc<Cache>, http: Arc<Http>) {
        if self.cache.set(cache).is_err() || self.http.set(http).is_err() {
            warn!("⚠️ Handles de Discord ya estaban configurados");
        }
    }

    fn cache(&self) -> Option<&Arc<Cache>> {
        self.cache.get()
    }

    fn http(&self) -> Option<&Arc<Http>> {
        self.http.get()
    }
}

/// Lee la presencia de voz desde el caché del gateway
pub struct SerenityGateway {
    handles: Arc<DiscordHandles>,
}

impl SerenityGateway {
    pub fn new(handles: Arc<DiscordHandles>) -> Self {
        Self { handles }
    }

    fn voice_channel_of(&self, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
        let cache = self.handles.cache()?;
        let guild = cache.guild(guild_id)?;
        guild.voice_states.get(&user_id)?.channel_id
    }

    fn count_humans(&self, guild_id: GuildId, channel_id: ChannelId) -> usize {
        let Some(cache) = self.handles.cache() else {
            return 0;
        };
        let bot_id = cache.current_user().id;
        let Some(guild) = cache.guild(guild_id) else {
            return 0;
        };

        guild
            .voice_states
            .values()
            .filter(|state| state.channel_id == Some(channel_id))
            .filter(|state| state.user_id != bot_id)
            .filter(|state| {
                let is_bot = guild
                    .members
                    .get(&state.user_id)
                    .map(|m| m.user.bot)
                    .or_else(|| state.member.as_ref().map(|m| m.user.bot))
                    .unwrap_or(false);
                !is_bot
            })
            .count()
    }
}

#[async_trait]
impl Gateway for SerenityGateway {
    async fn bot_voice_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        let bot_id = self.handles.cache()?.current_user().id;
        self.voice_channel_of(guild_id, bot_id)
    }

    async fn member_voice_channel(&self, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
        self.voice_channel_of(guild_id, user_id)
    }

    async fn humans_in_channel(&self, guild_id: GuildId, channel_id: ChannelId) -> usize {
        self.count_humans(guild_id, channel_id)
    }
}

/// Publica avisos en un solo canal elegido explícitamente
pub struct SerenityNotifier {
    handles: Arc<DiscordHandles>,
}

/// Veredicto sobre un canal antes de publicar en él
#[derive(Debug, PartialEq, Eq)]
enum Postable {
    Yes,
    No(&'static str),
    /// Permisos no calculables; se trata como un no
    Unknown,
}

impl Postable {
    fn allows_send(&self) -> bool {
        matches!(self, Postable::Yes)
    }
}

fn is_text_capable(kind: ChannelType) -> bool {
    matches!(
        kind,
        ChannelType::Text | ChannelType::News | ChannelType::Voice | ChannelType::Stage
    )
}

fn is_thread(kind: ChannelType) -> bool {
    matches!(
        kind,
        ChannelType::PublicThread | ChannelType::PrivateThread | ChannelType::NewsThread
    )
}

/// Chequeos de tipo de canal comunes al caché y a HTTP
fn check_kind(channel: &GuildChannel) -> Option<&'static str> {
    if is_thread(channel.kind) || channel.thread_metadata.is_some() {
        return Some("thread");
    }
    if !is_text_capable(channel.kind) {
        return Some("not a text channel");
    }
    None
}

fn check_permissions(permissions: Permissions) -> Postable {
    if permissions.contains(Permissions::VIEW_CHANNEL | Permissions::SEND_MESSAGES) {
        Postable::Yes
    } else {
        Postable::No("missing VIEW_CHANNEL or SEND_MESSAGES")
    }
}

impl SerenityNotifier {
    pub fn new(handles: Arc<DiscordHandles>) -> Self {
        Self { handles }
    }

    fn check_cached(&self, guild_id: GuildId, channel_id: ChannelId) -> Option<Postable> {
        let cache = self.handles.cache()?;
        let bot_id = cache.current_user().id;
        let guild = cache.guild(guild_id)?;
        let channel = guild.channels.get(&channel_id)?;

        if let Some(reason) = check_kind(channel) {
            return Some(Postable::No(reason));
        }
        let Some(member) = guild.members.get(&bot_id) else {
            return Some(Postable::Unknown);
        };
        Some(check_permissions(guild.user_permissions_in(channel, member)))
    }

    /// Consulta canal, miembro y roles por HTTP cuando el caché no alcanza
    async fn check_remote(&self, http: &Arc<Http>, guild_id: GuildId, channel_id: ChannelId) -> Postable {
        let Some(bot_id) = self.handles.cache().map(|cache| cache.current_user().id) else {
            return Postable::Unknown;
        };

        let channel = match http.get_channel(channel_id).await {
            Ok(channel) => match channel.guild() {
                Some(channel) => channel,
                None => return Postable::No("not a guild channel"),
            },
            Err(e) => {
                debug!("No se pudo obtener el canal {}: {:?}", channel_id, e);
                return Postable::No("channel not found");
            }
        };
        if let Some(reason) = check_kind(&channel) {
            return Postable::No(reason);
        }

        let member = match guild_id.member(http, bot_id).await {
            Ok(member) => member,
            Err(e) => {
                debug!("No se pudo obtener al bot en guild {}: {:?}", guild_id, e);
                return Postable::Unknown;
            }
        };
        let guild = match guild_id.to_partial_guild(http).await {
            Ok(guild) => guild,
            Err(e) => {
                debug!("No se pudo obtener la guild {}: {:?}", guild_id, e);
                return Postable::Unknown;
            }
        };
        check_permissions(guild.user_permissions_in(&channel, &member))
    }

    async fn check(&self, http: &Arc<Http>, guild_id: GuildId, channel_id: ChannelId) -> Postable {
        match self.check_cached(guild_id, channel_id) {
            Some(Postable::Unknown) | None => self.check_remote(http, guild_id, channel_id).await,
            Some(postable) => postable,
        }
    }
}

#[async_trait]
impl Notifier for SerenityNotifier {
    async fn send_to_channel(&self, guild_id: GuildId, channel_id: ChannelId, content: &str) -> bool {
        let Some(http) = self.handles.http() else {
            warn!("⚠️ Aviso descartado: cliente de Discord aún no disponible");
            return false;
        };

        let postable = self.check(http, guild_id, channel_id).await;
        if !postable.allows_send() {
            debug!(
                "🔕 No se envía aviso a canal {} de guild {}: {:?}",
                channel_id, guild_id, postable
            );
            return false;
        }

        match channel_id
            .send_message(http, CreateMessage::new().content(content))
            .await
        {
            Ok(_) => true,
            Err(e) => {
                warn!(
                    "⚠️ Error enviando aviso a canal {} de guild {}: {:?}",
                    channel_id, guild_id, e
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn threads_and_categories_are_not_postable() {
        assert!(is_thread(ChannelType::PublicThread));
        assert!(!is_text_capable(ChannelType::Category));
        assert!(is_text_capable(ChannelType::Voice));
    }

    #[test]
    fn posting_needs_view_and_send() {
        assert_eq!(
            check_permissions(Permissions::VIEW_CHANNEL | Permissions::SEND_MESSAGES),
            Postable::Yes
        );
        assert!(matches!(
            check_permissions(Permissions::VIEW_CHANNEL),
            Postable::No(_)
        ));
    }

    #[test]
    fn only_a_confirmed_yes_allows_sending() {
        assert!(Postable::Yes.allows_send());
        assert!(!Postable::Unknown.allows_send());
        assert!(!Postable::No("thread").allows_send());
        assert!(!check_permissions(Permissions::SEND_MESSAGES).allows_send());
    }

    #[tokio::test]
    async fn adapters_are_inert_before_the_client_exists() {
        let handles = DiscordHandles::new();
        let gateway = SerenityGateway::new(handles.clone());
        let notifier = SerenityNotifier::new(handles);
        let guild = GuildId::new(1);

        assert_eq!(gateway.bot_voice_channel(guild).await, None);
        assert_eq!(gateway.humans_in_channel(guild, ChannelId::new(2)).await, 0);
        assert!(!notifier.send_to_channel(guild, ChannelId::new(2), "hola").await);
    }
}
