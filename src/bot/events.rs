use serenity::{
    all::VoiceState,
    model::id::{ChannelId, GuildId, UserId},
};

use crate::audio::events::VoiceStateChange;

/// Reduce un cambio de estado de voz a lo que usa el reactor
pub fn voice_state_change(
    old: Option<&VoiceState>,
    new: &VoiceState,
    bot_id: UserId,
) -> Option<VoiceStateChange> {
    let guild_id = new.guild_id.or_else(|| old.and_then(|o| o.guild_id))?;
    channel_change(
        guild_id,
        new.user_id,
        bot_id,
        old.and_then(|o| o.channel_id),
        new.channel_id,
    )
}

fn channel_change(
    guild_id: GuildId,
    user_id: UserId,
    bot_id: UserId,
    old_channel: Option<ChannelId>,
    new_channel: Option<ChannelId>,
) -> Option<VoiceStateChange> {
    if old_channel == new_channel {
        return None;
    }
    Some(VoiceStateChange {
        guild_id,
        user_id,
        is_self: user_id == bot_id,
        old_channel,
        new_channel,
    })
}
