use anyhow::Result;
use serenity::model::id::GuildId;
use std::time::Duration;

use crate::audio::{connection::ConnectionTimings, player::PlaybackSettings};

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    /// Guilds that receive guild-scoped command registration.
    pub guild_ids: Vec<u64>,
    /// Guilds allowed to use the bot. Empty means every guild.
    pub allow_guilds: Vec<u64>,

    // Playback
    pub max_queue_size: usize,
    pub auto_leave_secs: u64,
    pub empty_channel_debounce_ms: u64,
    pub self_leave_grace_ms: u64,
    /// Upper bound for one serialized guild command. 0 disables the limit.
    pub command_timeout_secs: u64,

    // Sources
    pub ytdlp_path: String,
    pub debug_resolve: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            discord_token: std::env::var("DISCORD_TOKEN")?,
            application_id: std::env::var("APPLICATION_ID")?.parse()?,
            guild_ids: parse_id_list(&std::env::var("GUILD_ID").unwrap_or_default())?,
            allow_guilds: parse_id_list(&std::env::var("ALLOW_GUILDS").unwrap_or_default())?,

            max_queue_size: std::env::var("MAX_QUEUE_SIZE")
                .unwrap_or_else(|_| "100".to_string())
                .parse()?,
            auto_leave_secs: std::env::var("AUTO_LEAVE_SECS")
                .unwrap_or_else(|_| "180".to_string()) // 3 minutos
                .parse()?,
            empty_channel_debounce_ms: std::env::var("EMPTY_CHANNEL_DEBOUNCE_MS")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            self_leave_grace_ms: std::env::var("SELF_LEAVE_GRACE_MS")
                .unwrap_or_else(|_| "10000".to_string())
                .parse()?,
            command_timeout_secs: std::env::var("COMMAND_TIMEOUT_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()?,

            ytdlp_path: std::env::var("YTDLP_PATH").unwrap_or_else(|_| "yt-dlp".to_string()),
            debug_resolve: matches!(
                std::env::var("DEBUG_RESOLVE").as_deref(),
                Ok("1") | Ok("true")
            ),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Queue capacity must be greater than 0
    /// - Auto-leave delay must be greater than 0
    /// - The self-leave grace window must cover the empty-channel debounce,
    ///   otherwise the bot's own departure notices can be duplicated
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN must not be empty");
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.auto_leave_secs == 0 {
            anyhow::bail!("Auto-leave delay must be greater than 0");
        }

        if self.self_leave_grace_ms < self.empty_channel_debounce_ms {
            anyhow::bail!(
                "SELF_LEAVE_GRACE_MS ({}) must be >= EMPTY_CHANNEL_DEBOUNCE_MS ({})",
                self.self_leave_grace_ms,
                self.empty_channel_debounce_ms
            );
        }

        Ok(())
    }

    /// Whether interactions from `guild_id` may be served.
    pub fn is_allowed_guild(&self, guild_id: GuildId) -> bool {
        self.allow_guilds.is_empty() || self.allow_guilds.contains(&guild_id.get())
    }

    /// Guilds that get guild-scoped command registration; empty means global.
    pub fn registration_guilds(&self) -> Vec<GuildId> {
        let mut ids: Vec<u64> = self
            .guild_ids
            .iter()
            .chain(self.allow_guilds.iter())
            .copied()
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids.into_iter().map(GuildId::new).collect()
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        (self.command_timeout_secs > 0).then(|| Duration::from_secs(self.command_timeout_secs))
    }

    pub fn playback_settings(&self) -> PlaybackSettings {
        PlaybackSettings {
            max_queue: self.max_queue_size,
            auto_leave: Duration::from_secs(self.auto_leave_secs),
            self_leave_grace: Duration::from_millis(self.self_leave_grace_ms),
            empty_channel_debounce: Duration::from_millis(self.empty_channel_debounce_ms),
            debug_resolve: self.debug_resolve,
        }
    }

    pub fn connection_timings(&self) -> ConnectionTimings {
        ConnectionTimings::default()
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// The token is never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (registration: {})\n  \
            Allowed guilds: {}\n  \
            Playback: queue {}, auto-leave {}s, empty debounce {}ms, self-leave grace {}ms\n  \
            Commands: timeout {}\n  \
            Sources: {} (debug resolve={})",
            self.application_id,
            if self.registration_guilds().is_empty() {
                "global".to_string()
            } else {
                format!("{} guild(s)", self.registration_guilds().len())
            },
            if self.allow_guilds.is_empty() {
                "all".to_string()
            } else {
                self.allow_guilds.len().to_string()
            },
            self.max_queue_size,
            self.auto_leave_secs,
            self.empty_channel_debounce_ms,
            self.self_leave_grace_ms,
            self.command_timeout()
                .map_or("none".to_string(), |t| format!("{}s", t.as_secs())),
            self.ytdlp_path,
            self.debug_resolve
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discord_token: String::new(),
            application_id: 0,
            guild_ids: Vec::new(),
            allow_guilds: Vec::new(),

            max_queue_size: 100,
            auto_leave_secs: 180,
            empty_channel_debounce_ms: 3000,
            self_leave_grace_ms: 10_000,
            command_timeout_secs: 60,

            ytdlp_path: "yt-dlp".to_string(),
            debug_resolve: false,
        }
    }
}

/// Splits a comma/whitespace separated list of snowflakes.
fn parse_id_list(raw: &str) -> Result<Vec<u64>> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u64>()
                .map_err(|e| anyhow::anyhow!("invalid guild id {:?}: {}", s, e))
        })
        .collect()
}
