use serenity::{
    all::{Colour, Timestamp},
    builder::{CreateEmbed, CreateEmbedFooter},
};

use super::messages::{self, format_duration, track_line};
use crate::audio::player::{PlayOutcome, QueueSnapshot};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
}

const STANDARD_FOOTER: &str = "🎵 GuildTunes";

/// Entradas que muestra `/queue`
pub const QUEUE_PREVIEW: usize = 10;

/// Crea el embed de respuesta para `/play`
pub fn create_play_embed(outcome: &PlayOutcome) -> CreateEmbed {
    let embed = match outcome {
        PlayOutcome::Queued { track, started } => {
            let (title, colour) = if *started {
                ("🎵 Reproduciendo Ahora", colors::MUSIC_PURPLE)
            } else {
                ("✅ Canción Agregada", colors::SUCCESS_GREEN)
            };
            let mut embed = CreateEmbed::default()
                .title(title)
                .description(track_line(track))
                .color(colour);
            if let Some(duration) = track.duration {
                embed = embed.field("⏱️ Duración", format_duration(duration), true);
            }
            if let Some(uri) = &track.uri {
                embed = embed.url(uri);
            }
            embed
        }
        PlayOutcome::PlaylistQueued {
            added,
            skipped,
            started,
        } => {
            let mut embed = CreateEmbed::default()
                .title("📋 Playlist Agregada")
                .description(format!(
                    "Se agregaron **{}** canciones a la cola de reproducción",
                    added
                ))
                .color(colors::SUCCESS_GREEN);
            if *skipped > 0 {
                embed = embed.field(
                    "⚠️ Omitidas por límite de cola",
                    skipped.to_string(),
                    true,
                );
            }
            if let Some(track) = started {
                embed = embed.field("🎵 Reproduciendo", track_line(track), false);
            }
            embed
        }
    };

    embed
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

/// Crea un embed para mostrar la cola de reproducción
pub fn create_queue_embed(snapshot: &QueueSnapshot) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if let Some(current) = &snapshot.current {
        let status = if snapshot.playing { "▶️ Reproduciendo" } else { "⏭️ Cambiando de canción" };
        embed = embed.field(status, track_line(current), false);
    }

    if !snapshot.upcoming.is_empty() {
        let mut description = String::new();
        for (i, track) in snapshot.upcoming.iter().enumerate() {
            let duration = track
                .duration
                .map(|d| format!(" `[{}]`", format_duration(d)))
                .unwrap_or_default();
            description.push_str(&format!("**{}**. {}{}\n", i + 1, track_line(track), duration));
        }
        if snapshot.total > snapshot.upcoming.len() {
            description.push_str(&format!(
                "… y {} más",
                snapshot.total - snapshot.upcoming.len()
            ));
        }
        embed = embed.field("Próximas canciones", description, false);
    }

    embed
        .field(
            "Información",
            format!(
                "**Cola:** {}/{} • **Repetición:** {}",
                snapshot.total,
                snapshot.max,
                messages::loop_label(snapshot.loop_mode)
            ),
            false,
        )
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

/// Crea un embed de error
pub fn create_error_embed(description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .description(description)
        .color(colors::ERROR_RED)
}

/// Crea un embed simple para confirmaciones cortas
pub fn create_notice_embed(description: &str, colour: Colour) -> CreateEmbed {
    CreateEmbed::default().description(description).color(colour)
}
