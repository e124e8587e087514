//! User-facing texts: channel notices and command replies.

use std::time::Duration;

use crate::audio::{error::MusicError, lock::LockError, queue::LoopMode, queue::Track};

pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

/// "título - autor", o solo el título si no hay autor
pub fn track_line(track: &Track) -> String {
    match track.display_author() {
        "" => format!("**{}**", track.display_title()),
        author => format!("**{}** - {}", track.display_title(), author),
    }
}

pub fn now_playing(track: &Track) -> String {
    let mut text = format!("🎵 Reproduciendo ahora: {}", track_line(track));
    if let Some(duration) = track.duration {
        text.push_str(&format!(" `[{}]`", format_duration(duration)));
    }
    text
}

pub fn queue_finished(auto_leave: Duration) -> String {
    format!(
        "📭 No quedan canciones en la cola. Me desconectaré en {} si nadie agrega música.",
        humanize(auto_leave)
    )
}

pub fn idle_leave() -> String {
    "💤 Me desconecté por inactividad. Usa `/play` para volver a llamarme.".to_string()
}

pub fn forced_disconnect() -> String {
    "🔌 Me desconectaron del canal de voz. La cola se ha limpiado.".to_string()
}

pub fn forced_move() -> String {
    "🔀 Me movieron a otro canal de voz, así que salí y limpié la cola. Usa `/play` para empezar de nuevo."
        .to_string()
}

pub fn nobody_left() -> String {
    "👋 No queda nadie en el canal de voz, así que me voy.".to_string()
}

pub fn skipped(track: &Track) -> String {
    format!("⏭️ Saltada: {}", track_line(track))
}

pub fn left() -> String {
    "👋 Me desconecté del canal de voz y limpié la cola.".to_string()
}

pub fn loop_track(mode: LoopMode) -> String {
    match mode {
        LoopMode::Track => "🔂 Repetición de la canción actual **activada**.".to_string(),
        _ => "▶️ Repetición de la canción **desactivada**.".to_string(),
    }
}

pub fn loop_queue(mode: LoopMode) -> String {
    match mode {
        LoopMode::Queue => "🔁 Repetición de la cola **activada**.".to_string(),
        _ => "▶️ Repetición de la cola **desactivada**.".to_string(),
    }
}

pub fn loop_label(mode: LoopMode) -> &'static str {
    match mode {
        LoopMode::Off => "▶️ Sin repetición",
        LoopMode::Track => "🔂 Canción",
        LoopMode::Queue => "🔁 Cola",
    }
}

pub fn shuffled(count: usize) -> String {
    format!("🔀 Mezcladas {} canciones de la cola.", count)
}

pub fn queue_empty() -> String {
    "😴 No hay nada en la cola. Usa `/play <canción>` para agregar música.".to_string()
}

pub fn guild_not_allowed() -> String {
    "🚫 Este bot no está habilitado en este servidor.".to_string()
}

pub fn guild_only() -> String {
    "❌ Este comando solo funciona dentro de un servidor.".to_string()
}

pub fn fallback_apology() -> String {
    "❌ Algo salió mal al procesar el comando. Inténtalo de nuevo en unos segundos.".to_string()
}

pub fn lock_error(error: &LockError) -> String {
    match error {
        LockError::TimedOut(_) => {
            "⏳ El comando tardó demasiado. Puede que aún se complete; revisa `/queue` en un momento."
                .to_string()
        }
        LockError::Panicked => fallback_apology(),
    }
}

/// Texto de error para el usuario; las fallas internas reciben uno genérico
pub fn error_reply(error: &MusicError) -> String {
    match error {
        MusicError::UserNotInVoice => "🔇 Tienes que estar en un canal de voz.".to_string(),
        MusicError::BusyElsewhere => {
            "🎧 Ya estoy reproduciendo en otro canal de voz de este servidor.".to_string()
        }
        MusicError::BotNotInVoice => "🔇 No estoy en ningún canal de voz.".to_string(),
        MusicError::EmptyQuery => "❓ Escribe el nombre de una canción o un enlace.".to_string(),
        MusicError::NoResults => "🔍 No encontré resultados para esa búsqueda.".to_string(),
        MusicError::QueueFull { max } => {
            format!("📦 La cola está llena (máximo {} canciones).", max)
        }
        MusicError::NothingPlaying => "⏹️ No hay nada reproduciéndose.".to_string(),
        MusicError::NothingToShuffle => "😴 La cola está vacía, no hay nada que mezclar.".to_string(),
        MusicError::ResolveFailed(_) | MusicError::Connect(_) | MusicError::Playback(_) => {
            "⚠️ No pude completar la operación. Inténtalo de nuevo en unos segundos.".to_string()
        }
    }
}

fn humanize(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 60 && secs % 60 == 0 {
        let minutes = secs / 60;
        if minutes == 1 {
            "1 minuto".to_string()
        } else {
            format!("{} minutos", minutes)
        }
    } else {
        format!("{} segundos", secs)
    }
}
