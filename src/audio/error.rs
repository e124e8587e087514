use thiserror::Error;

/// Fallas del transporte de voz, sus reproductores o el resolver
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// El transporte aún tiene una sesión registrada para la guild
    #[error("an existing voice connection is still registered")]
    AlreadyConnected,

    #[error("failed to join voice channel: {0}")]
    Join(String),

    #[error("failed to leave voice channel: {0}")]
    Leave(String),

    #[error("no active voice connection")]
    NotConnected,

    #[error("playback request failed: {0}")]
    Playback(String),

    #[error("track resolution failed: {0}")]
    Resolve(String),
}

/// Resultado de un comando de música que no tuvo éxito
#[derive(Debug, Error)]
pub enum MusicError {
    #[error("user is not in a voice channel")]
    UserNotInVoice,

    #[error("bot is busy in another voice channel")]
    BusyElsewhere,

    #[error("bot is not in a voice channel")]
    BotNotInVoice,

    #[error("empty query")]
    EmptyQuery,

    #[error("no results")]
    NoResults,

    #[error("queue is full (max {max})")]
    QueueFull { max: usize },

    #[error("nothing is playing")]
    NothingPlaying,

    #[error("queue is empty")]
    NothingToShuffle,

    #[error("could not resolve query: {0}")]
    ResolveFailed(String),

    #[error("could not connect: {0}")]
    Connect(#[source] TransportError),

    #[error("could not start playback: {0}")]
    Playback(#[source] TransportError),
}

impl MusicError {
    /// Si es un error del usuario y no una falla del sistema
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            MusicError::UserNotInVoice
                | MusicError::BusyElsewhere
                | MusicError::BotNotInVoice
                | MusicError::EmptyQuery
                | MusicError::NoResults
                | MusicError::QueueFull { .. }
                | MusicError::NothingPlaying
                | MusicError::NothingToShuffle
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_user_errors() {
        assert!(MusicError::QueueFull { max: 3 }.is_user_error());
        assert!(MusicError::UserNotInVoice.is_user_error());
        assert!(!MusicError::Connect(TransportError::NotConnected).is_user_error());
        assert!(!MusicError::ResolveFailed("boom".into()).is_user_error());
    }
}
