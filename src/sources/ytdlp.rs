use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, warn};

use super::is_search;
use crate::audio::{
    error::TransportError,
    queue::Track,
    transport::{LoadResult, LoadType, TrackResolver},
};

/// Resuelve identificadores pidiendo a yt-dlp el JSON, sin descargar
pub struct YtDlpResolver {
    program: String,
    timeout: Duration,
}

impl YtDlpResolver {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Entry {
    title: Option<String>,
    uploader: Option<String>,
    channel: Option<String>,
    duration: Option<f64>,
    webpage_url: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Document {
    #[serde(rename = "_type")]
    kind: Option<String>,
    entries: Option<Vec<Entry>>,
    #[serde(flatten)]
    entry: Entry,
}

impl Entry {
    fn into_track(self) -> Track {
        let encoded = self.webpage_url.or(self.url).filter(|u| !u.is_empty());
        Track {
            uri: encoded.clone(),
            encoded,
            title: self.title,
            author: self.uploader.or(self.channel),
            duration: self
                .duration
                .filter(|d| d.is_finite() && *d > 0.0)
                .map(Duration::from_secs_f64),
        }
    }
}

/// Clasifica la salida `-J` de yt-dlp
fn classify(identifier: &str, json: &str) -> LoadResult {
    let document: Document = match serde_json::from_str(json) {
        Ok(document) => document,
        Err(e) => {
            warn!("⚠️ Respuesta de yt-dlp no válida: {}", e);
            return LoadResult::error(format!("invalid yt-dlp output: {}", e));
        }
    };

    let is_playlist = document.kind.as_deref() == Some("playlist");
    let (load_type, tracks) = match (is_search(identifier), is_playlist) {
        (true, _) => (
            LoadType::Search,
            document.entries.unwrap_or_default().into_iter().map(Entry::into_track).collect(),
        ),
        (false, true) => (
            LoadType::Playlist,
            document.entries.unwrap_or_default().into_iter().map(Entry::into_track).collect(),
        ),
        (false, false) => (LoadType::Track, vec![document.entry.into_track()]),
    };

    if tracks.is_empty() {
        return LoadResult::empty();
    }
    LoadResult {
        load_type,
        tracks,
        message: None,
    }
}

#[async_trait]
impl TrackResolver for YtDlpResolver {
    async fn resolve(&self, identifier: &str) -> Result<LoadResult, TransportError> {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args([
            "-J",
            "--flat-playlist",
            "--no-warnings",
            "--socket-timeout",
            "15",
        ])
        .arg(identifier)
        .kill_on_drop(true);

        debug!("🔍 yt-dlp resolviendo: {}", identifier);
        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                error!("❌ No se pudo ejecutar {}: {}", self.program, e);
                return Err(TransportError::Resolve(e.to_string()));
            }
            Err(_) => {
                return Err(TransportError::Resolve(format!(
                    "yt-dlp timed out after {:?}",
                    self.timeout
                )))
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("⚠️ yt-dlp falló para '{}': {}", identifier, stderr.trim());
            return Ok(LoadResult::error(stderr.trim().to_string()));
        }

        Ok(classify(identifier, &String::from_utf8_lossy(&output.stdout)))
    }
}
