//! Track sources: identifier building and the yt-dlp resolver.

pub mod ytdlp;

pub use ytdlp::YtDlpResolver;

use url::Url;

/// Prefijo que pide una búsqueda en vez de cargar una URL
pub const SEARCH_PREFIX: &str = "ytsearch:";

const ZERO_WIDTH: [char; 4] = ['\u{200b}', '\u{200c}', '\u{200d}', '\u{feff}'];

/// Convierte la entrada del usuario en un identificador para el resolver
pub fn build_identifier(raw: &str) -> String {
    let cleaned: String = raw.chars().filter(|c| !ZERO_WIDTH.contains(c)).collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() {
        return SEARCH_PREFIX.to_string();
    }

    let lower = cleaned.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return normalize_youtube_url(cleaned);
    }

    format!("{}{}", SEARCH_PREFIX, cleaned)
}

pub fn is_search(identifier: &str) -> bool {
    identifier.starts_with(SEARCH_PREFIX)
}

fn is_youtube_host(host: &str) -> bool {
    host == "youtu.be" || host == "youtube.com" || host.ends_with(".youtube.com")
}

/// Normaliza enlaces de YouTube a una forma por video o playlist
pub fn normalize_youtube_url(raw: &str) -> String {
    let Ok(url) = Url::parse(raw) else {
        return raw.to_string();
    };
    let Some(host) = url.host_str().map(|h| h.to_ascii_lowercase()) else {
        return raw.to_string();
    };
    if !is_youtube_host(&host) {
        return raw.to_string();
    }

    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|p| !p.is_empty()).collect())
        .unwrap_or_default();

    if host == "youtu.be" {
        return match segments.first() {
            Some(id) => watch_url(id),
            None => raw.to_string(),
        };
    }

    match segments.as_slice() {
        ["shorts" | "embed" | "v", id, ..] => watch_url(id),
        ["watch"] => keep_params(&url, "/watch", &["v", "list", "index"]),
        ["playlist"] => keep_params(&url, "/playlist", &["list"]),
        _ => raw.to_string(),
    }
}

fn watch_url(id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", id)
}

fn keep_params(url: &Url, path: &str, keep: &[&str]) -> String {
    let mut query = url::form_urlencoded::Serializer::new(String::new());
    for key in keep {
        if let Some((_, value)) = url.query_pairs().find(|(k, _)| k == *key) {
            query.append_pair(key, &value);
        }
    }
    let query = query.finish();
    if query.is_empty() {
        format!("https://www.youtube.com{}", path)
    } else {
        format!("https://www.youtube.com{}?{}", path, query)
    }
}
