use rand::Rng;
use std::{collections::VecDeque, time::Duration};
use tracing::{debug, info, warn};

/// Pista reproducible; sin handle codificado está corrupta y nunca suena
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub encoded: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub uri: Option<String>,
    pub duration: Option<Duration>,
}

impl Track {
    pub fn new(encoded: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            encoded: Some(encoded.into()),
            title: Some(title.into()),
            author: None,
            uri: None,
            duration: None,
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn encoded(&self) -> Option<&str> {
        self.encoded.as_deref().filter(|e| !e.is_empty())
    }

    pub fn is_playable(&self) -> bool {
        self.encoded().is_some()
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("(unknown)")
    }

    pub fn display_author(&self) -> &str {
        self.author.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    #[default]
    Off,
    Track,
    Queue,
}

impl LoopMode {
    /// Alterna entre `Off` y `target`
    pub fn toggled(self, target: LoopMode) -> LoopMode {
        if self == target {
            LoopMode::Off
        } else {
            target
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFull;

/// Cola FIFO acotada por `max_size`
#[derive(Debug, Clone)]
pub struct PlayQueue {
    items: VecDeque<Track>,
    max_size: usize,
}

impl PlayQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: VecDeque::new(),
            max_size,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Espacios libres antes de llenarse
    pub fn room(&self) -> usize {
        self.max_size.saturating_sub(self.items.len())
    }

    pub fn push_back(&mut self, track: Track) -> Result<(), QueueFull> {
        if self.room() == 0 {
            return Err(QueueFull);
        }
        debug!("➕ Agregado a la cola: {}", track.display_title());
        self.items.push_back(track);
        Ok(())
    }

    pub fn push_front(&mut self, track: Track) -> Result<(), QueueFull> {
        if self.room() == 0 {
            return Err(QueueFull);
        }
        self.items.push_front(track);
        Ok(())
    }

    /// Agrega las pistas que quepan y devuelve cuántas entraron
    pub fn extend_bounded(&mut self, tracks: impl IntoIterator<Item = Track>) -> usize {
        let room = self.room();
        let before = self.items.len();
        self.items.extend(tracks.into_iter().take(room));
        let added = self.items.len() - before;
        info!("➕ Agregadas {} canciones a la cola", added);
        added
    }

    /// Obtiene la siguiente pista con handle, descartando las corruptas
    pub fn pop_playable(&mut self) -> Option<Track> {
        while let Some(track) = self.items.pop_front() {
            if track.is_playable() {
                return Some(track);
            }
            warn!(
                "⚠️ Track sin handle codificado descartado: {}",
                track.display_title()
            );
        }
        None
    }

    /// Mezcla la cola
    pub fn shuffle(&mut self) {
        let mut rng = rand::thread_rng();
        let slice = self.items.make_contiguous();
        for i in (1..slice.len()).rev() {
            let j = rng.gen_range(0..=i);
            slice.swap(i, j);
        }
        info!("🔀 Cola mezclada ({} canciones)", slice.len());
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn corrupt(title: &str) -> Track {
        Track {
            encoded: None,
            title: Some(title.to_string()),
            author: None,
            uri: None,
            duration: None,
        }
    }

    fn titles(queue: &PlayQueue) -> Vec<&str> {
        queue.iter().map(Track::display_title).collect()
    }

    #[test]
    fn rejects_push_when_full() {
        let mut queue = PlayQueue::new(2);
        queue.push_back(Track::new("a", "A")).unwrap();
        queue.push_back(Track::new("b", "B")).unwrap();
        assert_eq!(queue.push_back(Track::new("c", "C")), Err(QueueFull));
        assert_eq!(queue.push_front(Track::new("c", "C")), Err(QueueFull));
        assert_eq!(titles(&queue), vec!["A", "B"]);
    }

    #[test]
    fn extend_truncates_to_capacity() {
        let mut queue = PlayQueue::new(3);
        queue.push_back(Track::new("a", "A")).unwrap();
        let added = queue.extend_bounded(vec![
            Track::new("b", "B"),
            Track::new("c", "C"),
            Track::new("d", "D"),
        ]);
        assert_eq!(added, 2);
        assert_eq!(titles(&queue), vec!["A", "B", "C"]);
        assert_eq!(queue.room(), 0);
    }

    #[test]
    fn pop_playable_drops_corrupt_entries() {
        let mut queue = PlayQueue::new(10);
        queue.push_back(corrupt("X")).unwrap();
        queue.push_back(corrupt("Y")).unwrap();
        queue.push_back(Track::new("b", "B")).unwrap();
        queue.push_back(corrupt("Z")).unwrap();

        assert_eq!(queue.pop_playable().unwrap().display_title(), "B");
        assert_eq!(titles(&queue), vec!["Z"]);
        assert_eq!(queue.pop_playable(), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn empty_encoded_handle_is_corrupt() {
        let track = Track {
            encoded: Some(String::new()),
            ..Track::new("x", "X")
        };
        assert!(!track.is_playable());
    }

    #[test]
    fn shuffle_keeps_every_track() {
        let mut queue = PlayQueue::new(50);
        for i in 0..20 {
            queue.push_back(Track::new(i.to_string(), i.to_string())).unwrap();
        }
        queue.shuffle();

        let mut seen: Vec<String> = queue
            .iter()
            .map(|t| t.encoded().unwrap().to_string())
            .collect();
        seen.sort_by_key(|s| s.parse::<u32>().unwrap());
        let expected: Vec<String> = (0..20).map(|i: u32| i.to_string()).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn loop_modes_toggle_against_off() {
        assert_eq!(LoopMode::Off.toggled(LoopMode::Track), LoopMode::Track);
        assert_eq!(LoopMode::Track.toggled(LoopMode::Track), LoopMode::Off);
        assert_eq!(LoopMode::Track.toggled(LoopMode::Queue), LoopMode::Queue);
        assert_eq!(LoopMode::Queue.toggled(LoopMode::Queue), LoopMode::Off);
    }
}
