use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use super::track::Track;

/// Ordered list of tracks waiting to be played in a guild
#[derive(Debug, Default)]
pub struct Queue {
    tracks: VecDeque<Track>,
}

impl Queue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a track to the end of the queue
    pub fn enqueue(&mut self, track: Track) {
        self.tracks.push_back(track);
    }

    /// Add a track so it is the next one to play
    pub fn enqueue_front(&mut self, track: Track) {
        self.tracks.push_front(track);
    }

    pub fn dequeue(&mut self) -> Option<Track> {
        self.tracks.pop_front()
    }

    pub fn peek(&self) -> Option<&Track> {
        self.tracks.front()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Remove the track at a 0-based index
    pub fn remove(&mut self, index: usize) -> Option<Track> {
        self.tracks.remove(index)
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
    }

    pub fn total_duration(&self) -> Duration {
        self.tracks.iter().map(Track::duration).sum()
    }

    /// Copy of the current queue contents, unaffected by later changes
    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot(self.tracks.iter().cloned().collect())
    }
}

/// Read-only view of a queue at one point in time. Cheap to clone and iterate repeatedly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSnapshot(Arc<[Track]>);

impl QueueSnapshot {
    pub fn iter(&self) -> std::slice::Iter<'_, Track> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Track> {
        self.0.get(index)
    }

    pub fn total_duration(&self) -> Duration {
        self.0.iter().map(Track::duration).sum()
    }
}

impl Default for QueueSnapshot {
    fn default() -> Self {
        Self(Arc::from(Vec::new()))
    }
}

impl<'a> IntoIterator for &'a QueueSnapshot {
    type Item = &'a Track;
    type IntoIter = std::slice::Iter<'a, Track>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
