//! # TrackList Module
//!
//! An append-only queue of recorded tracks that share one key, consumed in
//! FIFO order through a cursor.

use crate::track::Track;
use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::sync::Arc;
use tracing::trace;

#[derive(Debug, Default)]
struct Inner {
    tracks: Vec<Arc<Track>>,
    cursor: usize,
}

/// Ordered recordings for one key.
///
/// Each stored track is handed out by [`TrackList::next`] at most once per
/// pass; [`TrackList::reset_iterator`] starts a new pass.
#[derive(Debug, Default)]
pub struct TrackList {
    inner: RwLock<Inner>,
}

impl TrackList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a track. Callers are responsible for only appending
    /// recorded tracks.
    pub fn append(&self, track: impl Into<Arc<Track>>) {
        self.inner.write().tracks.push(track.into());
    }

    /// Number of stored tracks, taken or not.
    pub fn len(&self) -> usize {
        self.inner.read().tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of tracks not yet handed out in this pass.
    pub fn remaining(&self) -> usize {
        let inner = self.inner.read();
        inner.tracks.len() - inner.cursor
    }

    /// Returns the track under the cursor and advances it, or `None` once
    /// every track has been taken.
    pub fn next(&self) -> Option<Arc<Track>> {
        let mut inner = self.inner.write();
        let track = inner.tracks.get(inner.cursor).cloned()?;
        inner.cursor += 1;
        trace!(position = inner.cursor, total = inner.tracks.len(), "track taken");
        Some(track)
    }

    /// Moves the cursor back to the first track.
    pub fn reset_iterator(&self) {
        self.inner.write().cursor = 0;
    }
}

#[derive(Serialize)]
struct TrackListRef<'a> {
    tracks: Vec<&'a Track>,
}

#[derive(Deserialize)]
struct TrackListRepr {
    tracks: Vec<Track>,
}

// The cursor is never persisted: a restored list starts at the first track.
impl Serialize for TrackList {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let inner = self.inner.read();
        TrackListRef {
            tracks: inner.tracks.iter().map(Arc::as_ref).collect(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TrackList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = TrackListRepr::deserialize(deserializer)?;
        Ok(TrackList {
            inner: RwLock::new(Inner {
                tracks: repr.tracks.into_iter().map(Arc::new).collect(),
                cursor: 0,
            }),
        })
    }
}
