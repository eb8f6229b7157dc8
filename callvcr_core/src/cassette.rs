//! # Cassette Module
//!
//! A [`Cassette`] groups recorded tracks by [`Key`] and is the single entry
//! point for dual-mode execution through [`Cassette::exec`]:
//!
//! - a freshly created cassette is in [`Mode::Recording`]: every call runs
//!   for real and is stored;
//! - a cassette restored from persisted state is in [`Mode::Replaying`]:
//!   every call is answered from the stored tracks, in recording order, and
//!   the callable is never invoked.
//!
//! ## Example
//!
//! ```rust
//! use callvcr_core::{Cassette, Slot, Track};
//!
//! let live = Cassette::new();
//! let len = Slot::<usize>::new();
//! live.exec(Track::new().call(|s: String| s.len()).arg("four".to_string()).results_in(&len))
//!     .unwrap();
//! assert_eq!(len.get(), Some(4));
//!
//! let fixture = live.to_json().unwrap();
//! let replay = Cassette::from_json(&fixture).unwrap();
//!
//! let len = Slot::<usize>::new();
//! replay
//!     .exec(Track::new().call(|_: String| -> usize { unreachable!() }).arg("four".to_string()).results_in(&len))
//!     .unwrap();
//! assert_eq!(len.get(), Some(4));
//! ```

use crate::codec::{self, Format};
use crate::error::{Result, VcrError};
use crate::track::{Key, Track};
use crate::tracklist::TrackList;
use parking_lot::RwLock;
use serde::de::Error as _;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Process-wide source for cassette identifiers.
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Whether [`Cassette::exec`] runs calls or replays them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Calls run for real and are stored.
    Recording,
    /// Calls are answered from stored tracks.
    Replaying,
}

/// Recorded tracks grouped by key.
#[derive(Debug)]
pub struct Cassette {
    id: u64,
    tracks: RwLock<BTreeMap<Key, TrackList>>,
    mode: Mode,
}

impl Cassette {
    /// Creates an empty cassette in recording mode with the next
    /// process-wide identifier.
    pub fn new() -> Self {
        Self::with_id(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Creates an empty cassette in recording mode with a caller-chosen
    /// identifier.
    pub fn with_id(id: u64) -> Self {
        Self {
            id,
            tracks: RwLock::new(BTreeMap::new()),
            mode: Mode::Recording,
        }
    }

    /// Identifier used by [`Vcr`](crate::Vcr); kept across persistence.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether [`Cassette::exec`] runs or replays calls.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_replaying(&self) -> bool {
        self.mode == Mode::Replaying
    }

    /// Stores recorded tracks under their keys.
    ///
    /// Stops at the first unrecorded track with [`VcrError::NotRecordedYet`];
    /// tracks stored before it stay stored.
    pub fn record<I>(&self, tracks: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<Arc<Track>>,
    {
        let mut map = self.tracks.write();

        for track in tracks {
            let track: Arc<Track> = track.into();
            if !track.is_recorded() {
                return Err(VcrError::NotRecordedYet);
            }

            let key = track.key();
            debug!(cassette = self.id, key = %key, "track stored");
            map.entry(key).or_default().append(track);
        }

        Ok(())
    }

    /// Total number of stored tracks across all keys.
    pub fn len(&self) -> usize {
        self.tracks.read().values().map(TrackList::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys with at least one stored track, in order.
    pub fn keys(&self) -> Vec<Key> {
        self.tracks.read().keys().cloned().collect()
    }

    /// Takes the next unconsumed track for `key`.
    ///
    /// Returns `None` for an unknown key and once the key's tracks are
    /// exhausted.
    pub fn lookup(&self, key: &Key) -> Option<Arc<Track>> {
        self.tracks.read().get(key).and_then(TrackList::next)
    }

    /// Starts a fresh pass over every key.
    pub fn rewind(&self) {
        for list in self.tracks.read().values() {
            list.reset_iterator();
        }
    }

    /// Dual-mode execution.
    ///
    /// Replaying: copies the next stored outputs for the track's key into the
    /// track's sinks, or fails with [`VcrError::PlaybackMiss`]. Recording:
    /// records the track, invoking its callable, and stores it. A failed
    /// recording stores nothing; the callable has only run if the error is
    /// [`VcrError::OutputEncoding`].
    pub fn exec(&self, mut track: Track) -> Result<()> {
        match self.mode {
            Mode::Replaying => {
                let key = track.key();
                let Some(stored) = self.lookup(&key) else {
                    warn!(cassette = self.id, key = %key, "playback miss");
                    return Err(VcrError::PlaybackMiss(key));
                };
                debug!(cassette = self.id, key = %key, "track replayed");
                stored.playback_as(&track)
            }
            Mode::Recording => {
                // The cassette lock is only taken once the call has returned.
                if let Err(err) = track.record() {
                    if matches!(err, VcrError::OutputEncoding(_)) {
                        warn!(
                            cassette = self.id,
                            key = %track.key(),
                            error = %err,
                            "call ran but can't be recorded"
                        );
                    }
                    return Err(err);
                }
                self.record([track])
            }
        }
    }

    /// Encodes the cassette as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        codec::encode(self, Format::Json)
    }

    /// Restores a cassette in replaying mode from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        codec::decode(json, Format::Json)
    }

    /// Encodes the cassette as YAML.
    pub fn to_yaml(&self) -> Result<String> {
        codec::encode(self, Format::Yaml)
    }

    /// Restores a cassette in replaying mode from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        codec::decode(yaml, Format::Yaml)
    }

    /// Writes the cassette to `path`, in the format its extension names
    /// (JSON when it names none).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        codec::write_file(self, path, Format::from_path(path).unwrap_or_default())
    }

    /// Reads a cassette from `path`, in the format its extension names
    /// (JSON when it names none). The result is in replaying mode.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        codec::read_file(path, Format::from_path(path).unwrap_or_default())
    }
}

impl Default for Cassette {
    fn default() -> Self {
        Self::new()
    }
}

impl Serialize for Cassette {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let tracks = self.tracks.read();
        let mut state = serializer.serialize_struct("Cassette", 2)?;
        state.serialize_field("id", &self.id)?;
        state.serialize_field("tracks", &*tracks)?;
        state.end()
    }
}

#[derive(Deserialize)]
struct CassetteRepr {
    id: u64,
    tracks: BTreeMap<Key, TrackList>,
}

impl<'de> Deserialize<'de> for Cassette {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let repr = CassetteRepr::deserialize(deserializer)?;

        for (key, list) in &repr.tracks {
            let all_recorded = std::iter::from_fn(|| list.next()).all(|t| t.is_recorded());
            list.reset_iterator();
            if !all_recorded {
                return Err(D::Error::custom(format!(
                    "cassette {} holds an unrecorded track under `{key}`",
                    repr.id
                )));
            }
        }

        debug!(cassette = repr.id, keys = repr.tracks.len(), "cassette restored");
        Ok(Cassette {
            id: repr.id,
            tracks: RwLock::new(repr.tracks),
            mode: Mode::Replaying,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Slot;
    use std::sync::atomic::AtomicUsize;

    fn recorded_track() -> Track {
        let mut track = Track::new().call(|| {});
        track.record().unwrap();
        track
    }

    fn echo_track(arg: &str, sink: &Slot<String>, calls: &Arc<AtomicUsize>) -> Track {
        let calls = Arc::clone(calls);
        Track::new()
            .call(move |s: String| {
                calls.fetch_add(1, Ordering::SeqCst);
                s
            })
            .arg(arg.to_string())
            .results_in(sink)
    }

    #[test]
    fn test_cassette_gets_id_on_creation() {
        let a = Cassette::new();
        let b = Cassette::new();
        assert_ne!(a.id(), 0);
        assert_ne!(a.id(), b.id());
        assert_eq!(Cassette::with_id(7).id(), 7);
        assert_eq!(a.mode(), Mode::Recording);
    }

    #[test]
    fn test_cant_record_unrecorded_track() {
        let cassette = Cassette::new();
        let err = cassette.record([Track::new()]).unwrap_err();
        assert!(matches!(err, VcrError::NotRecordedYet));
        assert!(cassette.is_empty());
    }

    #[test]
    fn test_failure_keeps_earlier_tracks() {
        let cassette = Cassette::new();
        let err = cassette
            .record([recorded_track(), Track::new(), recorded_track()])
            .unwrap_err();
        assert!(matches!(err, VcrError::NotRecordedYet));
        assert_eq!(cassette.len(), 1);
    }

    #[test]
    fn test_length() {
        let cassette = Cassette::new();
        let shared = Arc::new(recorded_track());
        cassette.record([Arc::clone(&shared)]).unwrap();
        assert_eq!(cassette.len(), 1);
        cassette.record([shared]).unwrap();
        assert_eq!(cassette.len(), 2);

        let tracks: Vec<Track> = ["one", "two"]
            .into_iter()
            .map(|arg| {
                let mut track = Track::new().call(|_: String| {}).arg(arg.to_string());
                track.record().unwrap();
                track
            })
            .collect();
        cassette.record(tracks).unwrap();
        assert_eq!(cassette.len(), 4);
        assert_eq!(cassette.keys().len(), 3);
    }

    #[test]
    fn test_lookup_misses() {
        let cassette = Cassette::new();
        assert!(cassette.lookup(&Track::new().key()).is_none());

        cassette.record([recorded_track()]).unwrap();
        let key = Track::new()
            .call(|_: String| {})
            .arg("hey girl".to_string())
            .key();
        assert!(cassette.lookup(&key).is_none());
    }

    #[test]
    fn test_cant_play_twice_what_was_recorded_once() {
        let cassette = Cassette::new();
        let track = recorded_track();
        let key = track.key();
        cassette.record([track]).unwrap();

        assert_eq!(cassette.lookup(&key).map(|t| t.key()), Some(key.clone()));
        assert!(cassette.lookup(&key).is_none());

        cassette.rewind();
        assert!(cassette.lookup(&key).is_some());
    }

    #[test]
    fn test_lookup_in_order() {
        let cassette = Cassette::new();
        for name in ["Alice", "Mary"] {
            let greeting = format!("hey {name}");
            let mut track = Track::new()
                .call(move || greeting.clone())
                .results_in(&Slot::<String>::new());
            track.record().unwrap();
            cassette.record([track]).unwrap();
        }

        let key = Track::new().call(|| "hey girl".to_string()).key();
        for name in ["Alice", "Mary"] {
            let track = cassette.lookup(&key).expect("recorded");
            let result = Slot::<String>::new();
            track.playback_into(&result).unwrap();
            assert_eq!(result.get(), Some(format!("hey {name}")));
        }
    }

    #[test]
    fn test_dump_and_restore() {
        let calls = Arc::new(AtomicUsize::new(0));
        let result = Slot::<String>::new();
        let mut track = echo_track("Hello world", &result, &calls);
        track.record().unwrap();
        let key = track.key();

        let cassette = Cassette::new();
        cassette.record([track]).unwrap();

        let dump = cassette.to_json().unwrap();
        assert!(dump.contains("Hello world"));

        let restored = Cassette::from_json(&dump).unwrap();
        assert!(restored.is_replaying());
        assert_eq!(restored.id(), cassette.id());
        assert_eq!(restored.to_json().unwrap(), dump);

        let replayed = Slot::<String>::new();
        restored
            .lookup(&key)
            .expect("restored track")
            .playback_into(&replayed)
            .unwrap();
        assert_eq!(replayed.get().as_deref(), Some("Hello world"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_exec_records_then_replays() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cassette = Cassette::new();

        let result = Slot::<String>::new();
        cassette
            .exec(echo_track("Hello world", &result, &calls))
            .unwrap();
        assert_eq!(result.get().as_deref(), Some("Hello world"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let dump = cassette.to_json().unwrap();
        let restored = Cassette::from_json(&dump).unwrap();

        let result = Slot::<String>::new();
        restored
            .exec(echo_track("Hello world", &result, &calls))
            .unwrap();
        assert_eq!(result.get().as_deref(), Some("Hello world"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_exec_live_runs_every_time() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cassette = Cassette::new();

        for _ in 0..2 {
            let result = Slot::<String>::new();
            cassette.exec(echo_track("same", &result, &calls)).unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let key = echo_track("same", &Slot::new(), &calls).key();
        assert!(cassette.lookup(&key).is_some());
        assert!(cassette.lookup(&key).is_some());
        assert!(cassette.lookup(&key).is_none());
    }

    #[test]
    fn test_round_trip_two_keys() {
        let cassette = Cassette::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let next_value = |arg: &str| {
            let counter = Arc::clone(&counter);
            Track::new()
                .call(move |s: String| (s, counter.fetch_add(1, Ordering::SeqCst)))
                .arg(arg.to_string())
                .results_in((&Slot::<String>::new(), &Slot::<usize>::new()))
        };

        cassette.exec(next_value("a")).unwrap();
        cassette.exec(next_value("b")).unwrap();
        cassette.exec(next_value("a")).unwrap();
        assert_eq!(cassette.len(), 3);

        let first = cassette.to_json().unwrap();
        let restored = Cassette::from_json(&first).unwrap();
        assert_eq!(restored.to_json().unwrap(), first);
        assert_eq!(restored.len(), 3);

        let replays = Arc::new(AtomicUsize::new(100));
        let replay = |arg: &str, text: &Slot<String>, n: &Slot<usize>| {
            let replays = Arc::clone(&replays);
            Track::new()
                .call(move |s: String| (s, replays.fetch_add(1, Ordering::SeqCst)))
                .arg(arg.to_string())
                .results_in((text, n))
        };

        let text = Slot::new();
        let n = Slot::new();
        restored.exec(replay("a", &text, &n)).unwrap();
        assert_eq!(n.get(), Some(0));
        restored.exec(replay("a", &text, &n)).unwrap();
        assert_eq!(n.get(), Some(2));
        assert_eq!(text.get().as_deref(), Some("a"));

        let err = restored.exec(replay("a", &text, &n)).unwrap_err();
        assert!(matches!(err, VcrError::PlaybackMiss(_)));

        restored.exec(replay("b", &text, &n)).unwrap();
        assert_eq!(n.get(), Some(1));
        assert_eq!(replays.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn test_replay_of_unknown_call_misses() {
        let restored = Cassette::from_json(&Cassette::with_id(3).to_json().unwrap()).unwrap();
        let err = restored
            .exec(Track::new().call(|| {}))
            .unwrap_err();
        match err {
            VcrError::PlaybackMiss(key) => assert_eq!(key.as_str(), "fn()[]"),
            other => panic!("expected PlaybackMiss, got {other:?}"),
        }
    }

    #[test]
    fn test_replay_into_incompatible_sinks() {
        let cassette = Cassette::new();
        cassette
            .exec(Track::new().call(|| 5u32).results_in(&Slot::<u32>::new()))
            .unwrap();
        let restored = Cassette::from_json(&cassette.to_json().unwrap()).unwrap();

        let err = restored
            .exec(Track::new().call(|| 5u32).results_in(&Slot::<String>::new()))
            .unwrap_err();
        assert!(matches!(err, VcrError::SignatureMismatch(_)));
    }

    #[test]
    fn test_yaml_round_trip() {
        let cassette = Cassette::new();
        cassette
            .exec(
                Track::new()
                    .call(|s: String, n: i64| (s.repeat(2), n * 2))
                    .with(("ab".to_string(), 21i64))
                    .results_in((&Slot::<String>::new(), &Slot::<i64>::new())),
            )
            .unwrap();

        let dump = cassette.to_yaml().unwrap();
        let restored = Cassette::from_yaml(&dump).unwrap();
        assert_eq!(restored.to_yaml().unwrap(), dump);
        assert_eq!(restored.to_json().unwrap(), cassette.to_json().unwrap());
    }

    #[test]
    fn test_restore_rejects_unrecorded_track() {
        let json = r#"{
            "id": 9,
            "tracks": {
                "fn()[]": {
                    "tracks": [
                        {"args": [], "results": [], "recorded": false, "duration": {"secs": 0, "nanos": 0}}
                    ]
                }
            }
        }"#;
        let err = Cassette::from_json(json).unwrap_err();
        assert!(matches!(err, VcrError::Serialization(_)));
    }

    #[test]
    fn test_concurrent_exec_records_everything() {
        let cassette = Cassette::new();
        let calls = Arc::new(AtomicUsize::new(0));

        std::thread::scope(|scope| {
            for worker in 0..4 {
                let cassette = &cassette;
                let calls = Arc::clone(&calls);
                scope.spawn(move || {
                    for i in 0..25 {
                        let arg = format!("{}", (worker * 25 + i) % 10);
                        cassette
                            .exec(echo_track(&arg, &Slot::new(), &calls))
                            .unwrap();
                    }
                });
            }
        });

        assert_eq!(cassette.len(), 100);
        assert_eq!(cassette.keys().len(), 10);
        assert_eq!(calls.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn test_exec_unstorable_output_stores_nothing() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cassette = Cassette::new();
        let counter = Arc::clone(&calls);
        let mean = Slot::<f64>::new();

        let err = cassette
            .exec(
                Track::new()
                    .call(move |xs: Vec<f64>| {
                        counter.fetch_add(1, Ordering::SeqCst);
                        xs.iter().sum::<f64>() / xs.len() as f64
                    })
                    .arg(Vec::<f64>::new())
                    .results_in(&mean),
            )
            .unwrap_err();

        assert!(matches!(err, VcrError::OutputEncoding(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cassette.is_empty());
        assert!(!mean.is_filled());
    }

    #[test]
    fn test_exec_invalid_track_runs_nothing() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cassette = Cassette::new();
        let result = Slot::<String>::new();

        let track = echo_track("hi", &result, &calls).arg(1u8);
        let err = cassette.exec(track).unwrap_err();
        assert!(matches!(err, VcrError::SignatureMismatch(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(cassette.is_empty());

        cassette.exec(echo_track("hi", &result, &calls)).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cassette.len(), 1);
    }
}
