//! # callvcr_core
//!
//! A function-call record/playback engine for deterministic test fixtures.
//!
//! Run a function once, capture its arguments, outputs and timing, persist
//! the capture, and on later runs replay the stored outputs instead of
//! calling the function again.
//!
//! This crate provides the following modules:
//!
//! - [`track`] - One capturable call: callable, arguments, output sinks
//! - [`tracklist`] - FIFO queue of recordings sharing one key
//! - [`cassette`] - Recordings grouped by key, with dual-mode execution
//! - [`vcr`] - Registry of cassettes by identifier
//! - [`value`] - Type tags, arguments, outputs and [`Slot`] sinks
//! - [`func`] - Type-erased callables with a runtime-visible signature
//! - [`codec`] - JSON and YAML persistence
//! - [`config`] - Fixture location and record mode
//! - [`runtime`] - Thread-local active cassette and fixture guard
//!
//! ## Example
//!
//! ```rust
//! use callvcr_core::{Cassette, Slot, Track, VcrError};
//!
//! // Record: the closure really runs.
//! let cassette = Cassette::new();
//! let total = Slot::<i64>::new();
//! cassette
//!     .exec(Track::new().call(|a: i64, b: i64| a + b).with((40i64, 2i64)).results_in(&total))
//!     .unwrap();
//! assert_eq!(total.get(), Some(42));
//!
//! // Persist and restore: the restored cassette replays.
//! let fixture = cassette.to_json().unwrap();
//! let replay = Cassette::from_json(&fixture).unwrap();
//! assert_eq!(replay.to_json().unwrap(), fixture);
//!
//! let total = Slot::<i64>::new();
//! let call = || Track::new().call(|a: i64, b: i64| a + b).with((40i64, 2i64)).results_in(&total);
//! replay.exec(call()).unwrap();
//! assert_eq!(total.get(), Some(42));
//!
//! // Each recording plays back once.
//! assert!(matches!(replay.exec(call()), Err(VcrError::PlaybackMiss(_))));
//! ```

pub mod cassette;
pub mod codec;
pub mod config;
pub mod error;
pub mod func;
pub mod runtime;
pub mod track;
pub mod tracklist;
pub mod value;
pub mod vcr;

pub use cassette::{Cassette, Mode};
pub use codec::Format;
pub use config::{FixtureConfig, RecordMode};
pub use error::{Result, VcrError};
pub use func::{Func, IntoFunc, Signature};
pub use track::{Key, Track};
pub use tracklist::TrackList;
pub use value::{Arg, IntoArgs, IntoSinks, Outputs, Sink, Slot, TypeTag};
pub use vcr::Vcr;
