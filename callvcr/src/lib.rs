//! # callvcr
//!
//! Record a function call once, replay it from a fixture afterwards.
//!
//! This crate provides a unified interface to the callvcr engine:
//!
//! - **Tracks** wrap one call: callable, arguments and output slots
//! - **Cassettes** store tracks by key and decide between running and replaying
//! - **Fixtures** persist cassettes as JSON or YAML
//! - **Runtime** keeps an active cassette per thread
//!
//! ## Quick Start
//!
//! ```rust
//! use callvcr::prelude::*;
//!
//! fn fetch_price(symbol: String) -> f64 {
//!     // Imagine a network call here.
//!     if symbol == "ACME" { 12.5 } else { 0.0 }
//! }
//!
//! let dir = std::env::temp_dir().join(format!("callvcr-quickstart-{}", std::process::id()));
//! let config = FixtureConfig::new(&dir);
//!
//! {
//!     // First run: no fixture yet, so the call runs and gets recorded.
//!     let _guard = CassetteGuard::open("prices", &config).unwrap();
//!     let price = Slot::<f64>::new();
//!     exec(Track::new().call(fetch_price).arg("ACME".to_string()).results_in(&price)).unwrap();
//!     assert_eq!(price.get(), Some(12.5));
//! } // fixture saved here
//!
//! {
//!     // Later runs replay the fixture without calling `fetch_price`.
//!     let guard = CassetteGuard::open("prices", &config).unwrap();
//!     assert!(guard.cassette().is_replaying());
//!     let price = Slot::<f64>::new();
//!     exec(Track::new().call(fetch_price).arg("ACME".to_string()).results_in(&price)).unwrap();
//!     assert_eq!(price.get(), Some(12.5));
//! }
//! # std::fs::remove_dir_all(&dir).ok();
//! ```
//!
//! ## Stale Fixtures
//!
//! A replaying cassette never falls back to running the real call. A call it
//! has no recording for fails with [`VcrError::PlaybackMiss`], which means the
//! fixture should be re-recorded (for example with [`RecordMode::All`]).

// Re-export core modules
pub use callvcr_core::cassette;
pub use callvcr_core::codec;
pub use callvcr_core::config;
pub use callvcr_core::error;
pub use callvcr_core::func;
pub use callvcr_core::runtime;
pub use callvcr_core::track;
pub use callvcr_core::tracklist;
pub use callvcr_core::value;
pub use callvcr_core::vcr;

pub use callvcr_core::{
    Cassette, FixtureConfig, Format, Key, Mode, RecordMode, Result, Slot, Track, TrackList, Vcr,
    VcrError,
};

/// Prelude module for convenient imports.
///
/// ```rust
/// use callvcr::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Cassette, FixtureConfig, Format, Key, Mode, RecordMode, Slot, Track, Vcr, VcrError,
    };

    // Runtime helpers
    pub use callvcr_core::runtime::{
        current_cassette, exec, has_cassette, insert_cassette, take_cassette, with_cassette,
        CassetteGuard,
    };
}
