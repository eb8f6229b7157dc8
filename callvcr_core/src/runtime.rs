//! # Runtime Module
//!
//! Thread-local storage for the active [`Cassette`], so call sites can use
//! [`exec`] without threading a cassette through every function.
//!
//! ## Usage
//!
//! ```rust
//! use callvcr_core::runtime::{exec, insert_cassette, take_cassette};
//! use callvcr_core::{Cassette, Slot, Track};
//!
//! insert_cassette(Cassette::new());
//!
//! let doubled = Slot::<i32>::new();
//! exec(Track::new().call(|n: i32| n * 2).arg(21).results_in(&doubled)).unwrap();
//! assert_eq!(doubled.get(), Some(42));
//!
//! let cassette = take_cassette().expect("cassette was installed");
//! assert_eq!(cassette.len(), 1);
//! ```
//!
//! ## Fixtures
//!
//! [`CassetteGuard`] ties the active cassette to a fixture file: it replays
//! the file when present and records (then saves) otherwise.
//!
//! ## Thread Safety
//!
//! Each thread has its own active cassette. A cassette itself is safe to
//! share; install the same `Arc<Cassette>` on several threads if they must
//! record into one fixture.

use crate::cassette::Cassette;
use crate::codec::{self, Format};
use crate::config::{FixtureConfig, RecordMode};
use crate::error::{Result, VcrError};
use crate::track::Track;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

thread_local! {
    /// The active cassette for this thread.
    static CASSETTE: RefCell<Option<Arc<Cassette>>> = const { RefCell::new(None) };
}

/// Installs `cassette` as this thread's active cassette, returning the one
/// it replaces.
///
/// # Arguments
///
/// * `cassette` - The cassette to make active; an owned cassette or a
///   shared `Arc`
pub fn insert_cassette(cassette: impl Into<Arc<Cassette>>) -> Option<Arc<Cassette>> {
    let cassette = cassette.into();
    CASSETTE.with(|c| c.borrow_mut().replace(cassette))
}

/// Removes and returns this thread's active cassette.
pub fn take_cassette() -> Option<Arc<Cassette>> {
    CASSETTE.with(|c| c.borrow_mut().take())
}

/// Checks whether this thread has an active cassette.
pub fn has_cassette() -> bool {
    CASSETTE.with(|c| c.borrow().is_some())
}

/// A handle to this thread's active cassette.
pub fn current_cassette() -> Option<Arc<Cassette>> {
    CASSETTE.with(|c| c.borrow().clone())
}

/// Runs `f` against the active cassette, or returns `None` if there is none.
///
/// The thread-local is not borrowed while `f` runs, so `f` may itself use
/// this module.
pub fn with_cassette<F, R>(f: F) -> Option<R>
where
    F: FnOnce(&Cassette) -> R,
{
    current_cassette().map(|cassette| f(&cassette))
}

/// Dual-mode execution against the active cassette.
pub fn exec(track: Track) -> Result<()> {
    let cassette = current_cassette().ok_or(VcrError::NoActiveCassette)?;
    cassette.exec(track)
}

/// RAII guard that installs a fixture-backed cassette for the current
/// thread and writes it back when a recording finishes.
///
/// # Example
///
/// ```rust
/// use callvcr_core::runtime::{exec, CassetteGuard};
/// use callvcr_core::{FixtureConfig, Slot, Track};
///
/// let dir = std::env::temp_dir().join(format!("callvcr-doc-{}", std::process::id()));
/// let config = FixtureConfig::new(&dir);
///
/// for _ in 0..2 {
///     let guard = CassetteGuard::open("upper", &config).unwrap();
///     let out = Slot::<String>::new();
///     exec(Track::new().call(|s: String| s.to_uppercase()).arg("abc".to_string()).results_in(&out))
///         .unwrap();
///     assert_eq!(out.get().as_deref(), Some("ABC"));
///     drop(guard); // first pass saves, second pass replayed
/// }
/// # std::fs::remove_dir_all(&dir).ok();
/// ```
#[derive(Debug)]
pub struct CassetteGuard {
    cassette: Arc<Cassette>,
    path: PathBuf,
    format: Format,
    pending_save: bool,
    previous: Option<Arc<Cassette>>,
}

impl CassetteGuard {
    /// Opens the fixture `name` under `config` and makes it the active
    /// cassette.
    ///
    /// # Arguments
    ///
    /// * `name` - Fixture file stem; the extension comes from `config.format`
    /// * `config` - Fixture directory, format and [`RecordMode`]
    pub fn open(name: &str, config: &FixtureConfig) -> Result<Self> {
        let path = config.path_for(name);
        let exists = path.is_file();

        let cassette = match (config.record_mode, exists) {
            (RecordMode::All, _) | (RecordMode::Once, false) => Cassette::new(),
            (RecordMode::Once, true) | (RecordMode::Never, true) => {
                codec::read_file(&path, config.format)?
            }
            (RecordMode::Never, false) => {
                return Err(VcrError::InvalidFixture(format!(
                    "{} does not exist and recording is disabled",
                    path.display()
                )));
            }
        };

        let cassette = Arc::new(cassette);
        let pending_save = !cassette.is_replaying();
        debug!(
            fixture = %path.display(),
            mode = ?cassette.mode(),
            "fixture opened"
        );
        let previous = insert_cassette(Arc::clone(&cassette));

        Ok(Self {
            cassette,
            path,
            format: config.format,
            pending_save,
            previous,
        })
    }

    /// The cassette this guard installed.
    pub fn cassette(&self) -> &Arc<Cassette> {
        &self.cassette
    }

    /// Location of the fixture file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes a recording cassette to its fixture now instead of on drop.
    /// Does nothing for a replaying cassette or once already saved.
    pub fn save(&mut self) -> Result<()> {
        if self.pending_save {
            codec::write_file(self.cassette.as_ref(), &self.path, self.format)?;
            self.pending_save = false;
            debug!(
                fixture = %self.path.display(),
                tracks = self.cassette.len(),
                "fixture saved"
            );
        }
        Ok(())
    }
}

impl Drop for CassetteGuard {
    fn drop(&mut self) {
        if let Err(err) = self.save() {
            warn!(fixture = %self.path.display(), error = %err, "failed to save fixture");
        }

        let previous = self.previous.take();
        let _ = CASSETTE.try_with(|c| *c.borrow_mut() = previous);
    }
}
