//! Example: fixture files with `CassetteGuard`
//!
//! The first guard finds no fixture, records the calls and saves them when
//! dropped. The second guard finds the fixture and replays it, so the
//! functions are never called again.
//!
//! Run with:
//! ```bash
//! RUST_LOG=callvcr_core=debug cargo run --example fixture_file -p callvcr
//! ```

use callvcr::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing_subscriber::EnvFilter;

static REAL_CALLS: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Forecast {
    city: String,
    high: i32,
    low: i32,
}

/// Pretend weather API.
fn forecast(city: String) -> Vec<Forecast> {
    REAL_CALLS.fetch_add(1, Ordering::SeqCst);
    vec![
        Forecast {
            city: city.clone(),
            high: 21,
            low: 12,
        },
        Forecast {
            city,
            high: 18,
            low: 9,
        },
    ]
}

fn greeting(name: String) -> String {
    REAL_CALLS.fetch_add(1, Ordering::SeqCst);
    format!("Hello, {name}!")
}

/// Code under test: talks to the active cassette only through `exec`.
fn workload() -> anyhow::Result<()> {
    let days = Slot::<Vec<Forecast>>::new();
    exec(Track::new().call(forecast).arg("Lisbon".to_string()).results_in(&days))?;
    for day in days.take().unwrap_or_default() {
        println!("  {}: {}..{}", day.city, day.low, day.high);
    }

    let hello = Slot::<String>::new();
    exec(Track::new().call(greeting).arg("fixtures".to_string()).results_in(&hello))?;
    println!("  {}", hello.get().unwrap_or_default());

    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let dir = tempfile::tempdir()?;
    let config = FixtureConfig::new(dir.path()).with_format(Format::Yaml);

    println!("callvcr fixture example");
    println!("fixture: {}\n", config.path_for("weather").display());

    for pass in 1..=2 {
        let guard = CassetteGuard::open("weather", &config)?;
        println!("Pass {pass} ({:?}):", guard.cassette().mode());
        workload()?;
        println!("  real calls so far: {}\n", REAL_CALLS.load(Ordering::SeqCst));
    }

    // Re-record on demand.
    let rerecord = config.clone().with_record_mode(RecordMode::All);
    {
        let mut guard = CassetteGuard::open("weather", &rerecord)?;
        println!("Re-recording ({:?}):", guard.cassette().mode());
        workload()?;
        guard.save()?;
    }

    // Replay only: a call the fixture never saw is a stale fixture.
    let replay_only = config.clone().with_record_mode(RecordMode::Never);
    {
        let _guard = CassetteGuard::open("weather", &replay_only)?;
        let days = Slot::<Vec<Forecast>>::new();
        match exec(Track::new().call(forecast).arg("Porto".to_string()).results_in(&days)) {
            Err(err) if err.is_stale_fixture() => {
                println!("\nStale fixture ({err}), re-record with RecordMode::All");
            }
            other => other?,
        }
    }

    let saved = std::fs::read_to_string(config.path_for("weather"))?;
    println!("\nSaved fixture:\n{saved}");

    Ok(())
}
