//! Example: recording calls into a cassette and replaying them
//!
//! Runs a few "expensive" functions against a recording cassette, encodes
//! the cassette, restores it and replays the same calls without running
//! them again.
//!
//! Run with:
//! ```bash
//! RUST_LOG=callvcr_core=debug cargo run --example record_and_replay -p callvcr
//! ```

use callvcr::prelude::*;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing_subscriber::EnvFilter;

static REAL_CALLS: AtomicUsize = AtomicUsize::new(0);

// ============================================================================
// Functions Worth Recording
// ============================================================================

/// Pretend lookup against a slow service.
fn exchange_rate(from: String, to: String) -> f64 {
    REAL_CALLS.fetch_add(1, Ordering::SeqCst);
    match (from.as_str(), to.as_str()) {
        ("EUR", "USD") => 1.08,
        ("USD", "EUR") => 0.93,
        _ => 1.0,
    }
}

/// Two results: the quotient and the remainder.
fn div_rem(a: i64, b: i64) -> (i64, i64) {
    REAL_CALLS.fetch_add(1, Ordering::SeqCst);
    (a / b, a % b)
}

fn word_counts(text: String) -> BTreeMap<String, usize> {
    REAL_CALLS.fetch_add(1, Ordering::SeqCst);
    let mut counts = BTreeMap::new();
    for word in text.split_whitespace() {
        *counts.entry(word.to_lowercase()).or_insert(0) += 1;
    }
    counts
}

// ============================================================================
// One Pass Over the Workload
// ============================================================================

fn run(cassette: &Cassette) -> anyhow::Result<()> {
    let rate = Slot::<f64>::new();
    cassette.exec(
        Track::new()
            .call(exchange_rate)
            .with(("EUR".to_string(), "USD".to_string()))
            .results_in(&rate),
    )?;
    println!("  EUR -> USD: {:?}", rate.get());

    let (quotient, remainder) = (Slot::<i64>::new(), Slot::<i64>::new());
    cassette.exec(
        Track::new()
            .call(div_rem)
            .with((17i64, 5i64))
            .results_in((&quotient, &remainder)),
    )?;
    println!("  17 / 5 = {:?} rem {:?}", quotient.get(), remainder.get());

    let counts = Slot::<BTreeMap<String, usize>>::new();
    cassette.exec(
        Track::new()
            .call(word_counts)
            .arg("the cat saw the dog".to_string())
            .results_in(&counts),
    )?;
    println!("  word counts: {:?}", counts.get().unwrap_or_default());

    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("callvcr record/replay example\n");

    // Recording pass: every function really runs.
    let recording = Cassette::new();
    println!("Recording (cassette {}):", recording.id());
    run(&recording)?;
    println!("  real calls so far: {}\n", REAL_CALLS.load(Ordering::SeqCst));

    println!("Recorded keys:");
    for key in recording.keys() {
        println!("  {key}");
    }
    println!();

    // Persist and restore. The restored cassette replays.
    let fixture = recording.to_yaml()?;
    println!("Fixture:\n{fixture}");

    let replaying = Cassette::from_yaml(&fixture)?;
    println!("Replaying (mode {:?}):", replaying.mode());
    run(&replaying)?;
    println!("  real calls so far: {}\n", REAL_CALLS.load(Ordering::SeqCst));

    // Each recording plays back once; a second pass misses until rewound.
    match run(&replaying) {
        Err(err) => println!("Second replay without rewind: {err}"),
        Ok(()) => println!("Second replay unexpectedly succeeded"),
    }
    replaying.rewind();
    run(&replaying)?;
    println!("Replay after rewind succeeded\n");

    // Keep both cassettes around by id.
    let vcr = Vcr::new();
    vcr.add(recording);
    vcr.add(replaying);
    println!("VCR holds cassettes {:?}", vcr.ids());

    Ok(())
}
