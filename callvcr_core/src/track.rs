//! # Track Module
//!
//! A [`Track`] is one capturable function invocation: the callable, its
//! arguments and the sinks that receive its outputs.
//!
//! Tracks are configured with a builder chain, recorded at most once and
//! played back any number of times. Playback never invokes the callable;
//! it copies the captured output values into sinks.

use crate::error::{Result, VcrError};
use crate::func::{Func, IntoFunc, RawArgs, Signature};
use crate::value::{Arg, IntoArgs, IntoSinks, Sink, Slot};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::any::Any;
use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Deterministic identifier of the recordings a call matches.
///
/// Built from the callable's signature and the JSON-encoded argument values.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(String);

impl Key {
    /// The key of a track with nothing bound.
    pub const EMPTY: Key = Key(String::new());

    /// The key text, signature first, then the JSON argument array.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for [`Key::EMPTY`].
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key(s)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key(s.to_string())
    }
}

impl Borrow<str> for Key {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// One recorded (or recordable) function call.
///
/// # Example
///
/// ```rust
/// use callvcr_core::{Slot, Track};
///
/// let sum = Slot::<i32>::new();
/// let mut track = Track::new()
///     .call(|a: i32, b: i32| a + b)
///     .with((2, 3))
///     .results_in(&sum);
///
/// assert_eq!(track.key().as_str(), "fn(i32, i32) -> i32[2,3]");
///
/// track.record().unwrap();
/// assert_eq!(sum.get(), Some(5));
///
/// // Replaying copies the captured value, the closure isn't called again.
/// let replayed = Slot::<i32>::new();
/// track.playback_into(&replayed).unwrap();
/// assert_eq!(replayed.get(), Some(5));
/// ```
#[derive(Default)]
pub struct Track {
    func: Option<Func>,
    args: Vec<Arg>,
    sinks: Vec<Arc<dyn Sink>>,

    out: Vec<Value>,
    recorded: bool,
    spent: bool,
    duration: Duration,
}

impl Track {
    /// Creates an empty track.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds the callable. Validation happens on [`Track::record`].
    pub fn call<F, M>(mut self, f: F) -> Self
    where
        F: IntoFunc<M>,
    {
        self.func = Some(f.into_func());
        self
    }

    /// Binds the argument sequence, replacing any bound before.
    pub fn with(mut self, args: impl IntoArgs) -> Self {
        self.args = args.into_args();
        self
    }

    /// Appends one argument.
    pub fn arg<T>(mut self, value: T) -> Self
    where
        T: Serialize + Send + Sync + 'static,
    {
        self.args.push(Arg::new(value));
        self
    }

    /// Binds the output sinks, replacing any bound before.
    pub fn results_in(mut self, sinks: impl IntoSinks) -> Self {
        self.sinks = sinks.into_sinks();
        self
    }

    /// Appends one output sink.
    pub fn result_in<T>(mut self, slot: &Slot<T>) -> Self
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.sinks.push(Arc::new(slot.clone()));
        self
    }

    /// Derives the key from the callable signature and argument values.
    ///
    /// Pure: never depends on outputs or on the recorded flag.
    pub fn key(&self) -> Key {
        let mut key = String::new();

        if let Some(func) = &self.func {
            key.push_str(&func.signature().qualified());
        }
        if self.func.is_some() || !self.args.is_empty() {
            key.push_str(&self.args_json());
        }

        Key(key)
    }

    fn args_json(&self) -> String {
        let values: Vec<&Value> = self.args.iter().map(Arg::json).collect();
        // A slice of `Value` always encodes.
        serde_json::to_string(&values).unwrap_or_default()
    }

    /// Declared types of the bound callable; `None` for a bare or
    /// restored track.
    pub fn signature(&self) -> Option<&Signature> {
        self.func.as_ref().map(Func::signature)
    }

    /// JSON form of each bound argument, in order.
    pub fn args(&self) -> impl Iterator<Item = &Value> {
        self.args.iter().map(Arg::json)
    }

    /// Captured outputs; empty until recorded.
    pub fn outputs(&self) -> &[Value] {
        &self.out
    }

    /// True once the callable ran and its outputs were captured.
    pub fn is_recorded(&self) -> bool {
        self.recorded
    }

    /// How long the callable ran when the track was recorded.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Validates the bindings, invokes the callable once and captures its
    /// outputs, which are also deposited into the bound sinks.
    ///
    /// Nothing runs when validation fails, and the track can be fixed up
    /// and recorded later. Once the callable has been entered the track is
    /// never invoked again: if its outputs can't be stored faithfully the
    /// call fails with [`VcrError::OutputEncoding`] and every later attempt
    /// with [`VcrError::Spent`].
    ///
    /// # Example
    ///
    /// ```rust
    /// use callvcr_core::{Slot, Track, VcrError};
    ///
    /// let ratio = Slot::<f64>::new();
    /// let mut track = Track::new().call(|| f64::NAN).results_in(&ratio);
    ///
    /// assert!(matches!(track.record(), Err(VcrError::OutputEncoding(_))));
    /// assert!(matches!(track.record(), Err(VcrError::Spent)));
    /// assert!(!ratio.is_filled());
    /// ```
    pub fn record(&mut self) -> Result<()> {
        if self.recorded {
            return Err(VcrError::AlreadyRecorded);
        }
        if self.spent {
            return Err(VcrError::Spent);
        }
        let func = self.func.as_ref().ok_or(VcrError::NotCallable)?;
        self.check_signature(func.signature())?;

        for (position, arg) in self.args.iter().enumerate() {
            if let Some(err) = arg.encode_error() {
                return Err(VcrError::Serialization(serde::ser::Error::custom(format!(
                    "argument {position}: {err}"
                ))));
            }
        }

        let mut raw: RawArgs = Vec::with_capacity(self.args.len());
        for (position, arg) in self.args.iter_mut().enumerate() {
            let value = arg.take_raw().ok_or_else(|| {
                VcrError::mismatch(format!("argument {position} has no live value"))
            })?;
            raw.push(value);
        }

        self.spent = true;
        let started = Instant::now();
        let out = func.invoke(raw)?;
        let duration = started.elapsed();

        // A value that doesn't decode into a sink of its own type lost
        // information on the way to JSON.
        let decoded = decode_all(&out, &self.sinks).map_err(|err| {
            VcrError::OutputEncoding(format!(
                "{} produced an unstorable value: {err}",
                func.signature()
            ))
        })?;

        self.out = out;
        self.duration = duration;
        self.recorded = true;
        debug!(key = %self.key(), duration = ?self.duration, "track recorded");

        store_all(decoded, &self.sinks);
        Ok(())
    }

    /// Arity first, then exact per-position type identity for parameters
    /// against arguments and results against sinks.
    fn check_signature(&self, signature: &Signature) -> Result<()> {
        if signature.params.len() != self.args.len() {
            return Err(VcrError::mismatch(format!(
                "{signature} takes {} arguments, {} bound",
                signature.params.len(),
                self.args.len()
            )));
        }
        if signature.results.len() != self.sinks.len() {
            return Err(VcrError::mismatch(format!(
                "{signature} returns {} values, {} sinks bound",
                signature.results.len(),
                self.sinks.len()
            )));
        }

        for (position, (param, arg)) in signature.params.iter().zip(&self.args).enumerate() {
            if arg.type_tag() != Some(*param) {
                return Err(VcrError::mismatch(format!(
                    "argument {position}: {signature} expects {param}, got {}",
                    arg.type_tag()
                        .map(|tag| tag.name())
                        .unwrap_or_else(|| "an untyped value".to_string())
                )));
            }
        }

        check_sinks(signature, &self.sinks)
    }

    /// Copies the captured outputs into the track's own sinks.
    pub fn playback(&self) -> Result<()> {
        self.ensure_recorded()?;
        deposit(&self.out, &self.sinks, self.signature())
    }

    /// Copies the captured outputs into `sinks` instead of the bound ones.
    pub fn playback_into(&self, sinks: impl IntoSinks) -> Result<()> {
        self.ensure_recorded()?;
        let sinks = sinks.into_sinks();
        deposit(&self.out, &sinks, self.signature())
    }

    /// Copies the captured outputs into the sinks bound on `target`,
    /// checked against `target`'s callable when it has one.
    pub fn playback_as(&self, target: &Track) -> Result<()> {
        self.ensure_recorded()?;
        let signature = target.signature().or_else(|| self.signature());
        deposit(&self.out, &target.sinks, signature)
    }

    fn ensure_recorded(&self) -> Result<()> {
        if self.recorded {
            Ok(())
        } else {
            Err(VcrError::NotRecorded)
        }
    }
}

fn check_sinks(signature: &Signature, sinks: &[Arc<dyn Sink>]) -> Result<()> {
    for (position, (result, sink)) in signature.results.iter().zip(sinks).enumerate() {
        if sink.type_tag() != *result {
            return Err(VcrError::mismatch(format!(
                "result {position}: {signature} returns {result}, sink takes {}",
                sink.type_tag()
            )));
        }
    }
    Ok(())
}

fn deposit(out: &[Value], sinks: &[Arc<dyn Sink>], signature: Option<&Signature>) -> Result<()> {
    if out.len() != sinks.len() {
        return Err(VcrError::mismatch(format!(
            "{} captured outputs, {} sinks",
            out.len(),
            sinks.len()
        )));
    }
    if let Some(signature) = signature {
        check_sinks(signature, sinks)?;
    }

    let decoded = decode_all(out, sinks)?;
    store_all(decoded, sinks);
    Ok(())
}

/// Decodes every output first so a failure leaves all sinks untouched.
fn decode_all(out: &[Value], sinks: &[Arc<dyn Sink>]) -> Result<Vec<Box<dyn Any + Send>>> {
    out.iter().zip(sinks).map(|(value, sink)| sink.decode(value)).collect()
}

fn store_all(decoded: Vec<Box<dyn Any + Send>>, sinks: &[Arc<dyn Sink>]) {
    for (value, sink) in decoded.into_iter().zip(sinks) {
        sink.store(value);
    }
}

impl fmt::Debug for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Track")
            .field("key", &self.key())
            .field("args", &self.args)
            .field("sinks", &self.sinks.len())
            .field("out", &self.out)
            .field("recorded", &self.recorded)
            .field("spent", &self.spent)
            .field("duration", &self.duration)
            .finish()
    }
}

/// Persisted shape. The callable and sinks are never stored.
#[derive(Serialize)]
struct TrackRef<'a> {
    args: Vec<&'a Value>,
    results: &'a [Value],
    recorded: bool,
    duration: Duration,
}

#[derive(Deserialize)]
struct TrackRepr {
    args: Vec<Value>,
    results: Vec<Value>,
    recorded: bool,
    duration: Duration,
}

impl Serialize for Track {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        TrackRef {
            args: self.args().collect(),
            results: &self.out,
            recorded: self.recorded,
            duration: self.duration,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Track {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let repr = TrackRepr::deserialize(deserializer)?;
        if !repr.recorded && !repr.results.is_empty() {
            return Err(serde::de::Error::custom(
                "unrecorded track can't carry results",
            ));
        }

        Ok(Track {
            func: None,
            args: repr.args.into_iter().map(Arg::restored).collect(),
            sinks: Vec::new(),
            out: repr.results,
            recorded: repr.recorded,
            spent: false,
            duration: repr.duration,
        })
    }
}
