//! # Value Module
//!
//! The runtime-tagged value layer shared by every track.
//!
//! Arguments and outputs are stored as [`serde_json::Value`], which is also
//! what gets persisted. Alongside each value the track keeps a [`TypeTag`]
//! so that a callable's declared parameter and result types can be checked
//! position by position before anything runs.

use crate::error::{Result, VcrError};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Runtime identity of a Rust type plus a readable name.
///
/// Equality compares [`TypeId`] only; the name is for keys and messages.
#[derive(Clone, Copy)]
pub struct TypeTag {
    id: TypeId,
    name: &'static str,
}

impl TypeTag {
    /// Returns the tag for `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Full compiler-provided type name.
    pub fn full_name(&self) -> &'static str {
        self.name
    }

    /// Type name with module paths stripped, e.g. `Vec<String>`.
    pub fn name(&self) -> String {
        short_type_name(self.name)
    }
}

impl PartialEq for TypeTag {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeTag {}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeTag({})", self.name())
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Strips module paths from every path segment of a type name.
///
/// `core::option::Option<alloc::vec::Vec<u8>>` becomes `Option<Vec<u8>>`.
pub fn short_type_name(full: &str) -> String {
    let mut out = String::with_capacity(full.len());
    let mut segment = String::new();

    for ch in full.chars() {
        if ch.is_alphanumeric() || ch == '_' || ch == ':' {
            segment.push(ch);
        } else {
            push_last_segment(&mut out, &segment);
            segment.clear();
            out.push(ch);
        }
    }
    push_last_segment(&mut out, &segment);

    out
}

fn push_last_segment(out: &mut String, path: &str) {
    if let Some(last) = path.rsplit("::").next() {
        out.push_str(last);
    }
}

/// One bound argument: its tag, its JSON form and, until the track is
/// recorded, the original value that will be moved into the callable.
pub struct Arg {
    tag: Option<TypeTag>,
    json: Value,
    encode_error: Option<serde_json::Error>,
    raw: Option<Box<dyn Any + Send + Sync>>,
}

impl Arg {
    /// Wraps a live argument value.
    pub fn new<T>(value: T) -> Self
    where
        T: Serialize + Send + Sync + 'static,
    {
        let (json, encode_error) = match serde_json::to_value(&value) {
            Ok(json) => (json, None),
            Err(err) => (Value::Null, Some(err)),
        };

        Self {
            tag: Some(TypeTag::of::<T>()),
            json,
            encode_error,
            raw: Some(Box::new(value)),
        }
    }

    /// An argument restored from persisted state: JSON only, no type.
    pub(crate) fn restored(json: Value) -> Self {
        Self {
            tag: None,
            json,
            encode_error: None,
            raw: None,
        }
    }

    /// The runtime type, if the argument was bound from a live value.
    pub fn type_tag(&self) -> Option<TypeTag> {
        self.tag
    }

    /// The JSON form used for keys and persistence.
    pub fn json(&self) -> &Value {
        &self.json
    }

    /// Why the value couldn't be encoded, if it couldn't. The error stays
    /// in place, so every recording attempt sees it.
    pub fn encode_error(&self) -> Option<&serde_json::Error> {
        self.encode_error.as_ref()
    }

    pub(crate) fn take_raw(&mut self) -> Option<Box<dyn Any + Send + Sync>> {
        self.raw.take()
    }
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arg")
            .field("tag", &self.tag)
            .field("json", &self.json)
            .finish()
    }
}

/// Conversion of a tuple of values into an ordered argument list.
pub trait IntoArgs {
    fn into_args(self) -> Vec<Arg>;
}

impl IntoArgs for Vec<Arg> {
    fn into_args(self) -> Vec<Arg> {
        self
    }
}

macro_rules! impl_into_args {
    ($($ty:ident),*) => {
        impl<$($ty),*> IntoArgs for ($($ty,)*)
        where
            $($ty: Serialize + Send + Sync + 'static,)*
        {
            #[allow(non_snake_case)]
            fn into_args(self) -> Vec<Arg> {
                let ($($ty,)*) = self;
                vec![$(Arg::new($ty)),*]
            }
        }
    };
}

impl_into_args!();
impl_into_args!(A);
impl_into_args!(A, B);
impl_into_args!(A, B, C);
impl_into_args!(A, B, C, D);

/// The outputs a callable produces, in declaration order.
///
/// `()` yields no outputs, a tuple yields one output per element and a
/// plain value type yields a single output. Any other serializable type,
/// such as your own struct, is returned as a one-element tuple:
///
/// ```rust
/// use callvcr_core::{Slot, Track};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// struct User {
///     id: u64,
///     name: String,
/// }
///
/// let user = Slot::<User>::new();
/// let mut track = Track::new()
///     .call(|id: u64| (User { id, name: format!("user {id}") },))
///     .arg(7u64)
///     .results_in(&user);
///
/// track.record().unwrap();
/// assert_eq!(user.get().map(|u| u.name), Some("user 7".to_string()));
/// ```
///
/// Encoding fails with [`VcrError::OutputEncoding`] when a value has no
/// faithful JSON form.
pub trait Outputs {
    /// Declared result types.
    fn types() -> Vec<TypeTag>;

    /// Encodes the produced values.
    fn into_values(self) -> Result<Vec<Value>>;
}

/// Encodes one produced value.
pub(crate) fn encode_output<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|err| {
        VcrError::OutputEncoding(format!("{}: {err}", short_type_name(std::any::type_name::<T>())))
    })
}

macro_rules! impl_tuple_outputs {
    ($($ty:ident),*) => {
        impl<$($ty),*> Outputs for ($($ty,)*)
        where
            $($ty: Serialize + 'static,)*
        {
            fn types() -> Vec<TypeTag> {
                vec![$(TypeTag::of::<$ty>()),*]
            }

            #[allow(non_snake_case)]
            fn into_values(self) -> Result<Vec<Value>> {
                let ($($ty,)*) = self;
                Ok(vec![$(encode_output(&$ty)?),*])
            }
        }
    };
}

impl_tuple_outputs!();
impl_tuple_outputs!(A);
impl_tuple_outputs!(A, B);
impl_tuple_outputs!(A, B, C);
impl_tuple_outputs!(A, B, C, D);

macro_rules! impl_single_output {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Outputs for $ty {
                fn types() -> Vec<TypeTag> {
                    vec![TypeTag::of::<$ty>()]
                }

                fn into_values(self) -> Result<Vec<Value>> {
                    Ok(vec![encode_output(&self)?])
                }
            }
        )*
    };
}

impl_single_output!(
    String, bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, Value,
);

// JSON has no NaN or infinity; serde_json would write them as `null`.
macro_rules! impl_float_output {
    ($($ty:ty),*) => {
        $(
            impl Outputs for $ty {
                fn types() -> Vec<TypeTag> {
                    vec![TypeTag::of::<$ty>()]
                }

                fn into_values(self) -> Result<Vec<Value>> {
                    if !self.is_finite() {
                        return Err(VcrError::OutputEncoding(format!(
                            "{} value {self} has no JSON form",
                            stringify!($ty)
                        )));
                    }
                    Ok(vec![encode_output(&self)?])
                }
            }
        )*
    };
}

impl_float_output!(f32, f64);

macro_rules! impl_generic_output {
    ($(impl<$($p:ident),*> for $ty:ty;)*) => {
        $(
            impl<$($p: Serialize + 'static),*> Outputs for $ty {
                fn types() -> Vec<TypeTag> {
                    vec![TypeTag::of::<$ty>()]
                }

                fn into_values(self) -> Result<Vec<Value>> {
                    Ok(vec![encode_output(&self)?])
                }
            }
        )*
    };
}

impl_generic_output! {
    impl<T> for Vec<T>;
    impl<T> for Option<T>;
    impl<T, E> for std::result::Result<T, E>;
    impl<V> for BTreeMap<String, V>;
    impl<V> for HashMap<String, V>;
}

/// A writable location that receives one output value.
///
/// Writing is split in two so a caller can decode every output before
/// storing any of them.
pub trait Sink: Send + Sync {
    /// The type this sink accepts.
    fn type_tag(&self) -> TypeTag;

    /// Decodes `value` into this sink's type without storing it.
    fn decode(&self, value: &Value) -> Result<Box<dyn Any + Send>>;

    /// Stores a value produced by [`Sink::decode`] on this sink.
    fn store(&self, decoded: Box<dyn Any + Send>);

    /// Decodes and stores `value`.
    fn put(&self, value: &Value) -> Result<()> {
        let decoded = self.decode(value)?;
        self.store(decoded);
        Ok(())
    }
}

/// A shared, typed output slot.
///
/// Clones point at the same storage: bind one clone to a track and read
/// the produced (or replayed) value from another.
///
/// ```rust
/// use callvcr_core::{Slot, Track};
///
/// let greeting = Slot::<String>::new();
/// let mut track = Track::new()
///     .call(|name: String| format!("hello {name}"))
///     .with(("world".to_string(),))
///     .results_in(&greeting);
///
/// track.record().unwrap();
/// assert_eq!(greeting.get().as_deref(), Some("hello world"));
/// ```
pub struct Slot<T> {
    inner: Arc<Mutex<Option<T>>>,
}

impl<T> Slot<T> {
    /// Creates an empty slot.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(None)),
        }
    }

    /// Removes and returns the stored value.
    pub fn take(&self) -> Option<T> {
        self.inner.lock().take()
    }

    /// True once a value has been deposited and not taken.
    pub fn is_filled(&self) -> bool {
        self.inner.lock().is_some()
    }

    /// Empties the slot.
    pub fn clear(&self) {
        *self.inner.lock() = None;
    }
}

impl<T: Clone> Slot<T> {
    /// Returns a copy of the stored value.
    pub fn get(&self) -> Option<T> {
        self.inner.lock().clone()
    }
}

impl<T> Clone for Slot<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Slot").field(&*self.inner.lock()).finish()
    }
}

impl<T> Sink for Slot<T>
where
    T: DeserializeOwned + Send + 'static,
{
    fn type_tag(&self) -> TypeTag {
        TypeTag::of::<T>()
    }

    fn decode(&self, value: &Value) -> Result<Box<dyn Any + Send>> {
        let decoded = T::deserialize(value).map_err(|err| {
            VcrError::mismatch(format!(
                "can't deposit {value} into a {} sink: {err}",
                self.type_tag()
            ))
        })?;
        Ok(Box::new(decoded))
    }

    fn store(&self, decoded: Box<dyn Any + Send>) {
        if let Ok(value) = decoded.downcast::<T>() {
            *self.inner.lock() = Some(*value);
        }
    }
}

/// Conversion of slot references into an ordered sink list.
pub trait IntoSinks {
    fn into_sinks(self) -> Vec<Arc<dyn Sink>>;
}

impl IntoSinks for Vec<Arc<dyn Sink>> {
    fn into_sinks(self) -> Vec<Arc<dyn Sink>> {
        self
    }
}

impl IntoSinks for () {
    fn into_sinks(self) -> Vec<Arc<dyn Sink>> {
        Vec::new()
    }
}

impl<T> IntoSinks for &Slot<T>
where
    T: DeserializeOwned + Send + 'static,
{
    fn into_sinks(self) -> Vec<Arc<dyn Sink>> {
        vec![Arc::new(self.clone())]
    }
}

macro_rules! impl_into_sinks {
    ($($ty:ident),*) => {
        impl<$($ty),*> IntoSinks for ($(&Slot<$ty>,)*)
        where
            $($ty: DeserializeOwned + Send + 'static,)*
        {
            #[allow(non_snake_case)]
            fn into_sinks(self) -> Vec<Arc<dyn Sink>> {
                let ($($ty,)*) = self;
                vec![$(Arc::new($ty.clone()) as Arc<dyn Sink>),*]
            }
        }
    };
}

impl_into_sinks!(A);
impl_into_sinks!(A, B);
impl_into_sinks!(A, B, C);
impl_into_sinks!(A, B, C, D);
