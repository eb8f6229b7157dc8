//! # Func Module
//!
//! Type-erased callables with a runtime-visible signature.
//!
//! Any `Fn` closure or function item taking up to four owned arguments can be
//! turned into a [`Func`]. The conversion records the declared parameter and
//! result types so a [`Track`](crate::Track) can validate its bound
//! arguments and sinks before invoking anything.

use crate::error::{Result, VcrError};
use crate::value::{Outputs, TypeTag};
use serde_json::Value;
use std::any::Any;
use std::fmt;

/// Arguments handed to an erased callable, in parameter order.
pub type RawArgs = Vec<Box<dyn Any + Send + Sync>>;

type Body = Box<dyn Fn(RawArgs) -> Result<Vec<Value>> + Send + Sync>;

/// Declared parameter and result types of a callable.
///
/// `Display` uses short type names and is meant for messages;
/// [`Signature::qualified`] keeps module paths and is what keys are built
/// from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub params: Vec<TypeTag>,
    pub results: Vec<TypeTag>,
}

impl Signature {
    /// Renders the signature with full type paths, e.g.
    /// `fn(alloc::string::String) -> usize`.
    pub fn qualified(&self) -> String {
        let mut out = String::new();
        // Writing into a `String` can't fail.
        let _ = self.render(&mut out, |tag| tag.full_name().to_string());
        out
    }

    fn render<W: fmt::Write>(&self, w: &mut W, name: impl Fn(&TypeTag) -> String) -> fmt::Result {
        w.write_str("fn(")?;
        write_list(w, &self.params, &name)?;
        w.write_str(")")?;

        match self.results.as_slice() {
            [] => Ok(()),
            [single] => write!(w, " -> {}", name(single)),
            many => {
                w.write_str(" -> (")?;
                write_list(w, many, &name)?;
                w.write_str(")")
            }
        }
    }
}

fn write_list<W: fmt::Write>(
    w: &mut W,
    tags: &[TypeTag],
    name: &impl Fn(&TypeTag) -> String,
) -> fmt::Result {
    for (i, tag) in tags.iter().enumerate() {
        if i > 0 {
            w.write_str(", ")?;
        }
        w.write_str(&name(tag))?;
    }
    Ok(())
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f, TypeTag::name)
    }
}

/// A callable of statically unknown signature.
pub struct Func {
    signature: Signature,
    body: Body,
}

impl Func {
    /// Wraps a closure or function item.
    pub fn new<F, M>(f: F) -> Self
    where
        F: IntoFunc<M>,
    {
        f.into_func()
    }

    /// Declared parameter and result types.
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Invokes the callable. Every argument must already match the
    /// declared parameter type at its position.
    pub fn invoke(&self, args: RawArgs) -> Result<Vec<Value>> {
        if args.len() != self.signature.params.len() {
            return Err(VcrError::mismatch(format!(
                "{} expects {} arguments, got {}",
                self.signature,
                self.signature.params.len(),
                args.len()
            )));
        }
        (self.body)(args)
    }
}

impl fmt::Debug for Func {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Func")
            .field("signature", &self.signature.to_string())
            .finish()
    }
}

/// Conversion into a [`Func`]. `M` is a marker for the parameter list and
/// lets one closure type pick exactly one implementation.
pub trait IntoFunc<M> {
    fn into_func(self) -> Func;
}

impl IntoFunc<Func> for Func {
    fn into_func(self) -> Func {
        self
    }
}

fn downcast_arg<T: 'static>(
    args: &mut std::vec::IntoIter<Box<dyn Any + Send + Sync>>,
    position: usize,
) -> Result<T> {
    let raw = args
        .next()
        .ok_or_else(|| VcrError::mismatch(format!("missing argument {position}")))?;
    raw.downcast::<T>().map(|value| *value).map_err(|_| {
        VcrError::mismatch(format!(
            "argument {position} is not a {}",
            TypeTag::of::<T>()
        ))
    })
}

macro_rules! impl_into_func {
    ($(($ty:ident, $pos:expr)),*) => {
        impl<Fun, Ret, $($ty),*> IntoFunc<fn($($ty),*) -> Ret> for Fun
        where
            Fun: Fn($($ty),*) -> Ret + Send + Sync + 'static,
            Ret: Outputs,
            $($ty: Send + Sync + 'static,)*
        {
            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn into_func(self) -> Func {
                let signature = Signature {
                    params: vec![$(TypeTag::of::<$ty>()),*],
                    results: Ret::types(),
                };
                let body: Body = Box::new(move |args: RawArgs| {
                    let mut args = args.into_iter();
                    $(let $ty = downcast_arg::<$ty>(&mut args, $pos)?;)*
                    (self)($($ty),*).into_values()
                });

                Func { signature, body }
            }
        }
    };
}

impl_into_func!();
impl_into_func!((A, 0));
impl_into_func!((A, 0), (B, 1));
impl_into_func!((A, 0), (B, 1), (C, 2));
impl_into_func!((A, 0), (B, 1), (C, 2), (D, 3));
