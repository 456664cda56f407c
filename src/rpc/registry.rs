//! Method registry: method name to handler plus argument shape.
//!
//! Names are matched exactly (case-sensitive). Entries are never removed;
//! registration is expected to finish before the first request arrives.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::rc::Rc;

use log::warn;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::engine::{Dispatcher, RequestContext};
use crate::error::RpcError;

/// A method implementation.
///
/// The handler owns `req` and must answer it exactly once through
/// [`Dispatcher::respond`] or [`Dispatcher::respond_error`], either
/// before returning or later (for example from an outbound call's
/// callback).
pub trait Handler {
    fn invoke(&self, rpc: &mut Dispatcher, req: RequestContext, args: Value);
}

/// Handler that decodes its arguments into `A` before running.
/// Arguments must be a JSON object; anything else, or an object that does
/// not fit `A`, is answered with `BadArguments` and the inner function is
/// never called.
struct Typed<A, F> {
    f: F,
    _args: PhantomData<fn() -> A>,
}

/// Decode `args` as a named-field object. Serde's derived structs also
/// accept positional arrays, so those are refused up front.
fn decode_args<A: DeserializeOwned>(args: Value) -> Result<A, String> {
    match args {
        Value::Object(_) => serde_json::from_value(args).map_err(|e| e.to_string()),
        Value::Array(_) => Err("expected an object, got an array".into()),
        Value::String(_) => Err("expected an object, got a string".into()),
        Value::Number(_) => Err("expected an object, got a number".into()),
        Value::Bool(_) => Err("expected an object, got a boolean".into()),
        Value::Null => Err("expected an object, got null".into()),
    }
}

impl<A, F> Handler for Typed<A, F>
where
    A: DeserializeOwned,
    F: Fn(&mut Dispatcher, RequestContext, A),
{
    fn invoke(&self, rpc: &mut Dispatcher, req: RequestContext, args: Value) {
        match decode_args::<A>(args) {
            Ok(decoded) => (self.f)(rpc, req, decoded),
            Err(e) => {
                warn!("RPC[{}]: {} bad arguments: {}", req.channel(), req.method(), e);
                rpc.respond_error(req, &RpcError::BadArguments(e));
            }
        }
    }
}

/// Wrap a typed closure as a [`Handler`].
pub fn typed<A, F>(f: F) -> Rc<dyn Handler>
where
    A: DeserializeOwned + 'static,
    F: Fn(&mut Dispatcher, RequestContext, A) + 'static,
{
    Rc::new(Typed {
        f,
        _args: PhantomData,
    })
}

pub struct MethodEntry {
    name: String,
    arg_shape: String,
    handler: Rc<dyn Handler>,
}

impl MethodEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human-readable argument shape, e.g. `{num: %d}`.
    pub fn arg_shape(&self) -> &str {
        &self.arg_shape
    }

    pub fn handler(&self) -> Rc<dyn Handler> {
        Rc::clone(&self.handler)
    }
}

#[derive(Default)]
pub struct MethodRegistry {
    entries: Vec<MethodEntry>,
    index: HashMap<String, usize>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: &str,
        arg_shape: &str,
        handler: Rc<dyn Handler>,
    ) -> Result<(), RpcError> {
        if self.index.contains_key(name) {
            return Err(RpcError::RegistrationConflict(name.to_owned()));
        }
        self.index.insert(name.to_owned(), self.entries.len());
        self.entries.push(MethodEntry {
            name: name.to_owned(),
            arg_shape: arg_shape.to_owned(),
            handler,
        });
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<&MethodEntry, RpcError> {
        self.index
            .get(name)
            .map(|&i| &self.entries[i])
            .ok_or_else(|| RpcError::MethodNotFound(name.to_owned()))
    }

    /// `{name, args_fmt}` for a registered method.
    pub fn describe(&self, name: &str) -> Result<Value, RpcError> {
        let entry = self.lookup(name)?;
        Ok(serde_json::json!({ "name": entry.name, "args_fmt": entry.arg_shape }))
    }

    /// Registered names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
