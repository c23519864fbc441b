//! Dynamic attribute resolution.
//!
//! Nothing about an interpreter object's surface is known ahead of time, so
//! every access goes through one entry point, [`Resolve::resolve`], at call
//! time. A [`Namespace`] chains resolvers in order: the first layer that
//! knows the name wins, later layers are only consulted on a miss, and
//! candidates are never merged. `AttributeNotFound` is raised only after
//! every layer missed.

use std::fmt;

use tracing::trace;

use crate::convert::Value;
use crate::error::{BridgeError, BridgeResult};
use crate::proxy::ProxyObject;

/// Something that can look names up in the interpreter.
pub trait Resolve {
    /// Look `name` up. `Ok(None)` means absent; errors are foreign failures
    /// raised during the lookup or contract violations.
    fn resolve(&self, name: &str) -> BridgeResult<Option<ProxyObject>>;

    /// Human-readable description of every namespace searched.
    fn searched(&self) -> Vec<String>;

    fn not_found(&self, name: &str) -> BridgeError {
        BridgeError::AttributeNotFound {
            name: name.to_owned(),
            searched: self.searched(),
        }
    }

    /// Attribute value, decoded in auto-convert mode.
    fn get_attr(&self, name: &str) -> BridgeResult<Value> {
        self.resolve(name)?
            .ok_or_else(|| self.not_found(name))?
            .into_value()
    }

    fn call_method(&self, name: &str, args: &[Value]) -> BridgeResult<Value> {
        self.call_method_with_kwargs(name, args, &[])
    }

    fn call_method_with_kwargs(
        &self,
        name: &str,
        args: &[Value],
        kwargs: &[(&str, Value)],
    ) -> BridgeResult<Value> {
        let method = self.resolve(name)?.ok_or_else(|| self.not_found(name))?;
        method.call_with_kwargs(args, kwargs)
    }

    /// Call a method and pass its result through `then`.
    fn call_method_then<F, R>(&self, name: &str, args: &[Value], then: F) -> BridgeResult<R>
    where
        Self: Sized,
        F: FnOnce(Value) -> R,
    {
        self.call_method(name, args).map(then)
    }
}

/// Ordered chain of resolvers: primary first, then each fallback.
pub struct Namespace {
    layers: Vec<Box<dyn Resolve>>,
}

impl Namespace {
    pub fn new(primary: impl Resolve + 'static) -> Self {
        Self {
            layers: vec![Box::new(primary)],
        }
    }

    /// Append a layer consulted after every existing one.
    pub fn with_fallback(mut self, fallback: impl Resolve + 'static) -> Self {
        self.layers.push(Box::new(fallback));
        self
    }

    pub fn depth(&self) -> usize {
        self.layers.len()
    }
}

impl Resolve for Namespace {
    fn resolve(&self, name: &str) -> BridgeResult<Option<ProxyObject>> {
        for (depth, layer) in self.layers.iter().enumerate() {
            if let Some(found) = layer.resolve(name)? {
                if depth > 0 {
                    trace!(name, depth, "resolved through fallback");
                }
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    fn searched(&self) -> Vec<String> {
        self.layers.iter().flat_map(|layer| layer.searched()).collect()
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace")
            .field("depth", &self.depth())
            .finish()
    }
}
