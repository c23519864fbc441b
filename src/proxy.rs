//! Host-side proxies for interpreter objects.
//!
//! A [`ProxyObject`] owns exactly one reference-count unit on one object.
//! Every way of obtaining one is accounted for:
//!
//! - call results, attribute lookups and imports arrive as new references
//!   and are stored without incrementing;
//! - [`Clone`] takes a borrowed view of the same object and increments;
//! - [`Drop`] decrements exactly once.
//!
//! Two proxies may wrap the same address. Each carries its own unit, so the
//! pairing holds per proxy rather than per object.
//!
//! Attribute and method access is resolved at call time through
//! [`Resolve`]; results are decoded when the issuing bridge is in
//! auto-convert mode and wrapped in new proxies otherwise.

use std::fmt;

use pyo3::prelude::*;
use pyo3::Borrowed;

use crate::convert::Value;
use crate::dispatch::Resolve;
use crate::error::BridgeResult;
use crate::ffi;
use crate::handle::{self, ForeignHandle};
use crate::session::SessionRef;

/// An interpreter object seen from the host.
pub struct ProxyObject {
    handle: ForeignHandle,
    session: SessionRef,
}

impl ProxyObject {
    pub(crate) fn new(handle: ForeignHandle, session: SessionRef) -> Self {
        Self { handle, session }
    }

    pub fn handle(&self) -> &ForeignHandle {
        &self.handle
    }

    pub fn address(&self) -> usize {
        self.handle.address()
    }

    /// Whether the session that issued this proxy is still running.
    pub fn is_live(&self) -> bool {
        self.session.ensure_live().is_ok()
    }

    fn borrowed<'a, 'py>(&'a self, py: Python<'py>) -> Borrowed<'a, 'py, PyAny> {
        // SAFETY: this proxy owns a unit on the object for at least 'a.
        unsafe { Borrowed::from_ptr(py, self.handle.as_ptr()) }
    }

    /// Check liveness, take the GIL and run `f` on the wrapped object.
    fn with_live<R, F>(&self, f: F) -> BridgeResult<R>
    where
        F: for<'py> FnOnce(Python<'py>, &Bound<'py, PyAny>) -> BridgeResult<R>,
    {
        self.session.ensure_live()?;
        Python::attach(|py| {
            let obj = self.borrowed(py);
            f(py, &obj)
        })
    }

    /// A new owned reference to the wrapped object.
    pub(crate) fn to_bound<'py>(&self, py: Python<'py>) -> BridgeResult<Bound<'py, PyAny>> {
        self.session.ensure_live()?;
        Ok(self.borrowed(py).to_owned())
    }

    /// Current reference count of the wrapped object.
    pub fn refcount(&self) -> BridgeResult<isize> {
        self.with_live(|py, _| Ok(self.handle.refcount(py)))
    }

    /// Decode this proxy if its bridge is in auto-convert mode.
    pub fn into_value(self) -> BridgeResult<Value> {
        self.session.ensure_live()?;
        if !self.session.auto_convert() {
            return Ok(Value::Object(self));
        }
        let session = self.session.clone();
        Python::attach(|py| {
            let obj = self.to_bound(py)?;
            drop(self);
            session.finish(py, obj)
        })
    }

    /// Release this proxy's unit now rather than at end of scope.
    pub fn release(self) {
        drop(self);
    }

    pub fn set_attr(&self, name: &str, value: impl Into<Value>) -> BridgeResult<()> {
        let c_name = ffi::c_string(name, "attribute name")?;
        let value = value.into();
        self.with_live(|py, obj| {
            let value = self.session.converter().encode(py, &value)?;
            ffi::set_attr(py, obj, &c_name, &value)
        })
    }

    pub fn has_attr(&self, name: &str) -> BridgeResult<bool> {
        self.resolve(name).map(|found| found.is_some())
    }

    /// Call the wrapped object itself.
    pub fn call(&self, args: &[Value]) -> BridgeResult<Value> {
        self.call_with_kwargs(args, &[])
    }

    pub fn call_with_kwargs(
        &self,
        args: &[Value],
        kwargs: &[(&str, Value)],
    ) -> BridgeResult<Value> {
        self.with_live(|py, callable| {
            let converter = self.session.converter();
            let args = converter.encode_args(py, args)?;
            let kwargs = converter.encode_kwargs(py, kwargs)?;
            let result = ffi::call(py, callable, &args, kwargs.as_ref())?;
            self.session.finish(py, result)
        })
    }

    /// Call the wrapped object and hand the result to `then`.
    pub fn call_then<F, R>(&self, args: &[Value], then: F) -> BridgeResult<R>
    where
        F: FnOnce(Value) -> R,
    {
        self.call(args).map(then)
    }

    /// `obj[key]`.
    pub fn get_item(&self, key: impl Into<Value>) -> BridgeResult<Value> {
        let key = key.into();
        self.with_live(|py, obj| {
            let key = self.session.converter().encode(py, &key)?;
            let item = ffi::get_item(py, obj, &key)?;
            self.session.finish(py, item)
        })
    }

    /// `obj[key] = value`.
    pub fn set_item(&self, key: impl Into<Value>, value: impl Into<Value>) -> BridgeResult<()> {
        let (key, value) = (key.into(), value.into());
        self.with_live(|py, obj| {
            let converter = self.session.converter();
            let key = converter.encode(py, &key)?;
            let value = converter.encode(py, &value)?;
            ffi::set_item(py, obj, &key, &value)
        })
    }

    /// `len(obj)`.
    pub fn len(&self) -> BridgeResult<usize> {
        self.with_live(|py, obj| ffi::length(py, obj))
    }

    pub fn is_empty(&self) -> BridgeResult<bool> {
        self.len().map(|len| len == 0)
    }

    pub fn is_none(&self) -> BridgeResult<bool> {
        self.with_live(|_, obj| Ok(obj.is_none()))
    }

    pub fn is_callable(&self) -> BridgeResult<bool> {
        self.with_live(|_, obj| Ok(obj.is_callable()))
    }

    /// Name of the object's type, e.g. `RupyMockObject`.
    pub fn type_name(&self) -> BridgeResult<String> {
        self.with_live(|py, obj| {
            obj.get_type()
                .name()
                .map(|name| name.to_string())
                .map_err(|e| crate::error::foreign(py, e))
        })
    }

    /// `str(obj)`.
    pub fn str(&self) -> BridgeResult<String> {
        self.with_live(|py, obj| ffi::str(py, obj))
    }

    /// `repr(obj)`.
    pub fn repr(&self) -> BridgeResult<String> {
        self.with_live(|py, obj| ffi::repr(py, obj))
    }
}

impl Resolve for ProxyObject {
    fn resolve(&self, name: &str) -> BridgeResult<Option<ProxyObject>> {
        let c_name = ffi::c_string(name, "attribute name")?;
        self.with_live(|py, obj| match ffi::get_attr(py, obj, &c_name)? {
            Some(attr) => self.session.wrap(attr).map(Some),
            None => Ok(None),
        })
    }

    fn searched(&self) -> Vec<String> {
        let described = self
            .repr()
            .unwrap_or_else(|_| format!("<foreign object at {:#x}>", self.address()));
        vec![described]
    }
}

impl Clone for ProxyObject {
    /// A second proxy on the same object, holding its own unit.
    fn clone(&self) -> Self {
        Python::attach(|py| handle::increment(py, &self.handle));
        self.session.retained();
        Self {
            handle: self.handle.share(),
            session: self.session.clone(),
        }
    }
}

impl Drop for ProxyObject {
    fn drop(&mut self) {
        Python::attach(|py| {
            // SAFETY: this proxy owns exactly one unit and is never used again.
            unsafe { handle::decrement(py, &self.handle) }
        });
        self.session.released();
    }
}

/// Identity: two proxies are equal when they wrap the same object.
impl PartialEq for ProxyObject {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl fmt::Debug for ProxyObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyObject")
            .field("address", &format_args!("{:#x}", self.address()))
            .field("generation", &self.session.generation())
            .finish()
    }
}
