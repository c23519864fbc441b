//! Raw calls into the interpreter's C API.
//!
//! Every function here follows the same contract:
//!
//! 1. The GIL is held (a `Python<'py>` token is required)
//! 2. The raw call is issued on borrowed arguments
//! 3. The result goes straight through the error bridge
//! 4. On success the new reference comes back as an owned `Bound`
//!
//! Callers transfer the returned reference into a proxy with
//! [`Reference::New`](crate::handle::Reference::New); nothing here
//! increments on their behalf.

use std::ffi::{CStr, CString};
use std::ptr;

use pyo3::exceptions::PyAttributeError;
use pyo3::ffi;
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyTuple};

use crate::error::{self, BridgeResult, ConversionError};

/// NUL-terminated copy of a name or source string passed to the C API.
pub(crate) fn c_string(text: &str, what: &str) -> BridgeResult<CString> {
    CString::new(text)
        .map_err(|_| ConversionError::encode("str", format!("{what} contains a NUL byte")).into())
}

/// `import name`. Returns the module object (new reference).
pub(crate) fn import<'py>(py: Python<'py>, name: &CStr) -> BridgeResult<Bound<'py, PyAny>> {
    // SAFETY: `name` is NUL-terminated; GIL held.
    error::check(py, unsafe { ffi::PyImport_ImportModule(name.as_ptr()) })
}

/// `getattr(obj, name)`, with `AttributeError` reported as `Ok(None)`.
///
/// Any other exception raised during the lookup is a foreign error.
pub(crate) fn get_attr<'py>(
    py: Python<'py>,
    obj: &Bound<'py, PyAny>,
    name: &CStr,
) -> BridgeResult<Option<Bound<'py, PyAny>>> {
    // SAFETY: `obj` is alive for 'py; `name` is NUL-terminated.
    let ptr = unsafe { ffi::PyObject_GetAttrString(obj.as_ptr(), name.as_ptr()) };
    if !ptr.is_null() {
        // SAFETY: PyObject_GetAttrString returns a new reference.
        return Ok(Some(unsafe { Bound::from_owned_ptr(py, ptr) }));
    }
    match PyErr::take(py) {
        Some(err) if err.is_instance_of::<PyAttributeError>(py) => Ok(None),
        Some(err) => Err(error::foreign(py, err)),
        None => error::check(py, ptr).map(Some),
    }
}

/// `setattr(obj, name, value)`.
pub(crate) fn set_attr(
    py: Python<'_>,
    obj: &Bound<'_, PyAny>,
    name: &CStr,
    value: &Bound<'_, PyAny>,
) -> BridgeResult<()> {
    // SAFETY: all pointers are alive; the callee does not steal `value`.
    let status =
        unsafe { ffi::PyObject_SetAttrString(obj.as_ptr(), name.as_ptr(), value.as_ptr()) };
    error::check_status(py, status)
}

/// `callable(*args, **kwargs)`.
pub(crate) fn call<'py>(
    py: Python<'py>,
    callable: &Bound<'py, PyAny>,
    args: &Bound<'py, PyTuple>,
    kwargs: Option<&Bound<'py, PyDict>>,
) -> BridgeResult<Bound<'py, PyAny>> {
    let kwargs = kwargs.map_or(ptr::null_mut(), |k| k.as_ptr());
    // SAFETY: arguments are borrowed for the duration of the call.
    error::check(py, unsafe {
        ffi::PyObject_Call(callable.as_ptr(), args.as_ptr(), kwargs)
    })
}

/// `obj[key]`.
pub(crate) fn get_item<'py>(
    py: Python<'py>,
    obj: &Bound<'py, PyAny>,
    key: &Bound<'py, PyAny>,
) -> BridgeResult<Bound<'py, PyAny>> {
    // SAFETY: both pointers are alive; returns a new reference.
    error::check(py, unsafe { ffi::PyObject_GetItem(obj.as_ptr(), key.as_ptr()) })
}

/// `obj[key] = value`.
pub(crate) fn set_item(
    py: Python<'_>,
    obj: &Bound<'_, PyAny>,
    key: &Bound<'_, PyAny>,
    value: &Bound<'_, PyAny>,
) -> BridgeResult<()> {
    // SAFETY: all pointers are alive; the callee does not steal references.
    let status = unsafe { ffi::PyObject_SetItem(obj.as_ptr(), key.as_ptr(), value.as_ptr()) };
    error::check_status(py, status)
}

/// `len(obj)`.
pub(crate) fn length(py: Python<'_>, obj: &Bound<'_, PyAny>) -> BridgeResult<usize> {
    // SAFETY: `obj` is alive.
    let len = unsafe { ffi::PyObject_Size(obj.as_ptr()) };
    if len < 0 {
        return Err(error::failure(py));
    }
    Ok(len as usize)
}

/// `str(obj)` as a Rust string.
pub(crate) fn str(py: Python<'_>, obj: &Bound<'_, PyAny>) -> BridgeResult<String> {
    // SAFETY: `obj` is alive; returns a new reference.
    let text = error::check(py, unsafe { ffi::PyObject_Str(obj.as_ptr()) })?;
    text.extract::<String>().map_err(|e| error::foreign(py, e.into()))
}

/// `repr(obj)` as a Rust string.
pub(crate) fn repr(py: Python<'_>, obj: &Bound<'_, PyAny>) -> BridgeResult<String> {
    // SAFETY: `obj` is alive; returns a new reference.
    let text = error::check(py, unsafe { ffi::PyObject_Repr(obj.as_ptr()) })?;
    text.extract::<String>().map_err(|e| error::foreign(py, e.into()))
}
