//! Foreign object handles and the reference counter.
//!
//! A [`ForeignHandle`] is a non-null address in the interpreter heap. It does
//! not own anything by itself: ownership units are tracked by
//! [`ProxyObject`](crate::ProxyObject), which pairs every construction with
//! exactly one [`increment`] (explicit, or inherited from a call that returned
//! a new reference) and every destruction with exactly one [`decrement`].
//!
//! Both primitives take a `Python<'_>` token: the interpreter lock is the
//! mutex that keeps the pairing atomic with respect to the interpreter's own
//! bookkeeping.

use std::ptr::NonNull;

use pyo3::ffi;
use pyo3::Python;
use tracing::trace;

use crate::error::ContractViolation;

/// How a raw reference was obtained from the interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reference {
    /// Ownership transfers to the caller; store without incrementing.
    New,
    /// Owned elsewhere; increment before storing.
    Borrowed,
}

/// Opaque reference to an object in the interpreter heap.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct ForeignHandle {
    ptr: NonNull<ffi::PyObject>,
}

impl ForeignHandle {
    /// Wrap a raw object pointer. Null is a contract violation.
    pub fn from_raw(ptr: *mut ffi::PyObject) -> Result<Self, ContractViolation> {
        NonNull::new(ptr)
            .map(|ptr| Self { ptr })
            .ok_or(ContractViolation::NullHandle)
    }

    pub fn as_ptr(&self) -> *mut ffi::PyObject {
        self.ptr.as_ptr()
    }

    /// Address of the object, for identity comparisons and diagnostics.
    pub fn address(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    /// Reference count read from the object header.
    pub fn refcount(&self, _py: Python<'_>) -> isize {
        // SAFETY: the GIL is held and the caller keeps at least one unit alive.
        unsafe { ffi::Py_REFCNT(self.as_ptr()) }
    }

    /// Second handle to the same address. The caller accounts for the unit.
    pub(crate) fn share(&self) -> Self {
        Self { ptr: self.ptr }
    }
}

/// Add one unit to the object's reference count.
pub fn increment(py: Python<'_>, handle: &ForeignHandle) {
    // SAFETY: non-null by construction; GIL held.
    unsafe { ffi::Py_IncRef(handle.as_ptr()) };
    trace!(
        address = handle.address(),
        refcount = handle.refcount(py),
        "increment"
    );
}

/// Remove one unit from the object's reference count.
///
/// When the count reaches zero the interpreter reclaims the object.
///
/// # Safety
/// The caller must own the unit being released, and must not dereference
/// `handle` afterwards unless it still owns another unit on the same object.
pub unsafe fn decrement(py: Python<'_>, handle: &ForeignHandle) {
    trace!(
        address = handle.address(),
        refcount = handle.refcount(py),
        "decrement"
    );
    // SAFETY: upheld by the caller.
    unsafe { ffi::Py_DecRef(handle.as_ptr()) };
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyo3::prelude::*;
    use pyo3::types::PyList;

    #[test]
    fn test_null_handle_is_rejected() {
        assert_eq!(
            ForeignHandle::from_raw(std::ptr::null_mut()),
            Err(ContractViolation::NullHandle)
        );
    }

    #[test]
    fn test_increment_decrement_pair_is_neutral() {
        crate::runtime::ensure_initialized(false);
        Python::attach(|py| {
            let list = PyList::empty(py);
            let handle = ForeignHandle::from_raw(list.as_ptr()).unwrap();
            let before = handle.refcount(py);

            increment(py, &handle);
            assert_eq!(handle.refcount(py), before + 1);
            // SAFETY: releases the unit added just above; `list` keeps the object alive.
            unsafe { decrement(py, &handle) };
            assert_eq!(handle.refcount(py), before);
        });
    }
}
