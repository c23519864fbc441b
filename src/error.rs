//! Error taxonomy and the foreign error bridge.
//!
//! Every raw call into the interpreter is followed by a check for a pending
//! foreign exception. A pending exception is fetched and cleared exactly once
//! and surfaces as [`BridgeError::Foreign`], carrying the exception type,
//! message and formatted traceback so callers can diagnose it without
//! re-entering the interpreter.
//!
//! **Taxonomy:**
//! - [`ForeignError`]: an exception raised inside the interpreter. Recoverable.
//! - [`ContractViolation`]: the bridge was used outside its preconditions
//!   (session stopped, stale or null handle). Programmer error.
//! - [`ConversionError`]: a value has no encoding or decoding path.
//! - `AttributeNotFound`: every namespace in a lookup chain missed.

use std::fmt;
use std::os::raw::c_int;

use pyo3::ffi;
use pyo3::prelude::*;
use thiserror::Error;

use crate::config::ConfigError;

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors surfaced by bridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// An exception raised by the interpreter.
    #[error(transparent)]
    Foreign(#[from] ForeignError),

    /// The bridge was used outside its preconditions.
    #[error("contract violation: {0}")]
    Contract(#[from] ContractViolation),

    /// A value could not be moved across the boundary.
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// The name was missing from every namespace consulted.
    #[error("attribute '{name}' not found in {}", .searched.join(" or "))]
    AttributeNotFound { name: String, searched: Vec<String> },

    /// Bridge configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl BridgeError {
    /// The foreign exception, if this error came from the interpreter.
    pub fn as_foreign(&self) -> Option<&ForeignError> {
        match self {
            BridgeError::Foreign(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_contract_violation(&self) -> bool {
        matches!(self, BridgeError::Contract(_))
    }
}

/// A foreign exception, detached from the interpreter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ForeignError {
    /// Exception class name, e.g. `ValueError`.
    pub kind: String,
    /// `str()` of the exception instance.
    pub message: String,
    /// Formatted traceback, when the exception carried one.
    pub traceback: Option<String>,
}

impl ForeignError {
    /// Extract type, message and traceback from a fetched exception.
    pub fn from_pyerr(py: Python<'_>, err: PyErr) -> Self {
        let kind = err
            .get_type(py)
            .name()
            .map(|name| name.to_string())
            .unwrap_or_else(|_| "BaseException".to_owned());
        let message = err
            .value(py)
            .str()
            .map(|s| s.to_string())
            .unwrap_or_default();
        let traceback = err.traceback(py).and_then(|tb| tb.format().ok());
        Self {
            kind,
            message,
            traceback,
        }
    }

    /// A call reported failure but left no exception behind.
    fn missing() -> Self {
        Self {
            kind: "SystemError".to_owned(),
            message: "foreign call failed without setting an exception".to_owned(),
            traceback: None,
        }
    }

    /// Whether the exception class name equals `kind`.
    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }
}

/// Misuse of the bridge. Never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContractViolation {
    #[error("interpreter session is stopped")]
    SessionStopped,

    #[error("handle was issued by an earlier interpreter session")]
    StaleHandle,

    #[error("null foreign handle")]
    NullHandle,
}

/// Which way a failed conversion was going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Encode,
    Decode,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Encode => f.write_str("encode"),
            Direction::Decode => f.write_str("decode"),
        }
    }
}

/// A value (or one of its elements) had no valid conversion path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot {direction} {type_name}: {reason}")]
pub struct ConversionError {
    pub direction: Direction,
    pub type_name: String,
    pub reason: String,
}

impl ConversionError {
    pub fn encode(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            direction: Direction::Encode,
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }

    pub fn decode(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            direction: Direction::Decode,
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }
}

// ==================== Error Bridge ====================

/// Whether the interpreter has an exception pending on this thread.
pub fn pending(_py: Python<'_>) -> bool {
    // SAFETY: the GIL is held, as witnessed by `_py`.
    unsafe { !ffi::PyErr_Occurred().is_null() }
}

/// Fetch and clear the pending exception, if any.
///
/// A second call without an intervening failure returns `None`.
pub fn take_pending(py: Python<'_>) -> Option<ForeignError> {
    PyErr::take(py).map(|err| ForeignError::from_pyerr(py, err))
}

/// Check the result of a raw call that returns a new reference.
///
/// Null means the call failed; the pending exception is translated.
pub(crate) fn check<'py>(
    py: Python<'py>,
    ptr: *mut ffi::PyObject,
) -> BridgeResult<Bound<'py, PyAny>> {
    if ptr.is_null() {
        return Err(failure(py));
    }
    // SAFETY: non-null result of a call documented to return a new reference.
    Ok(unsafe { Bound::from_owned_ptr(py, ptr) })
}

/// Check the status code of a raw call that returns `-1` on failure.
pub(crate) fn check_status(py: Python<'_>, status: c_int) -> BridgeResult<()> {
    if status < 0 {
        return Err(failure(py));
    }
    Ok(())
}

/// Translate the exception left behind by a raw call that reported failure.
pub(crate) fn failure(py: Python<'_>) -> BridgeError {
    take_pending(py).unwrap_or_else(ForeignError::missing).into()
}

/// Translate an error already fetched by the high-level API.
pub(crate) fn foreign(py: Python<'_>, err: PyErr) -> BridgeError {
    BridgeError::Foreign(ForeignError::from_pyerr(py, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyo3::exceptions::PyValueError;

    #[test]
    fn test_conversion_error_display() {
        let err = ConversionError::encode("set", "unhashable type: 'list'");
        assert_eq!(err.to_string(), "cannot encode set: unhashable type: 'list'");
    }

    #[test]
    fn test_attribute_not_found_lists_every_namespace() {
        let err = BridgeError::AttributeNotFound {
            name: "frobnicate".into(),
            searched: vec!["<module '__main__'>".into(), "<module 'builtins'>".into()],
        };
        assert_eq!(
            err.to_string(),
            "attribute 'frobnicate' not found in <module '__main__'> or <module 'builtins'>"
        );
    }

    #[test]
    fn test_pending_error_is_taken_exactly_once() {
        crate::runtime::ensure_initialized(false);
        Python::attach(|py| {
            assert!(!pending(py));
            PyValueError::new_err("bad value").restore(py);
            assert!(pending(py));

            let err = take_pending(py).unwrap();
            assert_eq!(err.kind, "ValueError");
            assert_eq!(err.message, "bad value");
            assert!(err.is("ValueError"));
            assert_eq!(err.to_string(), "ValueError: bad value");

            assert!(!pending(py));
            assert!(take_pending(py).is_none());
        });
    }

    #[test]
    fn test_null_without_exception_is_system_error() {
        crate::runtime::ensure_initialized(false);
        Python::attach(|py| {
            let err = check(py, std::ptr::null_mut()).unwrap_err();
            let foreign = err.as_foreign().unwrap();
            assert_eq!(foreign.kind, "SystemError");
        });
    }
}
