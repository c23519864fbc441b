//! Process-level interpreter bring-up.
//!
//! The interpreter is initialised once per process, on the first session
//! start, and is never finalised: native extension modules cannot survive a
//! finalise/re-initialise cycle. Session stop is handled by [`Bridge`]
//! instead.
//!
//! [`Bridge`]: crate::Bridge

use std::path::PathBuf;
use std::sync::Once;

use pyo3::prelude::*;
use tracing::{debug, trace};

use crate::error::{self, BridgeResult};

static INIT: Once = Once::new();

/// Initialise the embedded interpreter if this process has not yet.
///
/// With `global_symbols`, first re-open an already loaded `libpython` with
/// `RTLD_GLOBAL` so C extensions (NumPy, PyTorch) can resolve interpreter
/// symbols. Only the first caller's choice takes effect.
pub(crate) fn ensure_initialized(global_symbols: bool) {
    INIT.call_once(|| {
        if global_symbols {
            promote_global_symbols();
        }
        // Initialize without installing signal handlers (embedding mode).
        Python::initialize();
        debug!("embedded interpreter initialized");
    });
}

#[cfg(target_os = "linux")]
fn promote_global_symbols() {
    use libc::{dlopen, RTLD_GLOBAL, RTLD_NOLOAD, RTLD_NOW};

    const CANDIDATES: &[&std::ffi::CStr] = &[
        c"libpython3.so",
        c"libpython3.14.so.1.0",
        c"libpython3.13.so.1.0",
        c"libpython3.12.so.1.0",
        c"libpython3.11.so.1.0",
        c"libpython3.10.so.1.0",
        c"libpython3.14.so",
        c"libpython3.13.so",
        c"libpython3.12.so",
        c"libpython3.11.so",
        c"libpython3.10.so",
    ];
    for name in CANDIDATES {
        // SAFETY: NUL-terminated literal; RTLD_NOLOAD only probes loaded objects.
        let loaded = unsafe { dlopen(name.as_ptr(), RTLD_NOW | RTLD_NOLOAD) };
        if !loaded.is_null() {
            // SAFETY: as above; the library is already mapped.
            unsafe { dlopen(name.as_ptr(), RTLD_NOW | RTLD_GLOBAL) };
            debug!(library = ?name, "interpreter symbols promoted to global scope");
            return;
        }
    }
    trace!("no shared libpython loaded, symbols left as linked");
}

#[cfg(not(target_os = "linux"))]
fn promote_global_symbols() {}

/// Prepend `paths` to `sys.path`, skipping entries already present.
pub(crate) fn prepend_search_paths(py: Python<'_>, paths: &[PathBuf]) -> BridgeResult<()> {
    if paths.is_empty() {
        return Ok(());
    }
    let sys_path = py
        .import("sys")
        .and_then(|sys| sys.getattr("path"))
        .map_err(|e| error::foreign(py, e))?;
    for path in paths.iter().rev() {
        let entry = path.to_string_lossy();
        let present = sys_path
            .contains(entry.as_ref())
            .map_err(|e| error::foreign(py, e))?;
        if present {
            continue;
        }
        sys_path
            .call_method1("insert", (0i32, entry.as_ref()))
            .map_err(|e| error::foreign(py, e))?;
        trace!(path = %entry, "added to module search path");
    }
    Ok(())
}

/// Run a full collection; returns the number of unreachable objects found.
pub(crate) fn collect_garbage(py: Python<'_>) -> BridgeResult<usize> {
    let collected = py
        .import("gc")
        .and_then(|gc| gc.call_method0("collect"))
        .map_err(|e| error::foreign(py, e))?;
    collected
        .extract::<usize>()
        .map_err(|e| error::foreign(py, e.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialization_is_idempotent() {
        ensure_initialized(true);
        ensure_initialized(false);
        Python::attach(|py| {
            assert!(py.version_info() >= (3, 7));
        });
    }

    #[test]
    fn test_search_paths_are_prepended_once() {
        ensure_initialized(false);
        let dir = PathBuf::from("/nonexistent/rupy-runtime-test");
        Python::attach(|py| {
            prepend_search_paths(py, &[dir.clone()]).unwrap();
            prepend_search_paths(py, &[dir.clone()]).unwrap();

            let sys_path: Vec<String> = py
                .import("sys")
                .unwrap()
                .getattr("path")
                .unwrap()
                .extract()
                .unwrap();
            let hits = sys_path
                .iter()
                .filter(|entry| entry.as_str() == "/nonexistent/rupy-runtime-test")
                .count();
            assert_eq!(hits, 1);
        });
    }

    #[test]
    fn test_collect_garbage_runs() {
        ensure_initialized(false);
        Python::attach(|py| {
            assert!(collect_garbage(py).is_ok());
        });
    }
}
