//! Interpreter sessions.
//!
//! A [`Bridge`] is the context object every bridge operation runs through.
//! It owns the session state, the auto-convert flag, the conversion table
//! and the cached `__main__`/`builtins` namespaces. Proxies keep a
//! [`SessionRef`] back to that state, stamped with the generation that was
//! live when they were created; once the session stops (or restarts) their
//! generation no longer matches and every operation on them reports a
//! [`ContractViolation`].
//!
//! Several bridges can coexist in one process. They share the embedded
//! interpreter but nothing else.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use pyo3::ffi::PyObject;
use pyo3::prelude::*;
use tracing::{debug, warn};

use crate::config::BridgeConfig;
use crate::convert::{Converter, Value};
use crate::dispatch::Namespace;
use crate::error::{self, BridgeResult, ContractViolation};
use crate::ffi;
use crate::handle::{self, ForeignHandle, Reference};
use crate::proxy::ProxyObject;
use crate::runtime;

/// Lifecycle state of a bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Stopped,
    Running,
}

/// State shared between a bridge and the proxies it issued.
pub(crate) struct Shared {
    /// Generation of the running session; `0` while stopped.
    generation: Cell<u64>,
    auto_convert: Cell<bool>,
    /// Ownership units held by live proxies.
    outstanding: Cell<usize>,
    converter: Converter,
}

/// A proxy's link to the session that issued it.
#[derive(Clone)]
pub(crate) struct SessionRef {
    shared: Rc<Shared>,
    generation: u64,
}

impl SessionRef {
    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn ensure_live(&self) -> Result<(), ContractViolation> {
        match self.shared.generation.get() {
            0 => Err(ContractViolation::SessionStopped),
            live if live == self.generation => Ok(()),
            _ => Err(ContractViolation::StaleHandle),
        }
    }

    pub(crate) fn auto_convert(&self) -> bool {
        self.shared.auto_convert.get()
    }

    pub(crate) fn converter(&self) -> &Converter {
        &self.shared.converter
    }

    /// Take one ownership unit on `ptr` and wrap it.
    ///
    /// A new reference is stored as is; a borrowed one is incremented first.
    pub(crate) fn adopt(
        &self,
        py: Python<'_>,
        ptr: *mut PyObject,
        reference: Reference,
    ) -> BridgeResult<ProxyObject> {
        let handle = ForeignHandle::from_raw(ptr)?;
        if reference == Reference::Borrowed {
            handle::increment(py, &handle);
        }
        self.retained();
        Ok(ProxyObject::new(handle, self.clone()))
    }

    /// Transfer the unit owned by `obj` into a proxy.
    pub(crate) fn wrap(&self, obj: Bound<'_, PyAny>) -> BridgeResult<ProxyObject> {
        let py = obj.py();
        self.adopt(py, obj.into_ptr(), Reference::New)
    }

    /// Turn a call result into a host value, honouring auto-convert mode.
    pub(crate) fn finish<'py>(
        &self,
        py: Python<'py>,
        obj: Bound<'py, PyAny>,
    ) -> BridgeResult<Value> {
        if self.auto_convert() {
            self.shared.converter.decode(self, py, obj)
        } else {
            self.wrap(obj).map(Value::Object)
        }
    }

    pub(crate) fn retained(&self) {
        self.shared.outstanding.set(self.shared.outstanding.get() + 1);
    }

    pub(crate) fn released(&self) {
        self.shared
            .outstanding
            .set(self.shared.outstanding.get().saturating_sub(1));
    }
}

struct Namespaces {
    main: ProxyObject,
    builtins: ProxyObject,
}

/// Owner of one interpreter session at a time.
pub struct Bridge {
    shared: Rc<Shared>,
    config: BridgeConfig,
    namespaces: RefCell<Option<Namespaces>>,
    next_generation: Cell<u64>,
}

impl Bridge {
    pub fn new() -> Self {
        Self::with_config(BridgeConfig::default())
    }

    pub fn with_config(config: BridgeConfig) -> Self {
        Self::with_converter(config, Converter::default())
    }

    pub fn with_converter(config: BridgeConfig, converter: Converter) -> Self {
        let shared = Rc::new(Shared {
            generation: Cell::new(0),
            auto_convert: Cell::new(config.auto_convert),
            outstanding: Cell::new(0),
            converter,
        });
        Self {
            shared,
            config,
            namespaces: RefCell::new(None),
            next_generation: Cell::new(1),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn converter(&self) -> &Converter {
        &self.shared.converter
    }

    pub fn state(&self) -> SessionState {
        if self.is_running() {
            SessionState::Running
        } else {
            SessionState::Stopped
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.generation.get() != 0
    }

    /// Start a session. Returns `false` if one is already running.
    pub fn start(&self) -> BridgeResult<bool> {
        if self.is_running() {
            return Ok(false);
        }
        runtime::ensure_initialized(self.config.global_symbols);
        Python::attach(|py| runtime::prepend_search_paths(py, &self.config.search_paths))?;

        let generation = self.next_generation.get();
        self.next_generation.set(generation + 1);
        self.shared.generation.set(generation);
        debug!(generation, "interpreter session started");
        Ok(true)
    }

    /// Stop the running session. Returns `false` if none was running.
    ///
    /// Cached namespaces are released here. Every other proxy issued by this
    /// session is dead afterwards: using one is a contract violation, and
    /// dropping one still releases its unit.
    pub fn stop(&self) -> bool {
        let generation = self.shared.generation.get();
        if generation == 0 {
            return false;
        }
        let cached = self.namespaces.borrow_mut().take();
        if let Some(namespaces) = cached {
            drop(namespaces);
            debug!(generation, "cached namespaces released");
        }
        if self.config.collect_on_stop {
            Python::attach(|py| {
                if let Err(err) = runtime::collect_garbage(py) {
                    warn!(%err, "garbage collection during stop failed");
                }
            });
        }
        self.shared.generation.set(0);
        debug!(
            generation,
            outstanding = self.shared.outstanding.get(),
            "interpreter session stopped"
        );
        true
    }

    pub fn auto_convert(&self) -> bool {
        self.shared.auto_convert.get()
    }

    /// Toggle decoding of call results into native values.
    pub fn set_auto_convert(&self, enabled: bool) {
        self.shared.auto_convert.set(enabled);
    }

    /// Ownership units held by live proxies issued by this bridge.
    pub fn outstanding_references(&self) -> usize {
        self.shared.outstanding.get()
    }

    fn current(&self) -> BridgeResult<SessionRef> {
        match self.shared.generation.get() {
            0 => Err(ContractViolation::SessionStopped.into()),
            generation => Ok(SessionRef {
                shared: Rc::clone(&self.shared),
                generation,
            }),
        }
    }

    /// Import a module and wrap it. Modules are never decoded.
    pub fn import(&self, name: &str) -> BridgeResult<ProxyObject> {
        let session = self.current()?;
        let c_name = ffi::c_string(name, "module name")?;
        Python::attach(|py| {
            let module = ffi::import(py, &c_name)?;
            debug!(module = name, "imported");
            session.wrap(module)
        })
    }

    fn with_namespaces<R>(&self, f: impl FnOnce(&Namespaces) -> R) -> BridgeResult<R> {
        self.current()?;
        let mut cache = self.namespaces.borrow_mut();
        if let Some(namespaces) = cache.as_ref() {
            return Ok(f(namespaces));
        }
        let namespaces = Namespaces {
            main: self.import("__main__")?,
            builtins: self.import("builtins")?,
        };
        let result = f(&namespaces);
        *cache = Some(namespaces);
        Ok(result)
    }

    /// The `__main__` module.
    pub fn main_module(&self) -> BridgeResult<ProxyObject> {
        self.with_namespaces(|ns| ns.main.clone())
    }

    /// The `builtins` module.
    pub fn builtins(&self) -> BridgeResult<ProxyObject> {
        self.with_namespaces(|ns| ns.builtins.clone())
    }

    /// `__main__` with `builtins` as its fallback.
    pub fn main(&self) -> BridgeResult<Namespace> {
        self.with_namespaces(|ns| {
            Namespace::new(ns.main.clone()).with_fallback(ns.builtins.clone())
        })
    }

    /// Evaluate an expression in the `__main__` namespace.
    pub fn eval(&self, expr: &str) -> BridgeResult<Value> {
        let session = self.current()?;
        let code = ffi::c_string(expr, "expression")?;
        Python::attach(|py| {
            let result = py
                .eval(&code, None, None)
                .map_err(|e| error::foreign(py, e))?;
            session.finish(py, result)
        })
    }

    /// Execute statements in the `__main__` namespace.
    pub fn exec(&self, code: &str) -> BridgeResult<()> {
        self.current()?;
        let code = ffi::c_string(code, "code")?;
        Python::attach(|py| py.run(&code, None, None).map_err(|e| error::foreign(py, e)))
    }

    /// Encode a host value into a new interpreter object.
    pub fn encode(&self, value: &Value) -> BridgeResult<ProxyObject> {
        let session = self.current()?;
        Python::attach(|py| {
            let obj = self.shared.converter.encode(py, value)?;
            session.wrap(obj)
        })
    }

    /// Decode a proxy with this bridge's rules.
    ///
    /// With auto-convert off the proxy comes back unchanged.
    pub fn decode(&self, proxy: ProxyObject) -> BridgeResult<Value> {
        let session = self.current()?;
        if !self.auto_convert() {
            return Ok(Value::Object(proxy));
        }
        Python::attach(|py| {
            let obj = proxy.to_bound(py)?;
            drop(proxy);
            session.finish(py, obj)
        })
    }

    /// Start a session that stops when the guard is dropped.
    pub fn enter(&self) -> BridgeResult<SessionGuard<'_>> {
        self.start()?;
        Ok(SessionGuard { bridge: self })
    }

    /// Run `work` inside a session, stopping it on every exit path.
    pub fn session<F, R>(&self, work: F) -> BridgeResult<R>
    where
        F: FnOnce(&Bridge) -> BridgeResult<R>,
    {
        let guard = self.enter()?;
        work(&guard)
    }
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("state", &self.state())
            .field("generation", &self.shared.generation.get())
            .field("auto_convert", &self.auto_convert())
            .field("outstanding", &self.outstanding_references())
            .finish()
    }
}

/// Stops its bridge's session on drop, including during unwinding.
#[must_use = "the session stops as soon as the guard is dropped"]
pub struct SessionGuard<'a> {
    bridge: &'a Bridge,
}

impl Deref for SessionGuard<'_> {
    type Target = Bridge;

    fn deref(&self) -> &Bridge {
        self.bridge
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.bridge.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_stop_are_idempotent() {
        let bridge = Bridge::new();
        assert_eq!(bridge.state(), SessionState::Stopped);
        assert!(!bridge.stop());

        assert!(bridge.start().unwrap());
        assert!(!bridge.start().unwrap());
        assert_eq!(bridge.state(), SessionState::Running);

        assert!(bridge.stop());
        assert!(!bridge.stop());
        assert_eq!(bridge.state(), SessionState::Stopped);
    }

    #[test]
    fn test_operations_require_running_session() {
        let bridge = Bridge::new();
        let err = bridge.import("sys").unwrap_err();
        assert!(matches!(
            err,
            crate::BridgeError::Contract(ContractViolation::SessionStopped)
        ));
        assert!(bridge.eval("1").unwrap_err().is_contract_violation());
        assert!(bridge.main().unwrap_err().is_contract_violation());
    }

    #[test]
    fn test_restart_issues_new_generation() {
        let bridge = Bridge::new();
        bridge.start().unwrap();
        let first = bridge.current().unwrap().generation();
        bridge.stop();
        bridge.start().unwrap();
        let second = bridge.current().unwrap().generation();
        assert!(second > first);
    }

    #[test]
    fn test_namespaces_released_on_stop() {
        let bridge = Bridge::new();
        bridge.start().unwrap();
        bridge.main().unwrap();
        assert!(bridge.outstanding_references() >= 2);
        bridge.stop();
        assert_eq!(bridge.outstanding_references(), 0);
    }

    #[test]
    fn test_adopt_borrowed_takes_its_own_unit() {
        let bridge = Bridge::new();
        bridge.start().unwrap();
        let session = bridge.current().unwrap();
        Python::attach(|py| {
            let list = pyo3::types::PyList::empty(py);
            let probe = ForeignHandle::from_raw(list.as_ptr()).unwrap();
            let before = probe.refcount(py);

            let borrowed = session
                .adopt(py, list.as_ptr(), Reference::Borrowed)
                .unwrap();
            assert_eq!(probe.refcount(py), before + 1);
            assert_eq!(bridge.outstanding_references(), 1);

            drop(borrowed);
            assert_eq!(probe.refcount(py), before);
            assert_eq!(bridge.outstanding_references(), 0);
        });
    }

    #[test]
    fn test_adopt_rejects_null() {
        let bridge = Bridge::new();
        bridge.start().unwrap();
        let session = bridge.current().unwrap();
        let err = Python::attach(|py| {
            session
                .adopt(py, std::ptr::null_mut(), Reference::New)
                .unwrap_err()
        });
        assert!(matches!(
            err,
            crate::BridgeError::Contract(ContractViolation::NullHandle)
        ));
        assert_eq!(bridge.outstanding_references(), 0);
    }

    #[derive(Clone, Default)]
    struct Captured(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_stop_logs_namespace_release() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let bridge = Bridge::new();
        tracing::subscriber::with_default(subscriber, || {
            bridge.start().unwrap();
            bridge.main().unwrap();
            assert!(bridge.stop());
        });

        let logs = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(logs.contains("cached namespaces released"), "{logs}");
        assert!(logs.contains("interpreter session stopped"), "{logs}");
    }
}
