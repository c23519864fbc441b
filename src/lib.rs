//! rupy: an embedded CPython bridge for Rust hosts.
//!
//! This crate embeds a Python interpreter in the host process using PyO3 and
//! exposes its objects as first-class Rust values:
//!
//! - Session lifecycle (start, stop, scoped sessions)
//! - Reference-counted proxies with dynamic attribute and method dispatch
//! - Table-driven conversion between host values and Python objects
//! - Translation of Python exceptions into Rust errors
//!
//! ```no_run
//! use rupy::prelude::*;
//!
//! let bridge = Bridge::new();
//! bridge.session(|bridge| {
//!     bridge.set_auto_convert(true);
//!     let math = bridge.import("math")?;
//!     let root = math.call_method("sqrt", &[Value::from(16.0)])?;
//!     assert_eq!(root, Value::Float(4.0));
//!     Ok(())
//! })?;
//! # Ok::<(), rupy::BridgeError>(())
//! ```
//!
//! The interpreter is single threaded from the bridge's point of view: a
//! [`Bridge`] and its proxies are neither `Send` nor `Sync`.

pub mod config;
pub mod convert;
pub mod dispatch;
pub mod error;
mod ffi;
pub mod handle;
pub mod proxy;
mod runtime;
pub mod session;

pub use config::{BridgeConfig, ConfigError};
pub use convert::{ConversionRule, Converter, TypeTag, Value};
pub use dispatch::{Namespace, Resolve};
pub use error::{BridgeError, BridgeResult, ContractViolation, ConversionError, ForeignError};
pub use handle::{ForeignHandle, Reference};
pub use proxy::ProxyObject;
pub use session::{Bridge, SessionGuard, SessionState};

pub mod prelude {
    pub use crate::{Bridge, BridgeResult, ProxyObject, Resolve, Value};
}
