//! Shared helpers for bridge integration tests.

#![allow(dead_code)]

use std::path::PathBuf;

use rupy::prelude::*;
use rupy::BridgeConfig;
use tracing_subscriber::EnvFilter;

/// Directory holding `objects.py`.
pub fn fixture_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("python")
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A started bridge that can import the fixture module.
pub fn running_bridge() -> Bridge {
    init_tracing();
    let bridge = Bridge::with_config(BridgeConfig::default().with_search_path(fixture_dir()));
    assert!(bridge.start().unwrap());
    bridge
}

pub fn objects(bridge: &Bridge) -> ProxyObject {
    bridge.import("objects").unwrap()
}

/// Unwrap a proxy result, failing loudly on anything decoded.
pub fn proxy(value: Value) -> ProxyObject {
    match value {
        Value::Object(proxy) => proxy,
        other => panic!("expected a proxy, got {other:?}"),
    }
}
