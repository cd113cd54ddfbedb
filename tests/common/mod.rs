#![allow(dead_code)]
//! Shared integration test utilities.
//!
//! Import with:
//! ```
//! mod common;
//! use common::*;
//! ```

use std::sync::Arc;
use std::sync::Once;
use traceweave::export::InMemoryExporter;
use traceweave::runtime::Weaver;
use traceweave::util::DetIdSource;

static INIT_LOGGING: Once = Once::new();

/// Initialize test logging with debug-level output.
///
/// Safe to call multiple times; only initializes once.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .with_target(true)
            .with_ansi(false)
            .try_init();
    });
}

/// Builds a weaver with deterministic ids and an in-memory exporter.
pub fn det_weaver(seed: u64) -> (Weaver, Arc<InMemoryExporter>) {
    let exporter = InMemoryExporter::new();
    let weaver = Weaver::builder()
        .with_exporter(exporter.clone())
        .with_id_source(DetIdSource::shared(seed))
        .build();
    (weaver, exporter)
}
