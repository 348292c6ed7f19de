use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

use crate::error::SignalError;

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static SIGNAL_OPERATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new(
            "signal_operations_total",
            "mailbox operations by operation and result",
        ),
        &["op", "result"],
    )
    .expect("valid metric definition");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub fn record<T>(op: &str, result: &Result<T, SignalError>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(err) => err.code(),
    };
    SIGNAL_OPERATIONS.with_label_values(&[op, outcome]).inc();
}

pub fn render() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(err) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::warn!(error = %err, "failed to encode metrics");
    }
    String::from_utf8(buffer).unwrap_or_default()
}
