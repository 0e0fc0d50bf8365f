//! A stub hardware register, built behind the `test-util` feature so the
//! integration tests (and nothing else) can drive a `SignalSink` end to
//! end without a real piece of hardware: a shared concurrent key -> value
//! store updated on every signal change.
#![cfg(feature = "test-util")]

use async_trait::async_trait;
use dashmap::DashMap;

use oadr_control::SignalSink;

pub struct RegisterSink {
    pub values: DashMap<&'static str, f64>,
}

impl RegisterSink {
    pub fn new() -> Self {
        Self { values: DashMap::new() }
    }
}

#[async_trait]
impl SignalSink for RegisterSink {
    async fn signal_changed(&self, _old: f64, new: f64) {
        self.values.insert("signal_level", new);
    }
}
