//! Reusable callables and collaborator doubles for integration tests.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use taskloom::executors::{CallableError, RpcClient, RpcError};
use taskloom::types::IoMap;

/// Callable computing `value -> value + k`.
pub fn adder(k: i64) -> impl Fn(IoMap) -> Result<IoMap, CallableError> + Send + Sync + 'static {
    move |input: IoMap| {
        let value = input
            .get("value")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| CallableError::msg("missing input: value"))?;
        let mut out = IoMap::default();
        out.insert("value".into(), json!(value + k));
        Ok(out)
    }
}

/// Callable that always fails, counting its invocations.
pub fn always_failing(
    attempts: Arc<AtomicU32>,
) -> impl Fn(IoMap) -> Result<IoMap, CallableError> + Send + Sync + 'static {
    move |_input: IoMap| {
        attempts.fetch_add(1, Ordering::SeqCst);
        Err(CallableError::msg("synthetic failure"))
    }
}

/// Callable that fails the first `fail_times` invocations, then echoes its
/// input.
pub fn flaky(
    attempts: Arc<AtomicU32>,
    fail_times: u32,
) -> impl Fn(IoMap) -> Result<IoMap, CallableError> + Send + Sync + 'static {
    move |input: IoMap| {
        let attempt = attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < fail_times {
            Err(CallableError::msg(format!("flaky failure #{attempt}")))
        } else {
            Ok(input)
        }
    }
}

/// Coordination point for callables that should block until the test
/// releases them, flagging when execution has actually begun.
#[derive(Clone, Default)]
pub struct Gate {
    started: Arc<AtomicBool>,
    release: Arc<AtomicBool>,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    /// A callable that marks itself started, then parks until released.
    pub fn callable(&self) -> impl Fn(IoMap) -> Result<IoMap, CallableError> + Send + Sync + 'static {
        let started = Arc::clone(&self.started);
        let release = Arc::clone(&self.release);
        move |input: IoMap| {
            started.store(true, Ordering::SeqCst);
            while !release.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(2));
            }
            Ok(input)
        }
    }

    pub fn has_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Await the callable reporting in (the attempt is observably running).
    pub async fn wait_started(&self) {
        while !self.has_started() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    pub fn open(&self) {
        self.release.store(true, Ordering::SeqCst);
    }
}

/// RPC double that echoes its input plus a marker field.
pub struct EchoRpc {
    pub calls: AtomicU32,
}

impl EchoRpc {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl RpcClient for EchoRpc {
    async fn call(&self, procedure_uri: &str, input: IoMap) -> Result<IoMap, RpcError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut out = input;
        out.insert("procedure".into(), json!(procedure_uri));
        Ok(out)
    }
}

/// RPC double that rejects the first `fail_times` calls.
pub struct FlakyRpc {
    pub calls: AtomicU32,
    pub fail_times: u32,
}

impl FlakyRpc {
    pub fn new(fail_times: u32) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            fail_times,
        })
    }
}

#[async_trait]
impl RpcClient for FlakyRpc {
    async fn call(&self, _procedure_uri: &str, input: IoMap) -> Result<IoMap, RpcError> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst);
        if attempt < self.fail_times {
            Err(RpcError::msg(format!("transport glitch #{attempt}")))
        } else {
            Ok(input)
        }
    }
}

/// RPC double whose calls never resolve; only cancellation ends them.
pub struct NeverRpc {
    pub calls: AtomicU32,
}

impl NeverRpc {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl RpcClient for NeverRpc {
    async fn call(&self, _procedure_uri: &str, _input: IoMap) -> Result<IoMap, RpcError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        loop {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
    }
}
