//! Common test utilities for integration tests
//!
//! Provides a configurable step, log capture and polling helpers shared by
//! the integration test files.

#![allow(dead_code)]

use async_trait::async_trait;
use dynamic_scheduler::{KeyConfig, Step, StepError, StepReference, WorkflowContext};
use serde_json::json;
use std::collections::HashSet;
use std::future::Future;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::fmt::MakeWriter;

/// Shared record of `apply:<name>` / `revert:<name>` calls.
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn calls(log: &CallLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Step identified by a plain name with builder-style declarations.
///
/// Each declared output is produced as `"<name>.<key>"`.
#[derive(Debug, Clone, Default)]
pub struct KeyedStep {
    name: String,
    apply_inputs: Vec<KeyConfig>,
    apply_outputs: Vec<KeyConfig>,
    revert_inputs: Vec<KeyConfig>,
    revert_outputs: Vec<KeyConfig>,
    fail_apply: bool,
    fail_revert: bool,
    delay: Option<Duration>,
    log: Option<CallLog>,
}

impl KeyedStep {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn apply_in(mut self, keys: &[&str]) -> Self {
        self.apply_inputs = keys.iter().map(|k| KeyConfig::required(*k)).collect();
        self
    }

    pub fn apply_out(mut self, keys: &[&str]) -> Self {
        self.apply_outputs = keys.iter().map(|k| KeyConfig::required(*k)).collect();
        self
    }

    pub fn revert_in(mut self, keys: &[&str]) -> Self {
        self.revert_inputs = keys.iter().map(|k| KeyConfig::required(*k)).collect();
        self
    }

    pub fn revert_out(mut self, keys: &[&str]) -> Self {
        self.revert_outputs = keys.iter().map(|k| KeyConfig::required(*k)).collect();
        self
    }

    pub fn failing_apply(mut self) -> Self {
        self.fail_apply = true;
        self
    }

    pub fn failing_revert(mut self) -> Self {
        self.fail_revert = true;
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn logged(mut self, log: &CallLog) -> Self {
        self.log = Some(log.clone());
        self
    }

    fn record(&self, call: &str) {
        if let Some(log) = &self.log {
            log.lock().unwrap().push(format!("{call}:{}", self.name));
        }
    }

    fn produce(&self, keys: &[KeyConfig]) -> WorkflowContext {
        keys.iter()
            .map(|key| (key.name.clone(), json!(format!("{}.{}", self.name, key.name))))
            .collect()
    }
}

#[async_trait]
impl Step for KeyedStep {
    fn unique_reference(&self) -> StepReference {
        StepReference::new(self.name.clone())
    }

    fn apply_requests_inputs(&self) -> HashSet<KeyConfig> {
        self.apply_inputs.iter().cloned().collect()
    }

    fn apply_provides_outputs(&self) -> HashSet<KeyConfig> {
        self.apply_outputs.iter().cloned().collect()
    }

    fn revert_requests_inputs(&self) -> HashSet<KeyConfig> {
        self.revert_inputs.iter().cloned().collect()
    }

    fn revert_provides_outputs(&self) -> HashSet<KeyConfig> {
        self.revert_outputs.iter().cloned().collect()
    }

    async fn apply(&self, _inputs: WorkflowContext) -> Result<WorkflowContext, StepError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.record("apply");
        if self.fail_apply {
            return Err(StepError::new(format!("{} apply failed", self.name)));
        }
        Ok(self.produce(&self.apply_outputs))
    }

    async fn revert(&self, _inputs: WorkflowContext) -> Result<WorkflowContext, StepError> {
        self.record("revert");
        if self.fail_revert {
            return Err(StepError::new(format!("{} revert failed", self.name)));
        }
        Ok(self.produce(&self.revert_outputs))
    }
}

pub fn step_ref(name: &str) -> StepReference {
    StepReference::new(name)
}

/// In-memory log sink for asserting on emitted tracing events.
#[derive(Debug, Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }

    /// Subscriber writing plain-text records at DEBUG and above into `self`.
    pub fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync + 'static {
        tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Poll an async condition every 20ms until it holds or `timeout_ms` passes.
pub async fn wait_until<F, Fut>(mut predicate: F, timeout_ms: u64) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);

    while tokio::time::Instant::now() < deadline {
        if predicate().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    predicate().await
}
