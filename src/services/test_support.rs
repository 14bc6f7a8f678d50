//! Configurable steps for unit tests.

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::domain::models::{KeyConfig, StepReference, WorkflowContext};
use crate::domain::ports::{Step, StepError};

/// Shared record of `apply:<name>` / `revert:<name>` calls.
pub(crate) type CallLog = Arc<Mutex<Vec<String>>>;

#[derive(Debug, Clone, Default)]
pub(crate) struct TestStep {
    name: &'static str,
    apply_inputs: Vec<KeyConfig>,
    apply_outputs: Vec<KeyConfig>,
    revert_inputs: Vec<KeyConfig>,
    revert_outputs: Vec<KeyConfig>,
    fail_apply: bool,
    fail_revert: bool,
    log: Option<CallLog>,
}

impl TestStep {
    pub(crate) fn named(name: &'static str) -> Self {
        Self {
            name,
            ..Default::default()
        }
    }

    pub(crate) fn apply_in(mut self, keys: &[KeyConfig]) -> Self {
        self.apply_inputs = keys.to_vec();
        self
    }

    pub(crate) fn apply_out(mut self, keys: &[KeyConfig]) -> Self {
        self.apply_outputs = keys.to_vec();
        self
    }

    pub(crate) fn revert_in(mut self, keys: &[KeyConfig]) -> Self {
        self.revert_inputs = keys.to_vec();
        self
    }

    pub(crate) fn revert_out(mut self, keys: &[KeyConfig]) -> Self {
        self.revert_outputs = keys.to_vec();
        self
    }

    pub(crate) fn failing_apply(mut self) -> Self {
        self.fail_apply = true;
        self
    }

    pub(crate) fn failing_revert(mut self) -> Self {
        self.fail_revert = true;
        self
    }

    pub(crate) fn logged(mut self, log: &CallLog) -> Self {
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
impl Step for TestStep {
    fn unique_reference(&self) -> StepReference {
        StepReference::new(self.name)
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
