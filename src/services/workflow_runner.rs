//! Wave-based apply/revert execution of registered workflows.

use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Direction, KeyConfig, RunnerSettings, StepReference, WorkflowContext};
use crate::domain::ports::{Step, StepError};
use crate::services::workflow_registry::WorkflowRegistry;

/// Defaults for steps that do not set their own attempt policy.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Per-attempt timeout, `None` waits forever.
    pub default_step_timeout: Option<Duration>,
    /// Retries after the first failed attempt.
    pub default_retries: u32,
    /// Pause between attempts.
    pub wait_between_attempts: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            default_step_timeout: None,
            default_retries: 0,
            wait_between_attempts: Duration::from_secs(5),
        }
    }
}

impl From<&RunnerSettings> for RunnerConfig {
    fn from(settings: &RunnerSettings) -> Self {
        Self {
            default_step_timeout: settings.default_step_timeout_ms.map(Duration::from_millis),
            default_retries: settings.default_retries,
            wait_between_attempts: Duration::from_millis(settings.wait_between_attempts_ms),
        }
    }
}

/// Overall outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every wave applied.
    Succeeded,
    /// Apply stopped and every applied step was reverted.
    Reverted,
    /// Apply stopped and at least one revert failed.
    RevertIncomplete,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => f.write_str("succeeded"),
            Self::Reverted => f.write_str("reverted"),
            Self::RevertIncomplete => f.write_str("revert incomplete"),
        }
    }
}

/// A step whose `apply` failed after all attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    pub step: StepReference,
    pub error: String,
    pub attempts: u32,
}

/// How the revert of one applied step went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevertStatus {
    Reverted,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevertOutcome {
    pub step: StepReference,
    pub status: RevertStatus,
    pub attempts: u32,
}

impl RevertOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, RevertStatus::Failed(_))
    }
}

/// Event emitted during a run.
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    /// Run started.
    Started { workflow: String, wave_count: usize },
    /// Wave started.
    WaveStarted { wave_number: usize, step_count: usize },
    /// Step applied.
    StepApplied { step: StepReference, attempts: u32 },
    /// Step apply failed for good.
    StepFailed {
        step: StepReference,
        error: String,
        attempts: u32,
    },
    /// Wave completed.
    WaveCompleted {
        wave_number: usize,
        succeeded: usize,
        failed: usize,
    },
    /// Compensation started for the applied steps.
    RevertStarted { steps: usize },
    /// Step reverted.
    StepReverted { step: StepReference },
    /// Step revert failed, compensation continues.
    StepRevertFailed { step: StepReference, error: String },
    /// Run completed.
    Completed { status: RunStatus },
}

/// Result of a workflow run.
///
/// Step failures never surface as `Err`; they are recorded here together
/// with the outcome of the compensation they triggered.
#[derive(Debug, Clone, Default)]
pub struct RunResult {
    pub workflow: String,
    /// Initial context plus every applied step's outputs.
    pub context: WorkflowContext,
    /// Applied steps in completion order.
    pub applied: Vec<StepReference>,
    /// Steps whose apply failed. More than one only when siblings of the
    /// same wave failed together.
    pub failed_steps: Vec<StepFailure>,
    /// Whether the run stopped because it was cancelled.
    pub cancelled: bool,
    /// One entry per applied step, in revert order.
    pub revert_outcomes: Vec<RevertOutcome>,
    /// Outputs accumulated by successful reverts.
    pub revert_context: WorkflowContext,
}

impl RunResult {
    fn new(workflow: &str, context: WorkflowContext) -> Self {
        Self {
            workflow: workflow.to_string(),
            context,
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed_steps.is_empty() && !self.cancelled
    }

    /// First step that failed to apply.
    pub fn failed_step(&self) -> Option<&StepFailure> {
        self.failed_steps.first()
    }

    pub fn revert_failures(&self) -> Vec<&RevertOutcome> {
        self.revert_outcomes.iter().filter(|o| o.is_failed()).collect()
    }

    pub fn status(&self) -> RunStatus {
        if self.is_success() {
            RunStatus::Succeeded
        } else if self.revert_outcomes.iter().any(RevertOutcome::is_failed) {
            RunStatus::RevertIncomplete
        } else {
            RunStatus::Reverted
        }
    }

    pub fn summary(&self) -> String {
        match self.status() {
            RunStatus::Succeeded => format!("workflow '{}' succeeded", self.workflow),
            status => format!(
                "workflow '{}' failed, rollback attempted, rollback status: {status}",
                self.workflow
            ),
        }
    }
}

/// Effective attempt policy of one step in one direction.
#[derive(Debug, Clone, Copy)]
struct AttemptPolicy {
    timeout: Option<Duration>,
    retries: u32,
    wait: Duration,
}

impl AttemptPolicy {
    fn for_step(step: &dyn Step, direction: Direction, config: &RunnerConfig) -> Self {
        let (step_timeout, step_retries) = match direction {
            Direction::Apply => (step.apply_timeout(), step.apply_retries()),
            Direction::Revert => (step.revert_timeout(), step.revert_retries()),
        };
        Self {
            timeout: step_timeout.or(config.default_step_timeout),
            retries: step_retries.unwrap_or(config.default_retries),
            wait: step
                .wait_between_attempts()
                .unwrap_or(config.wait_between_attempts),
        }
    }
}

struct StepSuccess {
    outputs: WorkflowContext,
    attempts: u32,
}

struct StepAttemptError {
    message: String,
    attempts: u32,
}

/// Runs workflows from a set-up [`WorkflowRegistry`].
///
/// Waves run in order; the steps of a wave run concurrently on their own
/// tasks. When a step fails or the run is cancelled, no further wave starts,
/// the in-flight siblings finish, and every applied step is reverted one by
/// one in the reverse of the order it completed.
pub struct WorkflowRunner {
    registry: Arc<WorkflowRegistry>,
    config: RunnerConfig,
}

impl WorkflowRunner {
    pub fn new(registry: Arc<WorkflowRegistry>, config: RunnerConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &Arc<WorkflowRegistry> {
        &self.registry
    }

    /// Run a workflow to completion.
    pub async fn run(
        &self,
        workflow: &str,
        initial_context: WorkflowContext,
    ) -> DomainResult<RunResult> {
        let (tx, _rx) = mpsc::channel(100);
        self.execute(workflow, initial_context, CancellationToken::new(), tx)
            .await
    }

    /// Run a workflow, streaming progress events.
    ///
    /// Events are dropped when the channel is full.
    pub async fn run_with_events(
        &self,
        workflow: &str,
        initial_context: WorkflowContext,
        event_tx: mpsc::Sender<ExecutionEvent>,
    ) -> DomainResult<RunResult> {
        self.execute(workflow, initial_context, CancellationToken::new(), event_tx)
            .await
    }

    /// Run a workflow that can be cancelled.
    ///
    /// The token is checked between waves. Once cancelled, the current wave
    /// finishes and everything applied so far is reverted.
    pub async fn run_with_cancellation(
        &self,
        workflow: &str,
        initial_context: WorkflowContext,
        cancel: CancellationToken,
    ) -> DomainResult<RunResult> {
        let (tx, _rx) = mpsc::channel(100);
        self.execute(workflow, initial_context, cancel, tx).await
    }

    /// Run a workflow with both cancellation and event streaming.
    ///
    /// Returns `Err` only for caller mistakes: unknown workflow, registry not
    /// set up, or a missing initial context key.
    pub async fn execute(
        &self,
        workflow: &str,
        initial_context: WorkflowContext,
        cancel: CancellationToken,
        event_tx: mpsc::Sender<ExecutionEvent>,
    ) -> DomainResult<RunResult> {
        let sequence = self.registry.get_workflow_steps_sequence(workflow)?;
        let definition = self.registry.get_workflow(workflow)?;

        let mut initial_keys: Vec<&KeyConfig> = definition.initial_context.iter().collect();
        initial_keys.sort_by(|a, b| a.name.cmp(&b.name));
        if let Some(key) = initial_keys
            .into_iter()
            .find(|key| !initial_context.contains_key(&key.name))
        {
            return Err(DomainError::MissingInitialContextKey {
                workflow: workflow.to_string(),
                key: key.name.clone(),
            });
        }

        let mut result = RunResult::new(workflow, initial_context);

        tracing::info!(workflow, waves = sequence.len(), "workflow started");
        emit(
            &event_tx,
            ExecutionEvent::Started {
                workflow: workflow.to_string(),
                wave_count: sequence.len(),
            },
        );

        for (wave_idx, wave) in sequence.iter().enumerate() {
            if cancel.is_cancelled() {
                result.cancelled = true;
                break;
            }

            emit(
                &event_tx,
                ExecutionEvent::WaveStarted {
                    wave_number: wave_idx + 1,
                    step_count: wave.len(),
                },
            );

            let mut pending = FuturesUnordered::new();
            for reference in wave {
                let step = self.registry.get_base_step(reference)?;
                let policy = AttemptPolicy::for_step(step.as_ref(), Direction::Apply, &self.config);
                let inputs = resolve_inputs(
                    &step.apply_requests_inputs(),
                    &result.context,
                    Direction::Apply,
                );

                let handle = tokio::spawn(async move {
                    match inputs {
                        Ok(inputs) => run_step(step, Direction::Apply, inputs, policy).await,
                        Err(message) => Err(StepAttemptError {
                            message,
                            attempts: 0,
                        }),
                    }
                });
                let reference = reference.clone();
                pending.push(async move { (reference, handle.await) });
            }

            let mut wave_succeeded = 0;
            let mut wave_failed = 0;

            while let Some((reference, joined)) = pending.next().await {
                let outcome = joined.unwrap_or_else(|err| {
                    Err(StepAttemptError {
                        message: format!("step task aborted: {err}"),
                        attempts: 1,
                    })
                });

                match outcome {
                    Ok(StepSuccess { outputs, attempts }) => {
                        tracing::debug!(workflow, step = %reference, attempts, "step applied");
                        result.context.extend(outputs);
                        result.applied.push(reference.clone());
                        wave_succeeded += 1;
                        emit(
                            &event_tx,
                            ExecutionEvent::StepApplied {
                                step: reference,
                                attempts,
                            },
                        );
                    }
                    Err(StepAttemptError { message, attempts }) => {
                        tracing::warn!(
                            workflow,
                            step = %reference,
                            attempts,
                            error = %message,
                            "step apply failed"
                        );
                        wave_failed += 1;
                        emit(
                            &event_tx,
                            ExecutionEvent::StepFailed {
                                step: reference.clone(),
                                error: message.clone(),
                                attempts,
                            },
                        );
                        result.failed_steps.push(StepFailure {
                            step: reference,
                            error: message,
                            attempts,
                        });
                    }
                }
            }

            emit(
                &event_tx,
                ExecutionEvent::WaveCompleted {
                    wave_number: wave_idx + 1,
                    succeeded: wave_succeeded,
                    failed: wave_failed,
                },
            );

            if wave_failed > 0 {
                break;
            }
        }

        if result.failed_steps.is_empty() && !result.cancelled && cancel.is_cancelled() {
            result.cancelled = true;
        }
        if result.cancelled {
            tracing::warn!(workflow, applied = result.applied.len(), "workflow cancelled");
        }

        if !result.is_success() {
            self.revert(&mut result, &event_tx).await;
        }

        let status = result.status();
        if status == RunStatus::Succeeded {
            tracing::info!(workflow, steps = result.applied.len(), "workflow succeeded");
        } else {
            tracing::warn!(workflow, status = %status, "{}", result.summary());
        }
        emit(&event_tx, ExecutionEvent::Completed { status });

        Ok(result)
    }

    /// Revert applied steps in reverse completion order, collecting every
    /// outcome. A failed revert does not stop the others.
    async fn revert(&self, result: &mut RunResult, event_tx: &mpsc::Sender<ExecutionEvent>) {
        emit(
            event_tx,
            ExecutionEvent::RevertStarted {
                steps: result.applied.len(),
            },
        );

        let applied = result.applied.clone();
        for reference in applied.iter().rev() {
            let outcome = match self.registry.get_base_step(reference) {
                Ok(step) => {
                    let policy =
                        AttemptPolicy::for_step(step.as_ref(), Direction::Revert, &self.config);
                    let (inputs, unproduced) =
                        available_inputs(&step.revert_requests_inputs(), &result.revert_context);
                    if !unproduced.is_empty() {
                        // Producers were never applied, so they were not reverted.
                        tracing::warn!(
                            workflow = %result.workflow,
                            step = %reference,
                            keys = ?unproduced,
                            "reverting without inputs whose producing steps were not applied"
                        );
                    }
                    tokio::spawn(run_step(step, Direction::Revert, inputs, policy))
                        .await
                        .unwrap_or_else(|err| {
                            Err(StepAttemptError {
                                message: format!("step task aborted: {err}"),
                                attempts: 1,
                            })
                        })
                }
                Err(err) => Err(StepAttemptError {
                    message: err.to_string(),
                    attempts: 0,
                }),
            };

            match outcome {
                Ok(StepSuccess { outputs, attempts }) => {
                    tracing::debug!(workflow = %result.workflow, step = %reference, "step reverted");
                    result.revert_context.extend(outputs);
                    result.revert_outcomes.push(RevertOutcome {
                        step: reference.clone(),
                        status: RevertStatus::Reverted,
                        attempts,
                    });
                    emit(
                        event_tx,
                        ExecutionEvent::StepReverted {
                            step: reference.clone(),
                        },
                    );
                }
                Err(StepAttemptError { message, attempts }) => {
                    tracing::error!(
                        workflow = %result.workflow,
                        step = %reference,
                        error = %message,
                        "step revert failed"
                    );
                    emit(
                        event_tx,
                        ExecutionEvent::StepRevertFailed {
                            step: reference.clone(),
                            error: message.clone(),
                        },
                    );
                    result.revert_outcomes.push(RevertOutcome {
                        step: reference.clone(),
                        status: RevertStatus::Failed(message),
                        attempts,
                    });
                }
            }
        }
    }
}

fn emit(event_tx: &mpsc::Sender<ExecutionEvent>, event: ExecutionEvent) {
    let _ = event_tx.try_send(event);
}

/// Pick the declared inputs out of the context.
fn resolve_inputs(
    requested: &HashSet<KeyConfig>,
    context: &WorkflowContext,
    direction: Direction,
) -> Result<WorkflowContext, String> {
    let mut inputs = WorkflowContext::new();
    for key in requested {
        match context.get(&key.name) {
            Some(value) => {
                inputs.insert(key.name.clone(), value.clone());
            }
            None if key.is_required() => {
                return Err(format!(
                    "workflow misconfigured: required key '{}' missing from the {direction} sequence_context",
                    key.name
                ));
            }
            None => {}
        }
    }
    Ok(inputs)
}

/// Pick whatever declared revert inputs are present, also returning the
/// required ones that are not.
///
/// A partial run only reverts the steps it applied, so a required revert
/// input can be missing when its producer never ran.
fn available_inputs(
    requested: &HashSet<KeyConfig>,
    context: &WorkflowContext,
) -> (WorkflowContext, Vec<String>) {
    let mut inputs = WorkflowContext::new();
    let mut unproduced = Vec::new();
    for key in requested {
        match context.get(&key.name) {
            Some(value) => {
                inputs.insert(key.name.clone(), value.clone());
            }
            None if key.is_required() => unproduced.push(key.name.clone()),
            None => {}
        }
    }
    unproduced.sort();
    (inputs, unproduced)
}

/// Keep the declared outputs, failing if a required one is missing.
fn keep_declared_outputs(
    step: &dyn Step,
    direction: Direction,
    mut outputs: WorkflowContext,
) -> Result<WorkflowContext, String> {
    let declared = match direction {
        Direction::Apply => step.apply_provides_outputs(),
        Direction::Revert => step.revert_provides_outputs(),
    };

    let mut kept = WorkflowContext::new();
    let mut missing = Vec::new();
    for key in &declared {
        match outputs.remove(&key.name) {
            Some(value) => {
                kept.insert(key.name.clone(), value);
            }
            None if key.is_required() => missing.push(key.name.clone()),
            None => {}
        }
    }

    if !outputs.is_empty() {
        tracing::debug!(
            step = %step.unique_reference(),
            dropped = outputs.len(),
            "undeclared outputs dropped"
        );
    }

    if missing.is_empty() {
        Ok(kept)
    } else {
        missing.sort();
        Err(format!(
            "{direction} did not provide required outputs: {}",
            missing.join(", ")
        ))
    }
}

/// Execute one step with retry logic and timeout.
async fn run_step(
    step: Arc<dyn Step>,
    direction: Direction,
    inputs: WorkflowContext,
    policy: AttemptPolicy,
) -> Result<StepSuccess, StepAttemptError> {
    let max_attempts = policy.retries + 1;
    let mut last_error = String::new();

    for attempt in 1..=max_attempts {
        if attempt > 1 {
            tokio::time::sleep(policy.wait).await;
        }

        let call = async {
            match direction {
                Direction::Apply => step.apply(inputs.clone()).await,
                Direction::Revert => step.revert(inputs.clone()).await,
            }
        };

        let outcome = match policy.timeout {
            Some(limit) => match timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => Err(StepError::new(format!(
                    "timed out after {}ms",
                    limit.as_millis()
                ))),
            },
            None => call.await,
        };

        match outcome
            .map_err(|err| err.message)
            .and_then(|outputs| keep_declared_outputs(step.as_ref(), direction, outputs))
        {
            Ok(outputs) => {
                return Ok(StepSuccess {
                    outputs,
                    attempts: attempt,
                })
            }
            Err(message) => {
                if attempt < max_attempts {
                    tracing::warn!(
                        step = %step.unique_reference(),
                        direction = %direction,
                        attempt,
                        max_attempts,
                        error = %message,
                        "step attempt failed, retrying"
                    );
                }
                last_error = message;
            }
        }
    }

    Err(StepAttemptError {
        message: last_error,
        attempts: max_attempts,
    })
}
