//! Workflow Interpreter (spec §4.6): validates graphs, runs them with
//! timeouts/retries/compensation, and exposes pause/resume/cancel.
//!
//! `WorkflowExecution` is owned exclusively by the interpreter task
//! driving it (spec §5 single-writer invariant); callers only ever see
//! clones returned by [`Interpreter::status`]/[`Interpreter::history`].

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::{json, Value};
use tokio::sync::Mutex as TokioMutex;

use crate::config::WorkflowConfig;
use crate::events::{Event, EventSink};
use crate::id::{ExecutionId, StepId, WorkflowId};
use crate::{CoreError, Result};

use super::executors::{self, ActionFn, ActionRegistry, StepRunner, WorkflowRunner};
use super::types::{
    ExecutionStatus, HistoryEntry, OnErrorPolicy, Step, StepConfig, StepStatus, Workflow,
    WorkflowExecution,
};
use super::validate;

const CONTROL_RUN: u8 = 0;
const CONTROL_PAUSE: u8 = 1;
const CONTROL_CANCEL: u8 = 2;

enum StepLifecycleOutcome {
    Advanced,
    Aborted { message: String },
}

struct InterpreterInner {
    workflows: DashMap<WorkflowId, Workflow>,
    executions: DashMap<ExecutionId, Arc<TokioMutex<WorkflowExecution>>>,
    active_by_workflow: DashMap<WorkflowId, ExecutionId>,
    control: DashMap<ExecutionId, Arc<AtomicU8>>,
    actions: ActionRegistry,
    sink: Arc<dyn EventSink>,
    default_max_retries: u32,
    retry_delay: StdDuration,
}

/// Drives workflow executions. Cheaply `Clone` (an `Arc` wrapper) so it
/// can be handed to step executors as a [`StepRunner`]/[`WorkflowRunner`]
/// callback for recursive/sub-workflow steps.
#[derive(Clone)]
pub struct Interpreter {
    inner: Arc<InterpreterInner>,
}

impl Interpreter {
    pub fn new(sink: Arc<dyn EventSink>, config: &WorkflowConfig) -> Self {
        Self {
            inner: Arc::new(InterpreterInner {
                workflows: DashMap::new(),
                executions: DashMap::new(),
                active_by_workflow: DashMap::new(),
                control: DashMap::new(),
                actions: ActionRegistry::new(),
                sink,
                default_max_retries: config.max_retries,
                retry_delay: config.retry_delay,
            }),
        }
    }

    /// Registers a caller-provided function an `action` step can name
    /// (spec §4.5; overrides the `log`/`set-variable`/`http-request`
    /// built-ins of the same name).
    pub fn register_action(&self, name: impl Into<String>, f: ActionFn) {
        self.inner.actions.register(name, f);
    }

    pub fn register_workflow(&self, workflow: Workflow) -> Result<ValidationOutcome> {
        let result = validate::validate(&workflow);
        if !result.valid {
            return Err(CoreError::WorkflowInvalid {
                workflow: workflow.id,
                errors: result.errors,
            });
        }
        let id = workflow.id;
        self.inner.workflows.insert(id, workflow);
        self.inner.sink.publish(Event::WorkflowCreated { workflow: id });
        Ok(ValidationOutcome { warnings: result.warnings })
    }

    pub fn status(&self, execution: ExecutionId) -> Option<WorkflowExecution> {
        self.inner
            .executions
            .get(&execution)
            .and_then(|e| e.try_lock().ok().map(|g| g.clone()))
    }

    pub async fn status_async(&self, execution: ExecutionId) -> Option<WorkflowExecution> {
        if let Some(entry) = self.inner.executions.get(&execution) {
            let guard = entry.lock().await;
            Some(guard.clone())
        } else {
            None
        }
    }

    pub async fn history(&self, execution: ExecutionId, limit: Option<usize>) -> Option<Vec<HistoryEntry>> {
        let snapshot = self.status_async(execution).await?;
        Some(match limit {
            Some(n) => snapshot.history.into_iter().rev().take(n).rev().collect(),
            None => snapshot.history,
        })
    }

    /// Runs `workflow` to completion, or until paused/cancelled by a
    /// concurrent call. A second `execute()` on a workflow already
    /// running or paused fails with `WorkflowBusy`.
    pub async fn execute(&self, workflow_id: WorkflowId, variables: HashMap<String, Value>) -> Result<ExecutionId> {
        if self.inner.active_by_workflow.contains_key(&workflow_id) {
            return Err(CoreError::WorkflowBusy { workflow: workflow_id });
        }

        let workflow = self
            .inner
            .workflows
            .get(&workflow_id)
            .ok_or(CoreError::WorkflowNotFound(workflow_id))?
            .clone();

        let execution_id = ExecutionId::generate();
        let mut execution = WorkflowExecution::new(execution_id, workflow_id, variables);
        execution.status = ExecutionStatus::Running;
        execution.started_at = Some(Utc::now());

        let execution = Arc::new(TokioMutex::new(execution));
        self.inner.executions.insert(execution_id, execution.clone());
        self.inner.active_by_workflow.insert(workflow_id, execution_id);
        self.inner.control.insert(execution_id, Arc::new(AtomicU8::new(CONTROL_RUN)));

        self.inner.sink.publish(Event::WorkflowStart {
            workflow: workflow_id,
            execution: execution_id,
        });

        self.drive(&workflow, execution_id, &execution).await?;
        Ok(execution_id)
    }

    /// Stops launching new steps once the currently running one
    /// finishes; the execution status becomes `paused`.
    pub fn pause(&self, execution: ExecutionId) -> Result<()> {
        let control = self
            .inner
            .control
            .get(&execution)
            .ok_or(CoreError::ExecutionNotFound(execution))?;
        control.store(CONTROL_PAUSE, Ordering::SeqCst);
        Ok(())
    }

    /// Resumes a paused execution from its recorded current step.
    pub async fn resume(&self, execution_id: ExecutionId) -> Result<()> {
        let execution = self
            .inner
            .executions
            .get(&execution_id)
            .ok_or(CoreError::ExecutionNotFound(execution_id))?
            .clone();

        let workflow_id = {
            let mut guard = execution.lock().await;
            if guard.status != ExecutionStatus::Paused {
                return Err(CoreError::ExecutionNotPaused(execution_id));
            }
            guard.status = ExecutionStatus::Running;
            guard.workflow
        };

        let workflow = self
            .inner
            .workflows
            .get(&workflow_id)
            .ok_or(CoreError::WorkflowNotFound(workflow_id))?
            .clone();

        self.inner
            .control
            .entry(execution_id)
            .or_insert_with(|| Arc::new(AtomicU8::new(CONTROL_RUN)))
            .store(CONTROL_RUN, Ordering::SeqCst);
        self.inner.active_by_workflow.insert(workflow_id, execution_id);

        self.inner.sink.publish(Event::WorkflowResume {
            workflow: workflow_id,
            execution: execution_id,
        });

        self.drive(&workflow, execution_id, &execution).await
    }

    /// Advisory cancel (spec §5): in-flight step finishes, then the
    /// execution transitions to `cancelled` and later steps are dropped.
    pub fn cancel(&self, execution: ExecutionId) -> Result<()> {
        let control = self
            .inner
            .control
            .get(&execution)
            .ok_or(CoreError::ExecutionNotFound(execution))?;
        control.store(CONTROL_CANCEL, Ordering::SeqCst);
        Ok(())
    }

    async fn drive(
        &self,
        workflow: &Workflow,
        execution_id: ExecutionId,
        execution: &Arc<TokioMutex<WorkflowExecution>>,
    ) -> Result<()> {
        let scope = Arc::new(ExecutionScope {
            interpreter: self.clone(),
            workflow: workflow.clone(),
            execution: execution.clone(),
        });
        let control = self
            .inner
            .control
            .get(&execution_id)
            .map(|c| c.clone())
            .unwrap_or_else(|| Arc::new(AtomicU8::new(CONTROL_RUN)));
        let owned = owned_sub_steps(workflow);

        for step in &workflow.steps {
            if owned.contains(&step.id) {
                continue;
            }

            match control.load(Ordering::SeqCst) {
                CONTROL_PAUSE => {
                    let mut guard = execution.lock().await;
                    guard.status = ExecutionStatus::Paused;
                    self.inner.sink.publish(Event::WorkflowPause {
                        workflow: workflow.id,
                        execution: execution_id,
                    });
                    return Ok(());
                }
                CONTROL_CANCEL => {
                    let mut guard = execution.lock().await;
                    guard.status = ExecutionStatus::Cancelled;
                    guard.ended_at = Some(Utc::now());
                    self.inner.active_by_workflow.remove(&workflow.id);
                    self.inner.sink.publish(Event::WorkflowCancelled {
                        workflow: workflow.id,
                        execution: execution_id,
                    });
                    return Ok(());
                }
                _ => {}
            }

            let already_done = {
                let guard = execution.lock().await;
                guard.step_status(step.id)
            };
            if already_done.is_some() {
                continue;
            }

            let deps_satisfied = {
                let guard = execution.lock().await;
                step.dependencies
                    .iter()
                    .all(|dep| guard.step_status(*dep) == Some(StepStatus::Completed))
            };
            if !deps_satisfied {
                let mut guard = execution.lock().await;
                guard.history.push(HistoryEntry {
                    step: step.id,
                    status: StepStatus::Skipped,
                    timestamp: Utc::now(),
                    duration_ms: None,
                    result: None,
                    error: None,
                });
                self.inner.sink.publish(Event::StepSkipped {
                    execution: execution_id,
                    step: step.id,
                });
                continue;
            }

            let context_snapshot = execution.lock().await.context.clone();
            let outcome = self
                .run_step_with_policy(&scope, workflow, execution_id, execution, step, context_snapshot)
                .await;

            if let StepConfig::Condition { true_path, false_path, .. } = &step.config {
                self.skip_unchosen_branch(execution, execution_id, step.id, *true_path, *false_path).await;
            }

            if let StepLifecycleOutcome::Aborted { message } = outcome {
                let mut guard = execution.lock().await;
                guard.status = ExecutionStatus::Failed;
                guard.ended_at = Some(Utc::now());
                self.inner.active_by_workflow.remove(&workflow.id);
                drop(guard);
                self.inner.sink.publish(Event::WorkflowError {
                    workflow: workflow.id,
                    execution: execution_id,
                    message,
                });
                if workflow.error_handling == OnErrorPolicy::Compensate {
                    self.run_compensation_pass(&scope, workflow, execution_id, execution).await;
                }
                return Ok(());
            }
        }

        let mut guard = execution.lock().await;
        guard.status = ExecutionStatus::Completed;
        guard.ended_at = Some(Utc::now());
        self.inner.active_by_workflow.remove(&workflow.id);
        self.inner.sink.publish(Event::WorkflowComplete {
            workflow: workflow.id,
            execution: execution_id,
        });
        Ok(())
    }

    /// After a condition step runs, the branch it didn't choose is
    /// marked skipped directly rather than waiting for the declared-
    /// order loop to find an unsatisfied dependency on it.
    async fn skip_unchosen_branch(
        &self,
        execution: &Arc<TokioMutex<WorkflowExecution>>,
        execution_id: ExecutionId,
        condition_step: StepId,
        true_path: Option<StepId>,
        false_path: Option<StepId>,
    ) {
        let mut guard = execution.lock().await;
        let chosen = guard
            .history
            .iter()
            .rev()
            .find(|e| e.step == condition_step)
            .and_then(|e| e.result.as_ref())
            .and_then(|v| v.get("nextStep"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        for candidate in [true_path, false_path].into_iter().flatten() {
            if Some(candidate.to_string()) == chosen {
                continue;
            }
            if guard.step_status(candidate).is_none() {
                guard.history.push(HistoryEntry {
                    step: candidate,
                    status: StepStatus::Skipped,
                    timestamp: Utc::now(),
                    duration_ms: None,
                    result: None,
                    error: None,
                });
                drop(guard);
                self.inner.sink.publish(Event::StepSkipped {
                    execution: execution_id,
                    step: candidate,
                });
                return;
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_step_with_policy(
        &self,
        scope: &Arc<ExecutionScope>,
        workflow: &Workflow,
        execution_id: ExecutionId,
        execution: &Arc<TokioMutex<WorkflowExecution>>,
        step: &Step,
        mut context: HashMap<String, Value>,
    ) -> StepLifecycleOutcome {
        let max_retries = step.max_retries.unwrap_or(self.inner.default_max_retries);
        let mut attempt = 0u32;

        loop {
            {
                let mut guard = execution.lock().await;
                guard.current_step = Some(step.id);
            }
            self.inner.sink.publish(Event::StepStart {
                execution: execution_id,
                step: step.id,
            });

            let started = Utc::now();
            let outcome = match step.timeout_ms {
                Some(ms) => {
                    match tokio::time::timeout(StdDuration::from_millis(ms), self.run_step_once(scope, step, &context)).await {
                        Ok(result) => result,
                        Err(_) => Err(CoreError::timeout(ms)),
                    }
                }
                None => self.run_step_once(scope, step, &context).await,
            };
            let duration_ms = (Utc::now() - started).num_milliseconds().max(0) as u64;

            match outcome {
                Ok(value) => {
                    let mut guard = execution.lock().await;
                    guard.context.insert(step.id.to_string(), value.clone());
                    guard.history.push(HistoryEntry {
                        step: step.id,
                        status: StepStatus::Completed,
                        timestamp: started,
                        duration_ms: Some(duration_ms),
                        result: Some(value),
                        error: None,
                    });
                    drop(guard);
                    self.inner.sink.publish(Event::StepComplete {
                        execution: execution_id,
                        step: step.id,
                        duration_ms,
                    });
                    return StepLifecycleOutcome::Advanced;
                }
                Err(error) => {
                    let message = error.to_string();
                    match step.on_error {
                        OnErrorPolicy::Retry if max_retries > 0 && attempt < max_retries => {
                            attempt += 1;
                            self.inner.sink.publish(Event::StepRetry {
                                execution: execution_id,
                                step: step.id,
                                attempt,
                            });
                            tokio::time::sleep(self.inner.retry_delay * attempt).await;
                            continue;
                        }
                        OnErrorPolicy::Continue => {
                            context.insert(step.id.to_string(), json!({ "error": message }));
                            let mut guard = execution.lock().await;
                            guard.context.insert(step.id.to_string(), json!({ "error": message.clone() }));
                            guard.history.push(HistoryEntry {
                                step: step.id,
                                status: StepStatus::Failed,
                                timestamp: started,
                                duration_ms: Some(duration_ms),
                                result: None,
                                error: Some(message.clone()),
                            });
                            drop(guard);
                            self.inner.sink.publish(Event::StepError {
                                execution: execution_id,
                                step: step.id,
                                message,
                            });
                            return StepLifecycleOutcome::Advanced;
                        }
                        OnErrorPolicy::Compensate => {
                            let mut guard = execution.lock().await;
                            guard.history.push(HistoryEntry {
                                step: step.id,
                                status: StepStatus::Failed,
                                timestamp: started,
                                duration_ms: Some(duration_ms),
                                result: None,
                                error: Some(message.clone()),
                            });
                            drop(guard);
                            self.inner.sink.publish(Event::StepError {
                                execution: execution_id,
                                step: step.id,
                                message: message.clone(),
                            });
                            if let Some(comp_id) = step.compensation_step {
                                self.inner.sink.publish(Event::WorkflowCompensationStep {
                                    workflow: workflow.id,
                                    step: comp_id,
                                });
                                if let Some(comp_step) = workflow.step(comp_id) {
                                    let snapshot = execution.lock().await.context.clone();
                                    if let Err(e) = self.run_step_once(scope, comp_step, &snapshot).await {
                                        self.inner.sink.publish(Event::WorkflowCompensationError {
                                            workflow: workflow.id,
                                            step: comp_id,
                                            message: e.to_string(),
                                        });
                                    }
                                }
                            }
                            return StepLifecycleOutcome::Aborted { message };
                        }
                        OnErrorPolicy::Stop | OnErrorPolicy::Retry => {
                            let mut guard = execution.lock().await;
                            guard.history.push(HistoryEntry {
                                step: step.id,
                                status: StepStatus::Failed,
                                timestamp: started,
                                duration_ms: Some(duration_ms),
                                result: None,
                                error: Some(message.clone()),
                            });
                            drop(guard);
                            self.inner.sink.publish(Event::StepError {
                                execution: execution_id,
                                step: step.id,
                                message: message.clone(),
                            });
                            return StepLifecycleOutcome::Aborted { message };
                        }
                    }
                }
            }
        }
    }

    /// Reverse-declaration-order compensation pass over already-
    /// completed steps (spec §4.6). Compensation failures are recorded
    /// but do not reabort the workflow.
    async fn run_compensation_pass(
        &self,
        scope: &Arc<ExecutionScope>,
        workflow: &Workflow,
        execution_id: ExecutionId,
        execution: &Arc<TokioMutex<WorkflowExecution>>,
    ) {
        self.inner.sink.publish(Event::WorkflowCompensationStart {
            workflow: workflow.id,
            execution: execution_id,
        });

        let completed: Vec<StepId> = {
            let guard = execution.lock().await;
            workflow
                .steps
                .iter()
                .filter(|s| guard.step_status(s.id) == Some(StepStatus::Completed))
                .map(|s| s.id)
                .collect()
        };

        for step in workflow.steps.iter().rev() {
            if !completed.contains(&step.id) {
                continue;
            }
            if let Some(comp_id) = step.compensation_step {
                self.inner.sink.publish(Event::WorkflowCompensationStep {
                    workflow: workflow.id,
                    step: comp_id,
                });
                if let Some(comp_step) = workflow.step(comp_id) {
                    let snapshot = execution.lock().await.context.clone();
                    if let Err(e) = self.run_step_once(scope, comp_step, &snapshot).await {
                        self.inner.sink.publish(Event::WorkflowCompensationError {
                            workflow: workflow.id,
                            step: comp_id,
                            message: e.to_string(),
                        });
                    }
                }
            }
        }

        self.inner.sink.publish(Event::WorkflowCompensationComplete {
            workflow: workflow.id,
            execution: execution_id,
        });
    }

    async fn run_step_once(&self, scope: &Arc<ExecutionScope>, step: &Step, context: &HashMap<String, Value>) -> Result<Value> {
        match &step.config {
            StepConfig::Action { function, args } => self.inner.actions.invoke(function, args, context),
            StepConfig::Condition { expression, true_path, false_path } => {
                let outcome = executors::condition::evaluate(expression, *true_path, *false_path, context)?;
                Ok(json!({
                    "result": outcome.result,
                    "nextStep": outcome.next_step.map(|s| s.to_string()),
                }))
            }
            StepConfig::Parallel { sub_steps, max_concurrency } => {
                let runner: Arc<dyn StepRunner> = scope.clone();
                executors::parallel::run(sub_steps, *max_concurrency, context, &runner).await
            }
            StepConfig::Sequential { sub_steps } => {
                let runner: Arc<dyn StepRunner> = scope.clone();
                executors::sequential::run(sub_steps, context, &runner).await
            }
            StepConfig::Loop { collection_path, item_var, index_var, body } => {
                let runner: Arc<dyn StepRunner> = scope.clone();
                executors::loop_step::run(collection_path, item_var, index_var, *body, context, &runner).await
            }
            StepConfig::Wait { duration_ms, until } => Ok(executors::wait::wait_for(*duration_ms, *until).await),
            StepConfig::SubWorkflow { workflow, input_mapping, output_mapping } => {
                let runner: Arc<dyn WorkflowRunner> = scope.clone();
                executors::sub_workflow::run(*workflow, input_mapping, output_mapping, context, &runner).await
            }
        }
    }
}

pub struct ValidationOutcome {
    pub warnings: Vec<String>,
}

/// Binds an [`Interpreter`] to one workflow/execution pair so nested
/// step executors (parallel/sequential/loop/sub-workflow) can recurse
/// without the public [`StepRunner`]/[`WorkflowRunner`] traits needing
/// to carry execution identity.
struct ExecutionScope {
    interpreter: Interpreter,
    workflow: Workflow,
    execution: Arc<TokioMutex<WorkflowExecution>>,
}

#[async_trait]
impl StepRunner for ExecutionScope {
    async fn run_step(&self, step_id: StepId, context: HashMap<String, Value>) -> Result<Value> {
        let step = self
            .workflow
            .step(step_id)
            .ok_or_else(|| CoreError::StepInvalid { step: step_id, reason: "unknown sub-step".to_string() })?;

        let nested = Arc::new(ExecutionScope {
            interpreter: self.interpreter.clone(),
            workflow: self.workflow.clone(),
            execution: self.execution.clone(),
        });

        let started = Utc::now();
        let result = self.interpreter.run_step_once(&nested, step, &context).await;
        let duration_ms = (Utc::now() - started).num_milliseconds().max(0) as u64;

        let mut guard = self.execution.lock().await;
        match &result {
            Ok(value) => guard.history.push(HistoryEntry {
                step: step_id,
                status: StepStatus::Completed,
                timestamp: started,
                duration_ms: Some(duration_ms),
                result: Some(value.clone()),
                error: None,
            }),
            Err(e) => guard.history.push(HistoryEntry {
                step: step_id,
                status: StepStatus::Failed,
                timestamp: started,
                duration_ms: Some(duration_ms),
                result: None,
                error: Some(e.to_string()),
            }),
        }
        result
    }
}

#[async_trait]
impl WorkflowRunner for ExecutionScope {
    async fn run_workflow(&self, workflow: WorkflowId, context: HashMap<String, Value>) -> Result<HashMap<String, Value>> {
        let execution_id = self.interpreter.execute(workflow, context).await?;
        let snapshot = self
            .interpreter
            .status_async(execution_id)
            .await
            .ok_or(CoreError::WorkflowNotFound(workflow))?;
        Ok(snapshot.context)
    }
}

/// Steps reachable only by recursion through a structural parent
/// (`parallel`/`sequential` sub-steps, a `loop` body) must stay out of
/// the top-level declared-order loop — it would otherwise run them a
/// second time as independent entries. Condition branches are exempt:
/// they remain ordinary top-level steps that the loop reaches in turn,
/// with the non-chosen one marked skipped by [`Interpreter::skip_unchosen_branch`].
fn owned_sub_steps(workflow: &Workflow) -> HashSet<StepId> {
    let mut owned = HashSet::new();
    for step in &workflow.steps {
        match &step.config {
            StepConfig::Parallel { sub_steps, .. } | StepConfig::Sequential { sub_steps } => {
                owned.extend(sub_steps.iter().copied());
            }
            StepConfig::Loop { body, .. } => {
                owned.insert(*body);
            }
            _ => {}
        }
    }
    owned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingEventSink;
    use crate::id::StepId;
    use serde_json::json;
    use std::sync::atomic::AtomicU32;

    fn workflow_with(steps: Vec<Step>) -> Workflow {
        Workflow {
            id: WorkflowId::generate(),
            name: "test".to_string(),
            steps,
            variables: HashMap::new(),
            error_handling: OnErrorPolicy::Stop,
        }
    }

    fn action(id: StepId, function: &str, on_error: OnErrorPolicy, max_retries: Option<u32>) -> Step {
        Step {
            id,
            name: function.to_string(),
            config: StepConfig::Action { function: function.to_string(), args: Value::Null },
            dependencies: vec![],
            max_retries,
            timeout_ms: None,
            on_error,
            compensation_step: None,
        }
    }

    #[tokio::test]
    async fn simple_workflow_completes() {
        let sink = Arc::new(RecordingEventSink::new());
        let interpreter = Interpreter::new(sink.clone(), &WorkflowConfig::default());

        let s1 = StepId::generate();
        let workflow = workflow_with(vec![action(s1, "log", OnErrorPolicy::Stop, None)]);
        let workflow_id = workflow.id;
        interpreter.register_workflow(workflow).unwrap();

        let execution_id = interpreter.execute(workflow_id, HashMap::new()).await.unwrap();
        let snapshot = interpreter.status_async(execution_id).await.unwrap();
        assert_eq!(snapshot.status, ExecutionStatus::Completed);
        assert!(sink.names().contains(&"workflow:complete"));
    }

    #[tokio::test]
    async fn second_execute_while_running_is_busy() {
        let sink = Arc::new(RecordingEventSink::new());
        let interpreter = Interpreter::new(sink, &WorkflowConfig::default());
        let s1 = StepId::generate();
        let workflow = workflow_with(vec![Step {
            id: s1,
            name: "wait".to_string(),
            config: StepConfig::Wait { duration_ms: Some(50), until: None },
            dependencies: vec![],
            max_retries: None,
            timeout_ms: None,
            on_error: OnErrorPolicy::Stop,
            compensation_step: None,
        }]);
        let workflow_id = workflow.id;
        interpreter.register_workflow(workflow).unwrap();

        let interpreter2 = interpreter.clone();
        let handle = tokio::spawn(async move { interpreter2.execute(workflow_id, HashMap::new()).await });
        tokio::time::sleep(StdDuration::from_millis(5)).await;
        let err = interpreter.execute(workflow_id, HashMap::new()).await.unwrap_err();
        assert!(matches!(err, CoreError::WorkflowBusy { .. }));
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn retry_then_succeed_matches_literal_scenario() {
        let sink = Arc::new(RecordingEventSink::new());
        let interpreter = Interpreter::new(sink.clone(), &WorkflowConfig::default());

        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();
        interpreter.register_action(
            "flaky",
            Arc::new(move |_args, _ctx| {
                let n = attempts_clone.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(CoreError::timeout(10))
                } else {
                    Ok(json!("ok"))
                }
            }),
        );

        let s1 = StepId::generate();
        let workflow = workflow_with(vec![action(s1, "flaky", OnErrorPolicy::Retry, Some(3))]);
        let workflow_id = workflow.id;
        interpreter.register_workflow(workflow).unwrap();

        let execution_id = interpreter.execute(workflow_id, HashMap::new()).await.unwrap();
        let snapshot = interpreter.status_async(execution_id).await.unwrap();
        assert_eq!(snapshot.status, ExecutionStatus::Completed);
        assert_eq!(snapshot.step_status(s1), Some(StepStatus::Completed));

        let retry_count = sink.names().iter().filter(|n| **n == "step:retry").count();
        let complete_count = sink.names().iter().filter(|n| **n == "step:complete").count();
        assert_eq!(retry_count, 2);
        assert_eq!(complete_count, 1);
    }

    #[tokio::test]
    async fn retry_with_zero_max_retries_behaves_as_stop() {
        let sink = Arc::new(RecordingEventSink::new());
        let interpreter = Interpreter::new(sink, &WorkflowConfig::default());
        interpreter.register_action("always-fails", Arc::new(|_args, _ctx| Err(CoreError::timeout(5))));

        let s1 = StepId::generate();
        let workflow = workflow_with(vec![action(s1, "always-fails", OnErrorPolicy::Retry, Some(0))]);
        let workflow_id = workflow.id;
        interpreter.register_workflow(workflow).unwrap();

        let execution_id = interpreter.execute(workflow_id, HashMap::new()).await.unwrap();
        let snapshot = interpreter.status_async(execution_id).await.unwrap();
        assert_eq!(snapshot.status, ExecutionStatus::Failed);
    }

    #[tokio::test]
    async fn compensation_scenario_runs_both_inline_and_pass_level_compensations() {
        let sink = Arc::new(RecordingEventSink::new());
        let interpreter = Interpreter::new(sink.clone(), &WorkflowConfig::default());
        interpreter.register_action("always-fails", Arc::new(|_args, _ctx| Err(CoreError::timeout(5))));

        let s1 = StepId::generate();
        let c1 = StepId::generate();
        let s2 = StepId::generate();
        let c2 = StepId::generate();
        let s3 = StepId::generate();

        let mut step1 = action(s1, "log", OnErrorPolicy::Stop, None);
        step1.compensation_step = Some(c1);
        let mut step2 = action(s2, "always-fails", OnErrorPolicy::Compensate, None);
        step2.compensation_step = Some(c2);
        let step3 = action(s3, "log", OnErrorPolicy::Stop, None);

        let mut workflow = workflow_with(vec![
            step1,
            action(c1, "log", OnErrorPolicy::Stop, None),
            step2,
            action(c2, "log", OnErrorPolicy::Stop, None),
            step3,
        ]);
        workflow.error_handling = OnErrorPolicy::Compensate;
        let workflow_id = workflow.id;
        interpreter.register_workflow(workflow).unwrap();

        let execution_id = interpreter.execute(workflow_id, HashMap::new()).await.unwrap();
        let snapshot = interpreter.status_async(execution_id).await.unwrap();

        assert_eq!(snapshot.status, ExecutionStatus::Failed);
        assert_eq!(snapshot.step_status(s1), Some(StepStatus::Completed));
        assert_eq!(snapshot.step_status(s2), Some(StepStatus::Failed));
        assert_eq!(snapshot.step_status(s3), None, "s3 must never run");
        assert!(sink.names().iter().filter(|n| **n == "workflow:compensation-step").count() >= 2);
    }

    #[tokio::test]
    async fn sequential_step_merges_prior_results_into_later_context() {
        let sink = Arc::new(RecordingEventSink::new());
        let interpreter = Interpreter::new(sink, &WorkflowConfig::default());
        interpreter.register_action("value", Arc::new(|args, _ctx| Ok(args.clone())));

        let sub1 = StepId::generate();
        let sub2 = StepId::generate();
        let seq = StepId::generate();

        let mut value_step = |id, v: i64| Step {
            id,
            name: "value".to_string(),
            config: StepConfig::Action { function: "value".to_string(), args: json!(v) },
            dependencies: vec![],
            max_retries: None,
            timeout_ms: None,
            on_error: OnErrorPolicy::Stop,
            compensation_step: None,
        };

        let workflow = workflow_with(vec![
            value_step(sub1, 1),
            value_step(sub2, 2),
            Step {
                id: seq,
                name: "seq".to_string(),
                config: StepConfig::Sequential { sub_steps: vec![sub1, sub2] },
                dependencies: vec![],
                max_retries: None,
                timeout_ms: None,
                on_error: OnErrorPolicy::Stop,
                compensation_step: None,
            },
        ]);
        // sub1/sub2 stay declared in workflow.steps (so validate() doesn't
        // flag them as dangling) but the interpreter treats them as owned
        // by `seq` and only runs them through its recursive StepRunner.
        let workflow_id = workflow.id;
        interpreter.register_workflow(workflow).unwrap();

        let execution_id = interpreter.execute(workflow_id, HashMap::new()).await.unwrap();
        let snapshot = interpreter.status_async(execution_id).await.unwrap();
        assert_eq!(snapshot.status, ExecutionStatus::Completed);
        assert_eq!(snapshot.step_status(seq), Some(StepStatus::Completed));
    }
}
