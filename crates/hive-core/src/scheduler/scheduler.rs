//! The Scheduler (spec §4.7): cron/interval/once triggers driving
//! workflow executions.
//!
//! Firing is serialized per schedule with a `tokio::sync::Mutex` rather
//! than a flag check — "only one firing per schedule may be in flight;
//! overlapping firings are queued behind the previous" falls straight
//! out of the second `fire` call awaiting the lock the first one holds,
//! instead of needing separate queue bookkeeping.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex as SyncMutex;
use serde_json::Value;
use tokio::sync::Mutex as TokioMutex;

use crate::events::{Event, EventSink};
use crate::id::{ScheduleId, WorkflowId};
use crate::workflow::{ExecutionStatus, Interpreter};
use crate::{CoreError, Result};

use super::types::{next_fire_after, next_fire_after_inclusive, FiringRecord, FiringStatus, Recurrence, Schedule, ScheduleStatus};

pub struct Scheduler {
    schedules: DashMap<ScheduleId, Schedule>,
    history: DashMap<ScheduleId, SyncMutex<Vec<FiringRecord>>>,
    firing_locks: DashMap<ScheduleId, Arc<TokioMutex<()>>>,
    interpreter: Interpreter,
    sink: Arc<dyn EventSink>,
}

impl Scheduler {
    pub fn new(interpreter: Interpreter, sink: Arc<dyn EventSink>) -> Self {
        Self {
            schedules: DashMap::new(),
            history: DashMap::new(),
            firing_locks: DashMap::new(),
            interpreter,
            sink,
        }
    }

    /// Registers a new schedule. Fails synchronously on an invalid cron
    /// expression (spec §4.7).
    pub fn schedule(
        &self,
        workflow: WorkflowId,
        recurrence: Recurrence,
        context: HashMap<String, Value>,
    ) -> Result<ScheduleId> {
        let id = ScheduleId::generate();
        let entry = Schedule::new(id, workflow, recurrence, context, Utc::now())?;
        self.schedules.insert(id, entry);
        self.history.insert(id, SyncMutex::new(Vec::new()));
        self.sink.publish(Event::ScheduleRegistered { schedule: id, workflow });
        Ok(id)
    }

    /// Stops future firings and cancels the pending timer. An in-flight
    /// firing is not killed (spec §5).
    pub fn cancel(&self, id: ScheduleId) -> Result<()> {
        let mut entry = self.schedules.get_mut(&id).ok_or(CoreError::ScheduleNotFound(id))?;
        entry.status = ScheduleStatus::Cancelled;
        entry.next_run = None;
        drop(entry);
        self.sink.publish(Event::ScheduleCancelled { schedule: id });
        Ok(())
    }

    pub fn pause(&self, id: ScheduleId) -> Result<()> {
        let mut entry = self.schedules.get_mut(&id).ok_or(CoreError::ScheduleNotFound(id))?;
        entry.status = ScheduleStatus::Paused;
        drop(entry);
        self.sink.publish(Event::SchedulePaused { schedule: id });
        Ok(())
    }

    pub fn resume(&self, id: ScheduleId) -> Result<()> {
        let mut entry = self.schedules.get_mut(&id).ok_or(CoreError::ScheduleNotFound(id))?;
        entry.status = ScheduleStatus::Scheduled;
        entry.next_run = next_fire_after_inclusive(&entry.recurrence, Utc::now())?;
        drop(entry);
        self.sink.publish(Event::ScheduleResumed { schedule: id });
        Ok(())
    }

    /// Replaces a schedule's recurrence and/or context, recomputing
    /// `next_run` against the new recurrence.
    pub fn update(
        &self,
        id: ScheduleId,
        recurrence: Option<Recurrence>,
        context: Option<HashMap<String, Value>>,
    ) -> Result<()> {
        if let Some(ref r) = recurrence {
            r.validate()?;
        }
        let mut entry = self.schedules.get_mut(&id).ok_or(CoreError::ScheduleNotFound(id))?;
        if let Some(r) = recurrence {
            entry.recurrence = r;
        }
        if let Some(c) = context {
            entry.context = c;
        }
        entry.next_run = next_fire_after_inclusive(&entry.recurrence, Utc::now())?;
        drop(entry);
        self.sink.publish(Event::ScheduleUpdated { schedule: id });
        Ok(())
    }

    pub fn list(&self) -> Vec<Schedule> {
        self.schedules.iter().map(|e| e.value().clone()).collect()
    }

    pub fn status(&self, id: ScheduleId) -> Option<Schedule> {
        self.schedules.get(&id).map(|e| e.value().clone())
    }

    pub fn history(&self, id: ScheduleId, limit: Option<usize>) -> Option<Vec<FiringRecord>> {
        let records = self.history.get(&id)?;
        let guard = records.lock();
        Some(match limit {
            Some(n) if n < guard.len() => guard[guard.len() - n..].to_vec(),
            _ => guard.clone(),
        })
    }

    /// Schedules due at or before `now`, i.e. `status == Scheduled` and
    /// `next_run <= now`.
    pub fn due_schedules(&self, now: DateTime<Utc>) -> Vec<ScheduleId> {
        self.schedules
            .iter()
            .filter(|e| e.value().status == ScheduleStatus::Scheduled)
            .filter(|e| e.value().next_run.is_some_and(|t| t <= now))
            .map(|e| *e.key())
            .collect()
    }

    fn firing_lock(&self, id: ScheduleId) -> Arc<TokioMutex<()>> {
        self.firing_locks.entry(id).or_insert_with(|| Arc::new(TokioMutex::new(()))).clone()
    }

    /// Runs one firing of `id` to completion. `due_at` is the `next_run`
    /// this firing was scheduled against — the following occurrence is
    /// computed from this, not from whenever the lock actually becomes
    /// free, so a queued firing does not shift the grid.
    ///
    /// Cooperative: waits for any in-flight firing of the same schedule
    /// to finish before starting (spec: "overlapping firings are queued
    /// behind the previous").
    pub async fn fire(&self, id: ScheduleId, due_at: DateTime<Utc>) -> Result<()> {
        let lock = self.firing_lock(id);
        let _guard = lock.lock().await;

        let (workflow, recurrence, context, once) = {
            let entry = self.schedules.get(&id).ok_or(CoreError::ScheduleNotFound(id))?;
            if entry.status != ScheduleStatus::Scheduled {
                // Cancelled, paused, or already completed while this
                // firing waited on the lock — nothing to do.
                return Ok(());
            }
            (
                entry.workflow,
                entry.recurrence.clone(),
                entry.context.clone(),
                matches!(entry.recurrence, Recurrence::Once { .. }),
            )
        };

        if let Some(mut entry) = self.schedules.get_mut(&id) {
            entry.status = ScheduleStatus::Running;
        }

        let start = Utc::now();
        let outcome = self.interpreter.execute(workflow, context).await;

        let (execution, firing_status, error) = match outcome {
            Ok(execution_id) => {
                let final_status = self
                    .interpreter
                    .status_async(execution_id)
                    .await
                    .map(|e| e.status);
                match final_status {
                    Some(ExecutionStatus::Completed) => (Some(execution_id), FiringStatus::Success, None),
                    Some(ExecutionStatus::Cancelled) => {
                        (Some(execution_id), FiringStatus::Cancelled, None)
                    }
                    Some(ExecutionStatus::Failed) | Some(ExecutionStatus::Paused) | None => (
                        Some(execution_id),
                        FiringStatus::Failed,
                        Some("workflow execution did not complete successfully".to_string()),
                    ),
                    Some(ExecutionStatus::Idle) | Some(ExecutionStatus::Running) => {
                        // Interpreter::execute() only returns once drive()
                        // has settled into a terminal-ish status; reaching
                        // here would be an interpreter bug, not a firing
                        // outcome we can classify.
                        (Some(execution_id), FiringStatus::Failed, Some("execution left running".to_string()))
                    }
                }
            }
            Err(e) => (None, FiringStatus::Failed, Some(e.to_string())),
        };

        let end = Utc::now();
        if let Some(execution_id) = execution {
            self.sink.publish(Event::ScheduleFired { schedule: id, execution: execution_id });
        }

        self.history.entry(id).or_insert_with(|| SyncMutex::new(Vec::new())).lock().push(FiringRecord {
            schedule: id,
            workflow,
            execution,
            start,
            end: Some(end),
            status: firing_status,
            error: error.clone(),
        });

        if let Some(mut entry) = self.schedules.get_mut(&id) {
            entry.last_run = Some(start);
            if once {
                entry.status = match firing_status {
                    FiringStatus::Success => ScheduleStatus::Completed,
                    _ => ScheduleStatus::Failed,
                };
                entry.next_run = None;
            } else {
                entry.status = ScheduleStatus::Scheduled;
                entry.next_run = next_fire_after(&recurrence, due_at)?;
            }
        }

        match firing_status {
            FiringStatus::Success if once => {
                self.sink.publish(Event::ScheduleCompleted { schedule: id });
            }
            FiringStatus::Failed => {
                self.sink.publish(Event::ScheduleFailed {
                    schedule: id,
                    message: error.unwrap_or_else(|| "firing failed".to_string()),
                });
            }
            _ => {}
        }

        Ok(())
    }

    /// Fires every schedule due at `now`, each as its own task so
    /// independent schedules run in parallel while same-schedule
    /// overlap still serializes through [`Self::fire`]'s lock.
    pub async fn tick(self: &Arc<Self>, now: DateTime<Utc>) {
        let due: Vec<(ScheduleId, DateTime<Utc>)> = self
            .due_schedules(now)
            .into_iter()
            .filter_map(|id| self.schedules.get(&id).and_then(|e| e.next_run.map(|t| (id, t))))
            .collect();

        let mut handles = Vec::with_capacity(due.len());
        for (id, due_at) in due {
            let this = self.clone();
            handles.push(tokio::spawn(async move {
                let _ = this.fire(id, due_at).await;
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Spawns a background loop that polls [`Self::due_schedules`] on a
    /// fixed interval and fires whatever is due. Matches spec's
    /// instruction to drive firings with `tokio::time` rather than a
    /// third-party job runner.
    pub fn spawn_driver(self: Arc<Self>, poll_every: std::time::Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(poll_every);
            loop {
                interval.tick().await;
                self.tick(Utc::now()).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkflowConfig;
    use crate::events::NullEventSink;
    use crate::id::StepId;
    use crate::workflow::{OnErrorPolicy, Step, StepConfig, Workflow};
    use serde_json::json;

    fn scheduler() -> Scheduler {
        let interpreter = Interpreter::new(Arc::new(NullEventSink), &WorkflowConfig::default());
        Scheduler::new(interpreter, Arc::new(NullEventSink))
    }

    fn register_wait_workflow(scheduler: &Scheduler, duration_ms: u64) -> WorkflowId {
        let workflow_id = WorkflowId::generate();
        let step_id = StepId::generate();
        let workflow = Workflow {
            id: workflow_id,
            name: "fire-test".to_string(),
            steps: vec![Step {
                id: step_id,
                name: "wait".to_string(),
                config: StepConfig::Wait { duration_ms: Some(duration_ms), until: None },
                dependencies: vec![],
                max_retries: None,
                timeout_ms: None,
                on_error: OnErrorPolicy::Stop,
                compensation_step: None,
            }],
            variables: HashMap::new(),
            error_handling: OnErrorPolicy::Stop,
        };
        scheduler.interpreter.register_workflow(workflow).unwrap();
        workflow_id
    }

    #[test]
    fn once_in_the_past_schedules_to_fire_immediately() {
        let scheduler = scheduler();
        let workflow = WorkflowId::generate();
        let at = Utc::now() - chrono::Duration::minutes(1);
        let id = scheduler
            .schedule(workflow, Recurrence::Once { at }, HashMap::new())
            .unwrap();
        let snapshot = scheduler.status(id).unwrap();
        assert!(snapshot.next_run.is_some());
        assert!(scheduler.due_schedules(Utc::now()).contains(&id));
    }

    #[test]
    fn invalid_cron_rejected_synchronously() {
        let scheduler = scheduler();
        let result = scheduler.schedule(
            WorkflowId::generate(),
            Recurrence::Cron { expression: "garbage".to_string(), timezone: "UTC".to_string() },
            HashMap::new(),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn once_schedule_completes_after_one_successful_firing() {
        let scheduler = scheduler();
        let workflow = register_wait_workflow(&scheduler, 5);
        let due_at = Utc::now();
        let id = scheduler
            .schedule(workflow, Recurrence::Once { at: due_at }, HashMap::new())
            .unwrap();

        scheduler.fire(id, due_at).await.unwrap();

        let snapshot = scheduler.status(id).unwrap();
        assert_eq!(snapshot.status, ScheduleStatus::Completed);
        assert!(snapshot.next_run.is_none());
        let history = scheduler.history(id, None).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, FiringStatus::Success);
    }

    /// Matches spec §8 scenario 6: a firing still in flight, and an
    /// overlapping attempt to fire the same schedule, must run
    /// sequentially rather than in parallel.
    #[tokio::test]
    async fn overlapping_firings_are_queued_not_parallel() {
        let scheduler = Arc::new(scheduler());
        let workflow = register_wait_workflow(&scheduler, 40);
        let due_at = Utc::now();
        let id = scheduler
            .schedule(
                workflow,
                Recurrence::Interval { period: std::time::Duration::from_secs(3600) },
                HashMap::new(),
            )
            .unwrap();

        let a = scheduler.clone();
        let b = scheduler.clone();
        let (r1, r2) = tokio::join!(a.fire(id, due_at), b.fire(id, due_at));
        r1.unwrap();
        r2.unwrap();

        let history = scheduler.history(id, None).unwrap();
        assert_eq!(history.len(), 2);
        let first_end = history[0].end.unwrap();
        let second_start = history[1].start;
        assert!(second_start >= first_end, "second firing must not start before the first ended");
    }

    #[tokio::test]
    async fn cancel_stops_future_firings() {
        let scheduler = scheduler();
        let workflow = register_wait_workflow(&scheduler, 5);
        let id = scheduler
            .schedule(
                workflow,
                Recurrence::Interval { period: std::time::Duration::from_secs(60) },
                HashMap::new(),
            )
            .unwrap();

        scheduler.cancel(id).unwrap();
        let snapshot = scheduler.status(id).unwrap();
        assert_eq!(snapshot.status, ScheduleStatus::Cancelled);
        assert!(snapshot.next_run.is_none());
        assert!(scheduler.due_schedules(Utc::now() + chrono::Duration::hours(1)).is_empty());
    }

    #[tokio::test]
    async fn pause_then_resume_recomputes_next_run() {
        let scheduler = scheduler();
        let workflow = register_wait_workflow(&scheduler, 5);
        let id = scheduler
            .schedule(
                workflow,
                Recurrence::Interval { period: std::time::Duration::from_secs(60) },
                HashMap::new(),
            )
            .unwrap();

        scheduler.pause(id).unwrap();
        assert_eq!(scheduler.status(id).unwrap().status, ScheduleStatus::Paused);
        assert!(scheduler.due_schedules(Utc::now() + chrono::Duration::hours(1)).is_empty());

        scheduler.resume(id).unwrap();
        let snapshot = scheduler.status(id).unwrap();
        assert_eq!(snapshot.status, ScheduleStatus::Scheduled);
        assert!(snapshot.next_run.is_some());
    }
}
