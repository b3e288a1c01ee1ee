use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use miette::{IntoDiagnostic, Result, miette};

use hive_core::config::WorkflowConfig;
use hive_core::scheduler::{Recurrence, Scheduler};
use hive_core::workflow::{Interpreter, Workflow};

use crate::event_sink::StdoutEventSink;
use crate::output;

use super::{parse_vars, read_json};

#[allow(clippy::too_many_arguments)]
pub async fn demo(
    file: PathBuf,
    vars: Vec<String>,
    once: Option<String>,
    interval_ms: Option<u64>,
    cron: Option<String>,
    timezone: String,
    ticks: u32,
) -> Result<()> {
    let workflow: Workflow = read_json(&file)?;
    let variables = parse_vars(&vars)?;

    let recurrence = if let Some(expression) = cron {
        Recurrence::Cron { expression, timezone }
    } else if let Some(ms) = interval_ms {
        Recurrence::Interval { period: Duration::from_millis(ms) }
    } else if let Some(at) = once {
        let at = DateTime::parse_from_rfc3339(&at).into_diagnostic()?.with_timezone(&Utc);
        Recurrence::Once { at }
    } else {
        return Err(miette!("one of --once, --interval-ms, or --cron is required"));
    };

    let sink = Arc::new(StdoutEventSink);
    let interpreter = Interpreter::new(sink.clone(), &WorkflowConfig::default());
    let workflow_id = workflow.id;
    interpreter.register_workflow(workflow)?;

    let scheduler = Arc::new(Scheduler::new(interpreter, sink));
    let id = scheduler.schedule(workflow_id, recurrence, variables)?;

    output::section("schedule demo");
    output::kv("schedule", &id.to_string());

    // There's no real daemon loop here: each tick's `now` is the
    // schedule's own due time, so the demo fires deterministically
    // without waiting on wall-clock time to pass.
    for i in 0..ticks {
        let Some(current) = scheduler.status(id) else {
            break;
        };
        let Some(due) = current.next_run else {
            output::warning("schedule has no further occurrence");
            break;
        };
        output::kv(&format!("tick {}", i + 1), &format!("firing at {due}"));
        scheduler.tick(due).await;
    }

    if let Some(history) = scheduler.history(id, None) {
        let rows = history
            .iter()
            .map(|f| {
                vec![
                    f.start.to_rfc3339(),
                    format!("{:?}", f.status),
                    f.execution.map(|e| e.to_string()).unwrap_or_default(),
                    f.error.clone().unwrap_or_default(),
                ]
            })
            .collect();
        output::table(&["start", "status", "execution", "error"], rows);
    }

    Ok(())
}
