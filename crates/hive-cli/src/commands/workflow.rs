use std::path::PathBuf;
use std::sync::Arc;

use miette::Result;

use hive_core::config::WorkflowConfig;
use hive_core::persistence::memory::MemoryStore;
use hive_core::persistence::{append_json, get_json, put_json};
use hive_core::workflow::{ExecutionStatus, Interpreter, Workflow};

use crate::event_sink::StdoutEventSink;
use crate::output;

use super::{parse_vars, read_json};

/// Loads a workflow definition and validates it without running it.
pub fn validate(file: PathBuf) -> Result<()> {
    let workflow: Workflow = read_json(&file)?;
    let result = hive_core::workflow::validate(&workflow);

    output::section(&format!("workflow {}", workflow.name));
    if result.valid {
        output::success("graph is valid");
    } else {
        output::error("graph is invalid");
        for e in &result.errors {
            println!("    - {e}");
        }
    }
    for w in &result.warnings {
        output::warning(w);
    }
    Ok(())
}

/// Registers and runs a workflow to completion, printing its final
/// status and step history. Each invocation is a fresh interpreter, so
/// this is meant for exercising a workflow definition in isolation, not
/// for resuming across CLI runs.
pub async fn run(file: PathBuf, vars: Vec<String>) -> Result<()> {
    let workflow: Workflow = read_json(&file)?;
    let variables = parse_vars(&vars)?;

    let sink = Arc::new(StdoutEventSink);
    let interpreter = Interpreter::new(sink, &WorkflowConfig::default());

    output::section(&format!("workflow {}", workflow.name));
    let workflow_id = workflow.id;
    let outcome = interpreter.register_workflow(workflow)?;
    for w in &outcome.warnings {
        output::warning(w);
    }

    let execution_id = interpreter.execute(workflow_id, variables).await?;
    let snapshot = interpreter
        .status_async(execution_id)
        .await
        .expect("execution just ran under this interpreter");

    output::kv("execution", &execution_id.to_string());
    output::kv("status", &format!("{:?}", snapshot.status));
    match snapshot.status {
        ExecutionStatus::Completed => output::success("workflow completed"),
        ExecutionStatus::Failed => output::error("workflow failed"),
        _ => {}
    }

    let rows = snapshot
        .history
        .iter()
        .map(|entry| {
            vec![
                entry.step.to_string(),
                format!("{:?}", entry.status),
                entry.duration_ms.map(|d| format!("{d}ms")).unwrap_or_default(),
                entry.error.clone().unwrap_or_default(),
            ]
        })
        .collect();
    output::table(&["step", "status", "duration", "error"], rows);

    // Exercises the persistence contract end to end: the execution's
    // history is appended to a journal and the snapshot re-read from it,
    // even though the store doesn't outlive this process.
    let store = MemoryStore::new();
    put_json(&store, "executions", &execution_id.to_string(), &snapshot).await?;
    append_json(&store, "execution_history", &snapshot).await?;
    let replayed: Option<hive_core::workflow::WorkflowExecution> =
        get_json(&store, "executions", &execution_id.to_string()).await?;
    if replayed.is_some() {
        output::kv("journal", "execution snapshot round-tripped through the in-memory store");
    }

    Ok(())
}
