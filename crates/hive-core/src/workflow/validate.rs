//! Synchronous pre-run workflow validation (spec §4.6).

use std::collections::{HashMap, HashSet};

use crate::id::StepId;

use super::expr::Expr;
use super::types::{StepConfig, ValidationResult, Workflow};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

pub fn validate(workflow: &Workflow) -> ValidationResult {
    let mut errors = Vec::new();
    let warnings = Vec::new();

    if workflow.name.trim().is_empty() {
        errors.push("workflow name must not be empty".to_string());
    }
    if workflow.steps.is_empty() {
        errors.push("workflow must declare at least one step".to_string());
    }

    let mut seen_ids: HashSet<StepId> = HashSet::new();
    for step in &workflow.steps {
        if !seen_ids.insert(step.id) {
            errors.push(format!("duplicate step id '{}'", step.id));
        }
    }

    let ids: HashSet<StepId> = workflow.steps.iter().map(|s| s.id).collect();

    for step in &workflow.steps {
        for dep in &step.dependencies {
            if !ids.contains(dep) {
                errors.push(format!(
                    "step '{}' declares a dependency on unknown step '{}'",
                    step.id, dep
                ));
            }
        }

        if let Some(comp) = step.compensation_step {
            if !ids.contains(&comp) {
                errors.push(format!(
                    "step '{}' references unknown compensation step '{}'",
                    step.id, comp
                ));
            }
        }

        match &step.config {
            StepConfig::Action { function, .. } => {
                if function.trim().is_empty() {
                    errors.push(format!("action step '{}' has an empty function name", step.id));
                }
            }
            StepConfig::Condition {
                expression,
                true_path,
                false_path,
            } => {
                if let Err(e) = Expr::parse(expression) {
                    errors.push(format!("condition step '{}' has an invalid expression: {e}", step.id));
                }
                for target in [true_path, false_path].into_iter().flatten() {
                    if !ids.contains(target) {
                        errors.push(format!(
                            "condition step '{}' references unknown branch step '{}'",
                            step.id, target
                        ));
                    }
                }
            }
            StepConfig::Parallel { sub_steps, .. } | StepConfig::Sequential { sub_steps } => {
                if sub_steps.is_empty() {
                    errors.push(format!("step '{}' declares no sub-steps", step.id));
                }
                for sub in sub_steps {
                    if !ids.contains(sub) {
                        errors.push(format!("step '{}' references unknown sub-step '{}'", step.id, sub));
                    }
                }
            }
            StepConfig::Loop {
                collection_path,
                body,
                ..
            } => {
                if collection_path.trim().is_empty() {
                    errors.push(format!("loop step '{}' has an empty collection path", step.id));
                }
                if !ids.contains(body) {
                    errors.push(format!("loop step '{}' references unknown body step '{}'", step.id, body));
                }
            }
            StepConfig::Wait { duration_ms, until } => {
                if duration_ms.is_none() && until.is_none() {
                    errors.push(format!("wait step '{}' needs a duration or an until timestamp", step.id));
                }
            }
            StepConfig::SubWorkflow { .. } => {}
        }
    }

    if let Some(cycle) = find_cycle(workflow) {
        errors.push(format!("dependency graph contains a cycle: {cycle}"));
    }

    ValidationResult {
        valid: errors.is_empty(),
        errors,
        warnings,
    }
}

/// DFS with a three-color recursion-stack marker (spec §4.6, §9 Design
/// Notes). Returns a human-readable description of the first cycle found.
fn find_cycle(workflow: &Workflow) -> Option<String> {
    let deps: HashMap<StepId, &Vec<StepId>> = workflow
        .steps
        .iter()
        .map(|s| (s.id, &s.dependencies))
        .collect();
    let mut color: HashMap<StepId, Color> =
        workflow.steps.iter().map(|s| (s.id, Color::White)).collect();

    for step in &workflow.steps {
        if color[&step.id] == Color::White {
            let mut stack = Vec::new();
            if let Some(cycle) = visit(step.id, &deps, &mut color, &mut stack) {
                return Some(cycle);
            }
        }
    }
    None
}

fn visit(
    id: StepId,
    deps: &HashMap<StepId, &Vec<StepId>>,
    color: &mut HashMap<StepId, Color>,
    stack: &mut Vec<StepId>,
) -> Option<String> {
    color.insert(id, Color::Gray);
    stack.push(id);

    if let Some(dependencies) = deps.get(&id) {
        for &dep in dependencies.iter() {
            match color.get(&dep).copied() {
                Some(Color::Gray) => {
                    let path = stack
                        .iter()
                        .map(|s| s.to_string())
                        .collect::<Vec<_>>()
                        .join(" -> ");
                    return Some(format!("{path} -> {dep}"));
                }
                Some(Color::White) | None => {
                    if let Some(cycle) = visit(dep, deps, color, stack) {
                        return Some(cycle);
                    }
                }
                Some(Color::Black) => {}
            }
        }
    }

    stack.pop();
    color.insert(id, Color::Black);
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::{StepId, WorkflowId};
    use crate::workflow::types::{OnErrorPolicy, Step};
    use std::collections::HashMap as Map;

    fn action_step(id: StepId, deps: Vec<StepId>) -> Step {
        Step {
            id,
            name: "noop".to_string(),
            config: StepConfig::Action {
                function: "log".to_string(),
                args: serde_json::Value::Null,
            },
            dependencies: deps,
            max_retries: None,
            timeout_ms: None,
            on_error: OnErrorPolicy::Stop,
            compensation_step: None,
        }
    }

    #[test]
    fn valid_acyclic_workflow_passes() {
        let s1 = StepId::generate();
        let s2 = StepId::generate();
        let workflow = Workflow {
            id: WorkflowId::generate(),
            name: "w".to_string(),
            steps: vec![action_step(s1, vec![]), action_step(s2, vec![s1])],
            variables: Map::new(),
            error_handling: OnErrorPolicy::Stop,
        };
        let result = validate(&workflow);
        assert!(result.valid, "{:?}", result.errors);
    }

    #[test]
    fn cyclic_dependency_is_rejected() {
        let s1 = StepId::generate();
        let s2 = StepId::generate();
        let workflow = Workflow {
            id: WorkflowId::generate(),
            name: "w".to_string(),
            steps: vec![action_step(s1, vec![s2]), action_step(s2, vec![s1])],
            variables: Map::new(),
            error_handling: OnErrorPolicy::Stop,
        };
        let result = validate(&workflow);
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| e.contains("cycle")));
    }

    #[test]
    fn dangling_dependency_is_rejected() {
        let s1 = StepId::generate();
        let ghost = StepId::generate();
        let workflow = Workflow {
            id: WorkflowId::generate(),
            name: "w".to_string(),
            steps: vec![action_step(s1, vec![ghost])],
            variables: Map::new(),
            error_handling: OnErrorPolicy::Stop,
        };
        let result = validate(&workflow);
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| e.contains("unknown step")));
    }

    #[test]
    fn duplicate_step_id_is_rejected() {
        let s1 = StepId::generate();
        let workflow = Workflow {
            id: WorkflowId::generate(),
            name: "w".to_string(),
            steps: vec![action_step(s1, vec![]), action_step(s1, vec![])],
            variables: Map::new(),
            error_handling: OnErrorPolicy::Stop,
        };
        let result = validate(&workflow);
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| e.contains("duplicate")));
    }
}
