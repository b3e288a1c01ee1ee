//! `condition` step executor (spec §4.5): evaluates an expression over
//! the context and reports which branch to take next.

use std::collections::HashMap;

use serde_json::Value;

use crate::id::StepId;
use crate::Result;

use super::super::expr::Expr;

pub struct ConditionOutcome {
    pub result: bool,
    pub next_step: Option<StepId>,
}

pub fn evaluate(
    expression: &str,
    true_path: Option<StepId>,
    false_path: Option<StepId>,
    context: &HashMap<String, Value>,
) -> Result<ConditionOutcome> {
    let expr = Expr::parse(expression)?;
    let result = expr.eval_bool(context)?;
    let next_step = if result { true_path } else { false_path };
    Ok(ConditionOutcome { result, next_step })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::StepId;
    use serde_json::json;

    #[test]
    fn picks_true_path_when_expression_holds() {
        let mut ctx = HashMap::new();
        ctx.insert("amount".to_string(), json!(150));
        let true_id = StepId::generate();
        let false_id = StepId::generate();

        let outcome = evaluate("amount > 100", Some(true_id), Some(false_id), &ctx).unwrap();
        assert!(outcome.result);
        assert_eq!(outcome.next_step, Some(true_id));
    }
}
