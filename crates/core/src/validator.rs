//! Plan validation.
//!
//! [`validate`] is the only way to obtain a [`ValidatedPlan`], and a
//! [`ValidatedPlan`] is the only plan type the engine accepts, so a
//! malformed or cyclic plan cannot reach the scheduler by construction.

use std::collections::{HashMap, HashSet};

use crate::plan::{ConversionPlan, ConversionTask};

/// A plan that passed every structural check.
///
/// Dereferences to the underlying [`ConversionPlan`]; the inner plan is
/// deliberately not exposed mutably.
#[derive(Debug, Clone)]
pub struct ValidatedPlan(ConversionPlan);

impl ValidatedPlan {
    /// Consume the wrapper and return the plan.
    pub fn into_inner(self) -> ConversionPlan {
        self.0
    }
}

impl std::ops::Deref for ValidatedPlan {
    type Target = ConversionPlan;

    fn deref(&self) -> &ConversionPlan {
        &self.0
    }
}

/// Why a plan was rejected. Each variant names the offending task(s).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanValidationError {
    #[error("plan contains no tasks")]
    Empty,

    #[error("task at index {index} has an empty id")]
    MissingId { index: usize },

    #[error("task \"{task}\" has an empty description")]
    MissingDescription { task: String },

    #[error("duplicate task id \"{task}\"")]
    DuplicateTaskId { task: String },

    #[error("task \"{task}\" has a non-positive duration estimate")]
    NonPositiveDuration { task: String },

    #[error("task \"{task}\" depends on unknown task \"{dependency}\"")]
    UnknownDependency { task: String, dependency: String },

    #[error("dependency cycle involving task \"{task}\"")]
    Cycle { task: String },
}

/// Validate a plan, in order: non-empty, well-formed tasks, resolvable
/// dependencies, acyclic dependency graph.
pub fn validate(plan: ConversionPlan) -> Result<ValidatedPlan, PlanValidationError> {
    if plan.tasks.is_empty() {
        return Err(PlanValidationError::Empty);
    }

    let mut seen: HashSet<&str> = HashSet::with_capacity(plan.tasks.len());
    for (index, task) in plan.tasks.iter().enumerate() {
        if task.id.is_empty() {
            return Err(PlanValidationError::MissingId { index });
        }
        if task.description.is_empty() {
            return Err(PlanValidationError::MissingDescription {
                task: task.id.clone(),
            });
        }
        if !(task.estimated_secs > 0.0) {
            return Err(PlanValidationError::NonPositiveDuration {
                task: task.id.clone(),
            });
        }
        if !seen.insert(task.id.as_str()) {
            return Err(PlanValidationError::DuplicateTaskId {
                task: task.id.clone(),
            });
        }
    }

    let by_id: HashMap<&str, &ConversionTask> =
        plan.tasks.iter().map(|t| (t.id.as_str(), t)).collect();

    for task in &plan.tasks {
        for dep in &task.depends_on {
            if !by_id.contains_key(dep.as_str()) {
                return Err(PlanValidationError::UnknownDependency {
                    task: task.id.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    detect_cycle(&plan, &by_id)?;

    Ok(ValidatedPlan(plan))
}

/// Depth-first traversal with an on-stack set. The first back-edge found
/// is reported as the cycle, naming the task it points back to.
fn detect_cycle(
    plan: &ConversionPlan,
    by_id: &HashMap<&str, &ConversionTask>,
) -> Result<(), PlanValidationError> {
    let mut visited: HashSet<&str> = HashSet::with_capacity(plan.tasks.len());
    let mut on_stack: HashSet<&str> = HashSet::new();

    for task in &plan.tasks {
        if !visited.contains(task.id.as_str()) {
            visit(task.id.as_str(), by_id, &mut visited, &mut on_stack)?;
        }
    }
    Ok(())
}

fn visit<'a>(
    id: &'a str,
    by_id: &HashMap<&'a str, &'a ConversionTask>,
    visited: &mut HashSet<&'a str>,
    on_stack: &mut HashSet<&'a str>,
) -> Result<(), PlanValidationError> {
    visited.insert(id);
    on_stack.insert(id);

    // Dependency ids were resolved before this pass, so the lookup holds.
    if let Some(task) = by_id.get(id) {
        for dep in &task.depends_on {
            if on_stack.contains(dep.as_str()) {
                return Err(PlanValidationError::Cycle { task: dep.clone() });
            }
            if !visited.contains(dep.as_str()) {
                visit(dep.as_str(), by_id, visited, on_stack)?;
            }
        }
    }

    on_stack.remove(id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::plan::{PlanComplexity, TaskKind};

    fn task(id: &str, deps: &[&str]) -> ConversionTask {
        ConversionTask {
            id: id.into(),
            kind: TaskKind::CodeGeneration,
            description: format!("convert {id}"),
            input_patterns: vec![],
            output_patterns: vec![],
            depends_on: deps.iter().map(|d| d.to_string()).collect(),
            priority: 0,
            estimated_secs: 10.0,
            context: serde_json::json!({}),
        }
    }

    fn plan(tasks: Vec<ConversionTask>) -> ConversionPlan {
        ConversionPlan {
            id: uuid::Uuid::nil(),
            source_stack: "express/javascript".into(),
            target_stack: "axum/rust".into(),
            tasks,
            complexity: PlanComplexity::Moderate,
            feasible: true,
            warnings: vec![],
        }
    }

    #[test]
    fn valid_linear_plan() {
        let result = validate(plan(vec![
            task("t1", &[]),
            task("t2", &["t1"]),
            task("t3", &["t2"]),
        ]));
        assert!(result.is_ok());
    }

    #[test]
    fn valid_diamond_plan() {
        let result = validate(plan(vec![
            task("a", &[]),
            task("b", &["a"]),
            task("c", &["a"]),
            task("d", &["b", "c"]),
        ]));
        assert!(result.is_ok());
    }

    #[test]
    fn empty_plan_rejected() {
        assert_matches!(validate(plan(vec![])), Err(PlanValidationError::Empty));
    }

    #[test]
    fn empty_task_id_rejected() {
        let result = validate(plan(vec![task("", &[])]));
        assert_matches!(result, Err(PlanValidationError::MissingId { index: 0 }));
    }

    #[test]
    fn empty_description_rejected() {
        let mut t = task("t1", &[]);
        t.description = String::new();
        let result = validate(plan(vec![t]));
        assert_matches!(
            result,
            Err(PlanValidationError::MissingDescription { task }) if task == "t1"
        );
    }

    #[test]
    fn duplicate_id_rejected() {
        let result = validate(plan(vec![task("t1", &[]), task("t1", &[])]));
        assert_matches!(
            result,
            Err(PlanValidationError::DuplicateTaskId { task }) if task == "t1"
        );
    }

    #[test]
    fn zero_duration_rejected() {
        let mut t = task("t1", &[]);
        t.estimated_secs = 0.0;
        assert_matches!(
            validate(plan(vec![t])),
            Err(PlanValidationError::NonPositiveDuration { .. })
        );
    }

    #[test]
    fn unknown_dependency_rejected() {
        let result = validate(plan(vec![task("t1", &["ghost"])]));
        assert_matches!(
            result,
            Err(PlanValidationError::UnknownDependency { task, dependency })
                if task == "t1" && dependency == "ghost"
        );
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let result = validate(plan(vec![task("t1", &["t1"])]));
        assert_matches!(result, Err(PlanValidationError::Cycle { .. }));
    }

    #[test]
    fn two_task_cycle_rejected() {
        let result = validate(plan(vec![task("a", &["b"]), task("b", &["a"])]));
        assert_matches!(result, Err(PlanValidationError::Cycle { .. }));
    }

    #[test]
    fn long_cycle_rejected() {
        let result = validate(plan(vec![
            task("a", &["d"]),
            task("b", &["a"]),
            task("c", &["b"]),
            task("d", &["c"]),
        ]));
        assert_matches!(result, Err(PlanValidationError::Cycle { .. }));
    }

    #[test]
    fn shared_dependency_is_not_a_cycle() {
        // Two tasks depending on the same prerequisite must not be
        // mistaken for a back-edge.
        let result = validate(plan(vec![
            task("base", &[]),
            task("x", &["base"]),
            task("y", &["base"]),
        ]));
        assert!(result.is_ok());
    }
}
