//! Step lowering: turn one executable into a flat, numbered execution plan.
//!
//! Flow plans are built in two passes. The first pass walks the workflow in
//! declaration order and reserves an entry id for every step name (one id for
//! ordinary and sequential-loop steps, four for parallel-loop steps). The second
//! pass materializes instructions, resolving every navigation target through
//! that symbol table, so forward references need no fix-ups.
//!
//! Id layout of a flow plan:
//!
//! ```text
//! 0        terminal sentinel (never a step)
//! 1        flow-begin
//! 2..      workflow steps in declaration order, then on_failure
//! N..N+3   split, branch-begin, branch-end, join   (parallel-loop step)
//! ```

use super::error::CompileError;
use super::types::*;
use rustc_hash::FxHashMap;

/// Lower any executable into its plan.
pub fn plan_executable(executable: &Executable) -> Result<ExecutionPlan, CompileError> {
    match executable {
        Executable::Operation(op) => Ok(plan_operation(op)),
        Executable::Flow(flow) => plan_flow(flow),
    }
}

/// Lower an operation into its fixed begin → action → end plan.
pub fn plan_operation(op: &Operation) -> ExecutionPlan {
    let name = op.name.name().to_string();
    let begin = BEGIN_STEP_ID;
    let action = begin + 1;
    let end = begin + 2;

    let steps = [
        ExecutionStep {
            step_id: begin,
            name: name.clone(),
            action: StepAction::OperationBegin {
                inputs: op.inputs.clone(),
                next_step_id: action,
            },
        },
        ExecutionStep {
            step_id: action,
            name: name.clone(),
            action: StepAction::RunAction {
                action: op.action.clone(),
                next_step_id: end,
            },
        },
        ExecutionStep {
            step_id: end,
            name: name.clone(),
            action: StepAction::OperationEnd {
                outputs: op.outputs.clone(),
                results: op.results.clone(),
            },
        },
    ];

    tracing::debug!(operation = %op.name, "lowered operation");

    ExecutionPlan {
        plan_id: op.name.to_string(),
        name,
        kind: PlanKind::Operation,
        begin_step_id: begin,
        steps: steps.into_iter().map(|s| (s.step_id, s)).collect(),
        outputs: op.outputs.clone(),
        results: op.results.iter().map(|r| r.name.clone()).collect(),
    }
}

/// Build the two-step body plan one parallel-loop branch runs for `target`.
pub fn plan_branch(target: &QualifiedName) -> ExecutionPlan {
    let begin = BEGIN_STEP_ID;
    let end = begin + 1;
    let name = target.name().to_string();

    let steps = [
        ExecutionStep {
            step_id: begin,
            name: name.clone(),
            action: StepAction::BranchBodyBegin {
                reference: target.clone(),
                next_step_id: end,
            },
        },
        ExecutionStep {
            step_id: end,
            name: name.clone(),
            action: StepAction::BranchBodyEnd {
                reference: target.clone(),
            },
        },
    ];

    ExecutionPlan {
        plan_id: target.branch_plan_key(),
        name,
        kind: PlanKind::Branch,
        begin_step_id: begin,
        steps: steps.into_iter().map(|s| (s.step_id, s)).collect(),
        outputs: Vec::new(),
        results: vec![SUCCESS_RESULT.to_string(), FAILURE_RESULT.to_string()],
    }
}

/// Lower a flow's workflow.
pub fn plan_flow(flow: &Flow) -> Result<ExecutionPlan, CompileError> {
    let workflow = &flow.workflow;
    let Some(first) = workflow.steps.first() else {
        return Err(CompileError::invalid_source(
            flow.name.to_string(),
            "flow has no steps",
        ));
    };

    let lowering = FlowLowering::new(flow)?;
    let mut steps = std::collections::BTreeMap::new();

    steps.insert(
        BEGIN_STEP_ID,
        ExecutionStep {
            step_id: BEGIN_STEP_ID,
            name: flow.name.name().to_string(),
            action: StepAction::FlowBegin {
                inputs: flow.inputs.clone(),
                next_step_id: lowering.entry_id(&first.name),
            },
        },
    );

    for (idx, step) in workflow.steps.iter().enumerate() {
        let has_successor = idx + 1 < workflow.steps.len();
        for instruction in lowering.lower_step(step, has_successor, false)? {
            steps.insert(instruction.step_id, instruction);
        }
    }
    if let Some(on_failure) = &workflow.on_failure {
        for instruction in lowering.lower_step(on_failure, false, true)? {
            steps.insert(instruction.step_id, instruction);
        }
    }

    tracing::debug!(flow = %flow.name, steps = steps.len(), "lowered flow");

    Ok(ExecutionPlan {
        plan_id: flow.name.to_string(),
        name: flow.name.name().to_string(),
        kind: PlanKind::Flow,
        begin_step_id: BEGIN_STEP_ID,
        steps,
        outputs: flow.outputs.clone(),
        results: workflow.results.clone(),
    })
}

/// Reject steps whose loop declarations contradict each other.
pub fn validate_loop_configuration(flow: &QualifiedName, step: &Step) -> Result<(), CompileError> {
    let reason = if step.loop_statement.is_some() && step.parallel_loop.is_some() {
        Some("declares both loop and parallel_loop".to_string())
    } else if step.is_async && step.parallel_loop.is_none() {
        Some("is marked async but has no parallel_loop".to_string())
    } else if !step.is_async && step.parallel_loop.is_some() {
        Some("has a parallel_loop but is marked synchronous".to_string())
    } else if !step.aggregate.is_empty() && step.parallel_loop.is_none() {
        Some("declares aggregate bindings without a parallel_loop".to_string())
    } else if step
        .loop_statement
        .as_ref()
        .is_some_and(|l| l.break_on.iter().any(|r| r.is_empty()))
    {
        Some("loop break results must not be empty".to_string())
    } else {
        None
    };

    match reason {
        Some(reason) => Err(CompileError::InvalidLoopConfiguration {
            flow: flow.to_string(),
            step: step.name.clone(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Symbol table and navigation resolution for one flow.
struct FlowLowering<'a> {
    flow: &'a Flow,
    symbols: FxHashMap<&'a str, StepId>,
    on_failure_id: Option<StepId>,
}

impl<'a> FlowLowering<'a> {
    /// First pass: validate every step and reserve its entry id.
    fn new(flow: &'a Flow) -> Result<Self, CompileError> {
        let mut symbols = FxHashMap::default();
        let mut next_id = FIRST_WORKFLOW_STEP_ID;

        for step in flow.workflow.all_steps() {
            validate_loop_configuration(&flow.name, step)?;
            if symbols.insert(step.name.as_str(), next_id).is_some() {
                return Err(CompileError::invalid_source(
                    flow.name.to_string(),
                    format!("duplicate step name '{}'", step.name),
                ));
            }
            next_id += step.width();
        }

        let on_failure_id = flow
            .workflow
            .on_failure
            .as_ref()
            .and_then(|s| symbols.get(s.name.as_str()).copied());

        Ok(Self {
            flow,
            symbols,
            on_failure_id,
        })
    }

    fn entry_id(&self, name: &str) -> StepId {
        self.symbols
            .get(name)
            .copied()
            .unwrap_or(TERMINAL_STEP_ID)
    }

    /// Second pass for one step: emit its instruction(s).
    fn lower_step(
        &self,
        step: &Step,
        has_successor: bool,
        is_on_failure: bool,
    ) -> Result<Vec<ExecutionStep>, CompileError> {
        let id = self.entry_id(&step.name);
        let successor = has_successor.then_some(id + step.width());
        let navigation = self.navigation(step, successor, is_on_failure)?;

        let Some(parallel_loop) = &step.parallel_loop else {
            return Ok(vec![ExecutionStep {
                step_id: id,
                name: step.name.clone(),
                action: StepAction::Invoke {
                    reference: step.reference.clone(),
                    arguments: step.arguments.clone(),
                    loop_statement: step.loop_statement.clone(),
                    publish: step.publish.clone(),
                    navigation,
                },
            }]);
        };

        let (split, branch_begin, branch_end, join) = (id, id + 1, id + 2, id + 3);
        let instruction = |step_id, action| ExecutionStep {
            step_id,
            name: step.name.clone(),
            action,
        };

        Ok(vec![
            instruction(
                split,
                StepAction::Split {
                    parallel_loop: parallel_loop.clone(),
                    branch_plan: step.reference.branch_plan_key(),
                    ordering: BranchOrdering::IterationIndex,
                    next_step_id: branch_begin,
                },
            ),
            instruction(
                branch_begin,
                StepAction::BranchBegin {
                    reference: step.reference.clone(),
                    arguments: step.arguments.clone(),
                    next_step_id: branch_end,
                },
            ),
            instruction(
                branch_end,
                StepAction::BranchEnd {
                    reference: step.reference.clone(),
                    publish: step.publish.clone(),
                },
            ),
            instruction(
                join,
                StepAction::Join {
                    aggregate: step.aggregate.clone(),
                    ordering: BranchOrdering::IterationIndex,
                    navigation,
                },
            ),
        ])
    }

    /// Explicit entries in declaration order, then implicit SUCCESS/FAILURE.
    fn navigation(
        &self,
        step: &Step,
        successor: Option<StepId>,
        is_on_failure: bool,
    ) -> Result<NavigationMap, CompileError> {
        let mut navigation = NavigationMap::new();
        for (result, target) in &step.navigation {
            let resolved = self.resolve(step, result, target, is_on_failure)?;
            navigation.insert(result.clone(), resolved);
        }

        if !navigation.contains_key(SUCCESS_RESULT) {
            let resolved = match successor {
                Some(next) => ResultNavigation::step(next),
                None if is_on_failure => {
                    self.resolve(step, SUCCESS_RESULT, FAILURE_RESULT, true)?
                }
                None => self.resolve(step, SUCCESS_RESULT, SUCCESS_RESULT, false)?,
            };
            navigation.insert(SUCCESS_RESULT.to_string(), resolved);
        }
        if !navigation.contains_key(FAILURE_RESULT) {
            let resolved = self.resolve(step, FAILURE_RESULT, FAILURE_RESULT, is_on_failure)?;
            navigation.insert(FAILURE_RESULT.to_string(), resolved);
        }

        Ok(navigation)
    }

    /// Step names win over result names; FAILURE is redirected to on_failure.
    fn resolve(
        &self,
        step: &Step,
        result: &str,
        target: &str,
        from_on_failure: bool,
    ) -> Result<ResultNavigation, CompileError> {
        if let Some(&id) = self.symbols.get(target) {
            return Ok(ResultNavigation::step(id));
        }
        if self.flow.workflow.declares_result(target) {
            if target == FAILURE_RESULT && !from_on_failure {
                if let Some(id) = self.on_failure_id {
                    return Ok(ResultNavigation::step(id));
                }
            }
            return Ok(ResultNavigation::terminal(target));
        }
        Err(CompileError::UnresolvedNavigation {
            flow: self.flow.name.to_string(),
            step: step.name.clone(),
            result: result.to_string(),
            target: target.to_string(),
        })
    }
}
