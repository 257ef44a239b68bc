//! Runtime wire form of plans: typed instructions rendered as `actionData` maps.
//!
//! Inside the compiler every instruction is a [`StepAction`] variant; a
//! runtime only sees the flat, keyed form produced here. Concepts an
//! instruction does not carry are omitted, except `isSplitStep` and
//! `isAsync`, which are always present.

use super::fingerprint;
use super::types::*;
use serde_json::{json, Map, Value};

pub const ROLE: &str = "role";
pub const INPUTS: &str = "inputs";
pub const ACTION_REFERENCE: &str = "action-reference";
pub const NAVIGATION_MAP: &str = "navigation-map";
pub const PUBLISH_BINDINGS: &str = "publish-bindings";
pub const AGGREGATE_BINDINGS: &str = "aggregate-bindings";
pub const LOOP_STATEMENT: &str = "loop-statement";
pub const PARALLEL_LOOP_STATEMENT: &str = "parallel-loop-statement";
pub const BRANCH_PLAN: &str = "branch-plan";
pub const BRANCH_ORDERING: &str = "branch-ordering";
pub const RESULT_POLICY: &str = "result-policy";
pub const AGGREGATION_CONTEXT: &str = "aggregation-context";
pub const NEXT_STEP_ID: &str = "next-step-id";
pub const ACTION: &str = "action";
pub const OUTPUTS: &str = "outputs";
pub const RESULTS: &str = "results";
pub const IS_SPLIT_STEP: &str = "isSplitStep";
pub const IS_ASYNC: &str = "isAsync";

/// Join outcome: SUCCESS only when every branch succeeded.
pub const ALL_SUCCESS_POLICY: &str = "all-success";

/// Render one instruction's `actionData`.
pub fn action_data(step: &ExecutionStep) -> Map<String, Value> {
    let mut data = Map::new();
    data.insert(ROLE.into(), json!(step.action.role()));

    match &step.action {
        StepAction::FlowBegin {
            inputs,
            next_step_id,
        }
        | StepAction::OperationBegin {
            inputs,
            next_step_id,
        } => {
            data.insert(INPUTS.into(), json!(inputs));
            data.insert(NEXT_STEP_ID.into(), json!(next_step_id));
        }
        StepAction::Invoke {
            reference,
            arguments,
            loop_statement,
            publish,
            navigation,
        } => {
            data.insert(INPUTS.into(), json!(arguments));
            data.insert(ACTION_REFERENCE.into(), json!(reference));
            if let Some(stmt) = loop_statement {
                data.insert(LOOP_STATEMENT.into(), json!(stmt));
            }
            data.insert(PUBLISH_BINDINGS.into(), json!(publish));
            data.insert(NAVIGATION_MAP.into(), navigation_map(navigation));
        }
        StepAction::Split {
            parallel_loop,
            branch_plan,
            ordering,
            next_step_id,
        } => {
            data.insert(PARALLEL_LOOP_STATEMENT.into(), json!(parallel_loop));
            data.insert(BRANCH_PLAN.into(), json!(branch_plan));
            data.insert(BRANCH_ORDERING.into(), json!(ordering));
            data.insert(NEXT_STEP_ID.into(), json!(next_step_id));
        }
        StepAction::BranchBegin {
            reference,
            arguments,
            next_step_id,
        } => {
            data.insert(INPUTS.into(), json!(arguments));
            data.insert(ACTION_REFERENCE.into(), json!(reference));
            data.insert(NEXT_STEP_ID.into(), json!(next_step_id));
        }
        StepAction::BranchEnd { reference, publish } => {
            data.insert(ACTION_REFERENCE.into(), json!(reference));
            data.insert(PUBLISH_BINDINGS.into(), json!(publish));
        }
        StepAction::Join {
            aggregate,
            ordering,
            navigation,
        } => {
            data.insert(AGGREGATE_BINDINGS.into(), json!(aggregate));
            data.insert(AGGREGATION_CONTEXT.into(), json!(BRANCHES_CONTEXT));
            data.insert(BRANCH_ORDERING.into(), json!(ordering));
            data.insert(RESULT_POLICY.into(), json!(ALL_SUCCESS_POLICY));
            data.insert(NAVIGATION_MAP.into(), navigation_map(navigation));
        }
        StepAction::RunAction {
            action,
            next_step_id,
        } => {
            data.insert(ACTION.into(), json!(action));
            data.insert(NEXT_STEP_ID.into(), json!(next_step_id));
        }
        StepAction::OperationEnd { outputs, results } => {
            data.insert(OUTPUTS.into(), json!(outputs));
            data.insert(RESULTS.into(), json!(results));
        }
        StepAction::BranchBodyBegin {
            reference,
            next_step_id,
        } => {
            data.insert(ACTION_REFERENCE.into(), json!(reference));
            data.insert(NEXT_STEP_ID.into(), json!(next_step_id));
        }
        StepAction::BranchBodyEnd { reference } => {
            data.insert(ACTION_REFERENCE.into(), json!(reference));
        }
    }

    data.insert(IS_SPLIT_STEP.into(), json!(step.is_split_step()));
    data.insert(IS_ASYNC.into(), json!(step.is_async()));
    data
}

fn navigation_map(navigation: &NavigationMap) -> Value {
    let map: Map<String, Value> = navigation
        .iter()
        .map(|(result, nav)| {
            (
                result.clone(),
                json!({
                    "nextStepId": nav.next_step_id,
                    "presetResult": nav.preset_result,
                }),
            )
        })
        .collect();
    Value::Object(map)
}

/// Render one plan.
pub fn plan_to_json(plan: &ExecutionPlan) -> Value {
    let steps: Map<String, Value> = plan
        .steps
        .values()
        .map(|step| {
            (
                step.step_id.to_string(),
                json!({
                    "stepId": step.step_id,
                    "name": step.name,
                    "actionData": action_data(step),
                }),
            )
        })
        .collect();

    json!({
        "planId": plan.plan_id,
        "name": plan.name,
        "kind": plan.kind.to_string(),
        "beginStepId": plan.begin_step_id,
        "outputs": plan.outputs,
        "results": plan.results,
        "steps": steps,
    })
}

/// Root plan plus dependencies, without the fingerprint.
pub fn runtime_json(artifact: &CompilationArtifact) -> Value {
    let dependencies: Map<String, Value> = artifact
        .dependencies
        .iter()
        .map(|(name, plan)| (name.clone(), plan_to_json(plan)))
        .collect();

    json!({
        "executionPlan": plan_to_json(&artifact.execution_plan),
        "dependencies": dependencies,
    })
}

/// The document handed to a runtime: runtime JSON plus its fingerprint.
pub fn artifact_document(artifact: &CompilationArtifact) -> Value {
    let mut doc = runtime_json(artifact);
    let fp = fingerprint::fingerprint_json(&doc);
    if let Value::Object(map) = &mut doc {
        map.insert("fingerprint".into(), json!(fp));
    }
    doc
}
