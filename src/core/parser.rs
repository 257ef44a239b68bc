//! YAML source loading and structural validation.
//!
//! One source file declares one executable under a namespace:
//! - exactly one of `flow` / `operation`
//! - `do` references are expanded through `imports` aliases, the file's own
//!   namespace (bare names), or taken as fully qualified
//! - names must be unique per scope (steps, inputs, outputs, results)
//!
//! Expressions are opaque strings and are never inspected here.

use super::error::CompileError;
use super::types::*;
use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

// ============================================================================
// Source file format
// ============================================================================

/// Top-level YAML document.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SourceFile {
    /// Dotted namespace every executable in this file lives in
    pub namespace: String,

    /// Alias → namespace, usable as the first segment of a `do` reference
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub imports: IndexMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow: Option<FlowDef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<OperationDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct FlowDef {
    pub name: String,

    #[serde(default)]
    pub inputs: Vec<Input>,

    #[serde(default)]
    pub outputs: Vec<Output>,

    #[serde(default = "default_flow_results")]
    pub results: Vec<String>,

    pub workflow: Vec<StepDef>,

    /// Step run when a regular step fails
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_failure: Option<StepDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct OperationDef {
    pub name: String,

    #[serde(default)]
    pub inputs: Vec<Input>,

    #[serde(default)]
    pub outputs: Vec<Output>,

    #[serde(default = "default_operation_results")]
    pub results: Vec<ResultDef>,

    pub action: Action,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct StepDef {
    pub name: String,

    /// Callable to invoke: `alias.name`, `name`, or `namespace.name`
    #[serde(rename = "do")]
    pub reference: String,

    #[serde(default)]
    pub inputs: Vec<Argument>,

    #[serde(default, rename = "loop", skip_serializing_if = "Option::is_none")]
    pub loop_statement: Option<LoopStatement>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_loop: Option<ParallelLoopStatement>,

    #[serde(default)]
    pub publish: Vec<Output>,

    #[serde(default)]
    pub aggregate: Vec<Output>,

    /// Result → step name or flow result
    #[serde(default)]
    pub navigate: IndexMap<String, String>,

    /// Defaults to whether the step has a `parallel_loop`
    #[serde(default, rename = "async", skip_serializing_if = "Option::is_none")]
    pub is_async: Option<bool>,
}

fn default_flow_results() -> Vec<String> {
    vec![SUCCESS_RESULT.to_string(), FAILURE_RESULT.to_string()]
}

fn default_operation_results() -> Vec<ResultDef> {
    default_flow_results()
        .into_iter()
        .map(|name| ResultDef {
            name,
            condition: None,
        })
        .collect()
}

// ============================================================================
// Parsing
// ============================================================================

/// Parse a source file from disk.
pub fn parse_source_file(path: &Path) -> Result<SourceFile, CompileError> {
    let content = std::fs::read_to_string(path).map_err(|e| CompileError::Source {
        origin: path.display().to_string(),
        message: format!("failed to read: {}", e),
    })?;
    parse_source(&content, &path.display().to_string())
}

/// Parse a source file from a string. `origin` names it in errors.
pub fn parse_source(yaml: &str, origin: &str) -> Result<SourceFile, CompileError> {
    serde_yaml_ng::from_str(yaml).map_err(|e| CompileError::Source {
        origin: origin.to_string(),
        message: format!("YAML parse error: {}", e),
    })
}

/// Load, validate, and convert one source file.
pub fn load_executable(path: &Path) -> Result<Executable, CompileError> {
    let source = parse_source_file(path)?;
    into_executable(&source, &path.display().to_string())
}

/// Validate a parsed source and build its executable.
pub fn into_executable(source: &SourceFile, origin: &str) -> Result<Executable, CompileError> {
    let errors = validate_source(source);
    if !errors.is_empty() {
        return Err(CompileError::InvalidSource {
            origin: origin.to_string(),
            problems: errors.into_iter().map(|e| e.message).collect(),
        });
    }

    let invalid = |message: String| CompileError::invalid_source(origin, message);

    if let Some(flow) = &source.flow {
        let name = QualifiedName::new(&source.namespace, &flow.name).map_err(invalid)?;
        let steps = flow
            .workflow
            .iter()
            .map(|s| build_step(source, s))
            .collect::<Result<Vec<_>, _>>()
            .map_err(invalid)?;
        let on_failure = flow
            .on_failure
            .as_ref()
            .map(|s| build_step(source, s))
            .transpose()
            .map_err(invalid)?;

        return Ok(Executable::Flow(Flow {
            name,
            inputs: flow.inputs.clone(),
            outputs: flow.outputs.clone(),
            workflow: Workflow {
                steps,
                on_failure,
                results: flow.results.clone(),
            },
        }));
    }

    match &source.operation {
        Some(op) => Ok(Executable::Operation(Operation {
            name: QualifiedName::new(&source.namespace, &op.name).map_err(invalid)?,
            inputs: op.inputs.clone(),
            outputs: op.outputs.clone(),
            results: op.results.clone(),
            action: op.action.clone(),
        })),
        None => Err(invalid("source declares neither a flow nor an operation".into())),
    }
}

fn build_step(source: &SourceFile, def: &StepDef) -> Result<Step, String> {
    Ok(Step {
        name: def.name.clone(),
        reference: expand_reference(source, &def.reference)?,
        arguments: def.inputs.clone(),
        loop_statement: def.loop_statement.clone(),
        parallel_loop: def.parallel_loop.clone(),
        publish: def.publish.clone(),
        aggregate: def.aggregate.clone(),
        navigation: def.navigate.clone(),
        is_async: def.is_async.unwrap_or(def.parallel_loop.is_some()),
    })
}

/// Expand a `do` reference against the file's imports and namespace.
pub fn expand_reference(source: &SourceFile, raw: &str) -> Result<QualifiedName, String> {
    match raw.split_once('.') {
        None => QualifiedName::new(&source.namespace, raw),
        Some((head, rest)) => match source.imports.get(head) {
            Some(namespace) => format!("{}.{}", namespace, rest).parse(),
            None => raw.parse(),
        },
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Validate a parsed source. Returns a list of errors (empty = valid).
pub fn validate_source(source: &SourceFile) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut push = |message: String| errors.push(ValidationError { message });

    if source.namespace.split('.').any(|s| !is_segment(s)) {
        push(format!("invalid namespace '{}'", source.namespace));
    }
    for (alias, namespace) in &source.imports {
        if !is_segment(alias) {
            push(format!("invalid import alias '{}'", alias));
        }
        if namespace.split('.').any(|s| !is_segment(s)) {
            push(format!("import '{}' names invalid namespace '{}'", alias, namespace));
        }
    }

    match (&source.flow, &source.operation) {
        (Some(_), Some(_)) => push("source declares both a flow and an operation".into()),
        (None, None) => push("source declares neither a flow nor an operation".into()),
        (Some(flow), None) => validate_flow(source, flow, &mut push),
        (None, Some(op)) => validate_operation(op, &mut push),
    }

    errors
}

fn validate_flow(source: &SourceFile, flow: &FlowDef, push: &mut impl FnMut(String)) {
    if !is_segment(&flow.name) {
        push(format!("invalid flow name '{}'", flow.name));
    }
    if flow.workflow.is_empty() {
        push(format!("flow '{}' has no steps", flow.name));
    }

    let all_steps = flow.workflow.iter().chain(flow.on_failure.iter());
    for step in all_steps.clone() {
        if step.name.is_empty() {
            push("step name must not be empty".into());
        }
        if let Err(e) = expand_reference(source, &step.reference) {
            push(format!("step '{}': {}", step.name, e));
        }
        for dup in duplicates(step.inputs.iter().map(|a| a.name.as_str())) {
            push(format!("step '{}' binds input '{}' twice", step.name, dup));
        }
    }

    for dup in duplicates(all_steps.map(|s| s.name.as_str())) {
        push(format!("duplicate step name '{}'", dup));
    }
    check_names("input", flow.inputs.iter().map(|i| i.name.as_str()), push);
    check_names("output", flow.outputs.iter().map(|o| o.name.as_str()), push);
    check_names("result", flow.results.iter().map(String::as_str), push);
    if flow.results.is_empty() {
        push(format!("flow '{}' declares no results", flow.name));
    }
}

fn validate_operation(op: &OperationDef, push: &mut impl FnMut(String)) {
    if !is_segment(&op.name) {
        push(format!("invalid operation name '{}'", op.name));
    }
    check_names("input", op.inputs.iter().map(|i| i.name.as_str()), push);
    check_names("output", op.outputs.iter().map(|o| o.name.as_str()), push);
    check_names("result", op.results.iter().map(|r| r.name.as_str()), push);
    if op.results.is_empty() {
        push(format!("operation '{}' declares no results", op.name));
    }
}

fn check_names<'a>(
    what: &str,
    names: impl Iterator<Item = &'a str> + Clone,
    push: &mut impl FnMut(String),
) {
    for name in names.clone() {
        if name.is_empty() {
            push(format!("{} name must not be empty", what));
        }
    }
    for dup in duplicates(names) {
        push(format!("duplicate {} name '{}'", what, dup));
    }
}

fn duplicates<'a>(names: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut seen = FxHashSet::default();
    let mut reported = FxHashSet::default();
    names
        .filter(|n| !seen.insert(*n) && reported.insert(*n))
        .collect()
}

fn is_segment(s: &str) -> bool {
    QualifiedName::new("ns", s).is_ok()
}
