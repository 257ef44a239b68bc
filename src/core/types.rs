//! Source model and execution plan types.
//!
//! The source model (`Executable`, `Flow`, `Workflow`, `Step`, bindings) is the
//! typed, read-only input of a compilation. The plan types (`ExecutionStep`,
//! `ExecutionPlan`, `CompilationArtifact`) are its output: flat, numerically
//! addressed instructions for an external scheduler.

use indexmap::IndexMap;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

// ============================================================================
// Constants
// ============================================================================

/// Result name of a successful invocation.
pub const SUCCESS_RESULT: &str = "SUCCESS";

/// Result name of a failed invocation.
pub const FAILURE_RESULT: &str = "FAILURE";

/// Plan step id.
pub type StepId = i64;

/// Sentinel id meaning "the plan is complete"; never a real plan step.
pub const TERMINAL_STEP_ID: StepId = 0;

/// Id of the first instruction of every plan.
pub const BEGIN_STEP_ID: StepId = 1;

/// Id of the first lowered workflow step in a flow plan.
pub const FIRST_WORKFLOW_STEP_ID: StepId = 2;

/// Number of instructions a parallel-loop step lowers to.
pub const PARALLEL_LOOP_WIDTH: StepId = 4;

/// Prefix of the dependency key under which a branch-body plan is registered.
pub const BRANCH_PLAN_PREFIX: &str = "branch:";

/// Evaluation-context name exposing the ordered branch outputs to aggregate bindings.
pub const BRANCHES_CONTEXT: &str = "branches_context";

fn default_results() -> Vec<String> {
    vec![SUCCESS_RESULT.to_string(), FAILURE_RESULT.to_string()]
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Qualified names
// ============================================================================

static SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").expect("static regex"));

/// Namespace-qualified executable name, e.g. `io.examples.print`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QualifiedName {
    namespace: String,
    name: String,
}

impl QualifiedName {
    /// Build a qualified name from a (possibly dotted) namespace and a simple name.
    pub fn new(namespace: &str, name: &str) -> Result<Self, String> {
        if !SEGMENT.is_match(name) {
            return Err(format!("invalid executable name '{}'", name));
        }
        if namespace.split('.').any(|s| !SEGMENT.is_match(s)) {
            return Err(format!("invalid namespace '{}'", namespace));
        }
        Ok(Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dependency key of the branch-body plan that wraps this callable.
    pub fn branch_plan_key(&self) -> String {
        format!("{}{}", BRANCH_PLAN_PREFIX, self)
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.name)
    }
}

impl FromStr for QualifiedName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, name) = s
            .rsplit_once('.')
            .ok_or_else(|| format!("'{}' is not namespace-qualified", s))?;
        Self::new(namespace, name)
    }
}

impl TryFrom<String> for QualifiedName {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<QualifiedName> for String {
    fn from(value: QualifiedName) -> Self {
        value.to_string()
    }
}

impl JsonSchema for QualifiedName {
    fn schema_name() -> String {
        "QualifiedName".to_string()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        String::json_schema(gen)
    }
}

// ============================================================================
// Bindings
// ============================================================================

/// Declared input of a flow or operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Input {
    pub name: String,

    /// Default expression, used when the caller provides nothing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,

    #[serde(default = "default_true")]
    pub required: bool,

    /// Private inputs cannot be overridden by callers
    #[serde(default)]
    pub private: bool,
}

/// Input binding passed by a step to the callable it invokes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Argument {
    pub name: String,

    /// Expression; `None` binds the context variable of the same name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Named output expression (publish, aggregate, or executable output).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Output {
    pub name: String,
    pub value: String,
}

impl Output {
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

/// Declared result of an operation, optionally guarded by a condition expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ResultDef {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

// ============================================================================
// Loops
// ============================================================================

/// Sequential loop: the step is re-entered once per element of `expression`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LoopStatement {
    #[serde(rename = "for")]
    pub var_name: String,

    #[serde(rename = "in")]
    pub expression: String,

    /// Results that end the iteration early
    #[serde(rename = "break", default = "default_break_on")]
    pub break_on: Vec<String>,
}

fn default_break_on() -> Vec<String> {
    vec![FAILURE_RESULT.to_string()]
}

/// Parallel loop: every element of `expression` becomes an independent branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ParallelLoopStatement {
    #[serde(rename = "for")]
    pub var_name: String,

    #[serde(rename = "in")]
    pub expression: String,
}

// ============================================================================
// Executables
// ============================================================================

/// What an operation runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Action {
    Script { script: String },
    Native { class_name: String, method_name: String },
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Script { .. } => write!(f, "script"),
            Self::Native {
                class_name,
                method_name,
            } => write!(f, "native {}#{}", class_name, method_name),
        }
    }
}

/// Leaf executable invoking one external action.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub name: QualifiedName,
    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,
    pub results: Vec<ResultDef>,
    pub action: Action,
}

/// Executable composed of an ordered workflow of steps.
#[derive(Debug, Clone, PartialEq)]
pub struct Flow {
    pub name: QualifiedName,
    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,
    pub workflow: Workflow,
}

/// Ordered steps of a flow plus its declared results.
#[derive(Debug, Clone, PartialEq)]
pub struct Workflow {
    pub steps: Vec<Step>,

    /// Step run when any regular step ends the flow with `FAILURE`
    pub on_failure: Option<Step>,

    pub results: Vec<String>,
}

impl Workflow {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            on_failure: None,
            results: default_results(),
        }
    }

    /// All steps in lowering order: regular steps, then `on_failure`.
    pub fn all_steps(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter().chain(self.on_failure.iter())
    }

    pub fn declares_result(&self, name: &str) -> bool {
        self.results.iter().any(|r| r == name)
    }
}

/// One workflow node.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub name: String,

    /// Callable this step invokes
    pub reference: QualifiedName,

    pub arguments: Vec<Argument>,
    pub loop_statement: Option<LoopStatement>,
    pub parallel_loop: Option<ParallelLoopStatement>,

    /// Evaluated once per completed invocation (per branch for parallel loops)
    pub publish: Vec<Output>,

    /// Evaluated once over all branch outputs (parallel loops only)
    pub aggregate: Vec<Output>,

    /// Result name → step name or declared result, in declaration order
    pub navigation: IndexMap<String, String>,

    pub is_async: bool,
}

impl Step {
    /// Plain step invoking `reference`, with no bindings or navigation.
    pub fn new(name: &str, reference: QualifiedName) -> Self {
        Self {
            name: name.to_string(),
            reference,
            arguments: Vec::new(),
            loop_statement: None,
            parallel_loop: None,
            publish: Vec::new(),
            aggregate: Vec::new(),
            navigation: IndexMap::new(),
            is_async: false,
        }
    }

    /// Number of plan instructions this step lowers to.
    pub fn width(&self) -> StepId {
        if self.parallel_loop.is_some() {
            PARALLEL_LOOP_WIDTH
        } else {
            1
        }
    }
}

/// A compilable unit: an operation or a flow.
#[derive(Debug, Clone, PartialEq)]
pub enum Executable {
    Operation(Operation),
    Flow(Flow),
}

impl Executable {
    pub fn name(&self) -> &QualifiedName {
        match self {
            Self::Operation(op) => &op.name,
            Self::Flow(flow) => &flow.name,
        }
    }

    pub fn inputs(&self) -> &[Input] {
        match self {
            Self::Operation(op) => &op.inputs,
            Self::Flow(flow) => &flow.inputs,
        }
    }

    pub fn outputs(&self) -> &[Output] {
        match self {
            Self::Operation(op) => &op.outputs,
            Self::Flow(flow) => &flow.outputs,
        }
    }

    pub fn result_names(&self) -> Vec<String> {
        match self {
            Self::Operation(op) => op.results.iter().map(|r| r.name.clone()).collect(),
            Self::Flow(flow) => flow.workflow.results.clone(),
        }
    }

    pub fn workflow(&self) -> Option<&Workflow> {
        match self {
            Self::Operation(_) => None,
            Self::Flow(flow) => Some(&flow.workflow),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Operation(_) => "operation",
            Self::Flow(_) => "flow",
        }
    }
}

// ============================================================================
// Plan
// ============================================================================

/// Where a result leads: another step of the same plan, or plan completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultNavigation {
    pub next_step_id: StepId,

    /// Result the plan completes with; set only when `next_step_id` is terminal
    pub preset_result: Option<String>,
}

impl ResultNavigation {
    pub fn step(next_step_id: StepId) -> Self {
        Self {
            next_step_id,
            preset_result: None,
        }
    }

    pub fn terminal(result: &str) -> Self {
        Self {
            next_step_id: TERMINAL_STEP_ID,
            preset_result: Some(result.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.next_step_id == TERMINAL_STEP_ID
    }
}

/// Resolved navigation of one instruction, in declaration order.
pub type NavigationMap = IndexMap<String, ResultNavigation>;

/// Contract for the order in which branch outputs reach aggregate bindings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BranchOrdering {
    /// Outputs are sorted by the branch's zero-based position in the iterable
    #[default]
    IterationIndex,
}

impl fmt::Display for BranchOrdering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IterationIndex => write!(f, "iteration-index"),
        }
    }
}

/// Typed payload of one plan instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "kebab-case")]
pub enum StepAction {
    /// Flow entry bookkeeping: binds flow inputs.
    FlowBegin {
        inputs: Vec<Input>,
        next_step_id: StepId,
    },
    /// Ordinary or sequential-loop step invoking a callable.
    Invoke {
        reference: QualifiedName,
        arguments: Vec<Argument>,
        loop_statement: Option<LoopStatement>,
        publish: Vec<Output>,
        navigation: NavigationMap,
    },
    /// Fan-out marker of a parallel loop.
    Split {
        parallel_loop: ParallelLoopStatement,
        branch_plan: String,
        ordering: BranchOrdering,
        next_step_id: StepId,
    },
    /// First instruction of every branch: binds arguments and invokes the callable.
    BranchBegin {
        reference: QualifiedName,
        arguments: Vec<Argument>,
        next_step_id: StepId,
    },
    /// Last instruction of every branch: publishes that branch's outputs.
    BranchEnd {
        reference: QualifiedName,
        publish: Vec<Output>,
    },
    /// Fan-in after all branches: aggregates and navigates once.
    Join {
        aggregate: Vec<Output>,
        ordering: BranchOrdering,
        navigation: NavigationMap,
    },
    /// Operation entry: binds operation inputs.
    OperationBegin {
        inputs: Vec<Input>,
        next_step_id: StepId,
    },
    /// Runs the operation's action.
    RunAction { action: Action, next_step_id: StepId },
    /// Operation exit: binds outputs and selects a result.
    OperationEnd {
        outputs: Vec<Output>,
        results: Vec<ResultDef>,
    },
    /// Branch-body entry: invokes the branch callable for one element.
    BranchBodyBegin {
        reference: QualifiedName,
        next_step_id: StepId,
    },
    /// Branch-body exit: hands the branch result back to the join.
    BranchBodyEnd { reference: QualifiedName },
}

impl StepAction {
    /// Stable role name, as exposed to the runtime.
    pub fn role(&self) -> &'static str {
        match self {
            Self::FlowBegin { .. } => "flow-begin",
            Self::Invoke { .. } => "invoke",
            Self::Split { .. } => "split",
            Self::BranchBegin { .. } => "branch-begin",
            Self::BranchEnd { .. } => "branch-end",
            Self::Join { .. } => "join",
            Self::OperationBegin { .. } => "operation-begin",
            Self::RunAction { .. } => "run-action",
            Self::OperationEnd { .. } => "operation-end",
            Self::BranchBodyBegin { .. } => "branch-body-begin",
            Self::BranchBodyEnd { .. } => "branch-body-end",
        }
    }
}

/// One numbered, immutable plan instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStep {
    pub step_id: StepId,
    pub name: String,
    pub action: StepAction,
}

impl ExecutionStep {
    pub fn is_split_step(&self) -> bool {
        matches!(self.action, StepAction::Split { .. })
    }

    /// True for every instruction produced by a parallel-loop step.
    pub fn is_async(&self) -> bool {
        matches!(
            self.action,
            StepAction::Split { .. }
                | StepAction::BranchBegin { .. }
                | StepAction::BranchEnd { .. }
                | StepAction::Join { .. }
        )
    }

    pub fn navigation(&self) -> Option<&NavigationMap> {
        match &self.action {
            StepAction::Invoke { navigation, .. } | StepAction::Join { navigation, .. } => {
                Some(navigation)
            }
            _ => None,
        }
    }

    /// Every step id this instruction can hand control to (terminal excluded).
    pub fn successors(&self) -> Vec<StepId> {
        match &self.action {
            StepAction::FlowBegin { next_step_id, .. }
            | StepAction::Split { next_step_id, .. }
            | StepAction::BranchBegin { next_step_id, .. }
            | StepAction::OperationBegin { next_step_id, .. }
            | StepAction::RunAction { next_step_id, .. }
            | StepAction::BranchBodyBegin { next_step_id, .. } => vec![*next_step_id],
            StepAction::Invoke { navigation, .. } | StepAction::Join { navigation, .. } => {
                navigation
                    .values()
                    .filter(|n| !n.is_terminal())
                    .map(|n| n.next_step_id)
                    .collect()
            }
            StepAction::BranchEnd { .. }
            | StepAction::OperationEnd { .. }
            | StepAction::BranchBodyEnd { .. } => Vec::new(),
        }
    }

    /// Qualified names of plans this instruction needs at runtime.
    pub fn references(&self) -> Vec<String> {
        match &self.action {
            StepAction::Invoke { reference, .. }
            | StepAction::BranchBegin { reference, .. }
            | StepAction::BranchEnd { reference, .. }
            | StepAction::BranchBodyBegin { reference, .. }
            | StepAction::BranchBodyEnd { reference } => vec![reference.to_string()],
            StepAction::Split { branch_plan, .. } => vec![branch_plan.clone()],
            _ => Vec::new(),
        }
    }
}

/// What an execution plan was compiled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanKind {
    Flow,
    Operation,
    Branch,
}

impl fmt::Display for PlanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flow => write!(f, "flow"),
            Self::Operation => write!(f, "operation"),
            Self::Branch => write!(f, "branch"),
        }
    }
}

/// Compiled, flat form of one executable (or of one synthesized branch body).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Qualified name, or branch-plan key
    pub plan_id: String,
    pub name: String,
    pub kind: PlanKind,
    pub begin_step_id: StepId,
    pub steps: BTreeMap<StepId, ExecutionStep>,

    /// Bound when the plan completes through the terminal sentinel
    pub outputs: Vec<Output>,
    pub results: Vec<String>,
}

impl ExecutionPlan {
    pub fn step(&self, id: StepId) -> Option<&ExecutionStep> {
        self.steps.get(&id)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Root plan plus every transitively reachable plan, keyed by qualified name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompilationArtifact {
    pub execution_plan: ExecutionPlan,
    pub dependencies: BTreeMap<String, ExecutionPlan>,
}

impl CompilationArtifact {
    /// Look up a plan by id, including the root.
    pub fn plan(&self, plan_id: &str) -> Option<&ExecutionPlan> {
        if self.execution_plan.plan_id == plan_id {
            return Some(&self.execution_plan);
        }
        self.dependencies.get(plan_id)
    }

    /// Root first, then dependencies in key order.
    pub fn plans(&self) -> impl Iterator<Item = &ExecutionPlan> {
        std::iter::once(&self.execution_plan).chain(self.dependencies.values())
    }
}

// ============================================================================
// Tests
// ============================================================================
