//! Compilation entry point: resolve → lower → assemble.
//!
//! Each call is independent and performs no I/O; the first error aborts the
//! whole compilation.

use super::assembler;
use super::error::CompileError;
use super::planner;
use super::resolver::{self, SourceSet};
use super::types::*;

/// Compile `root` against the executables in `candidates`.
pub fn compile(
    root: &Executable,
    candidates: &SourceSet,
) -> Result<CompilationArtifact, CompileError> {
    let resolution = resolver::resolve(root, candidates)?;

    let root_plan = planner::plan_executable(resolution.root)?;

    let mut plans = Vec::with_capacity(
        resolution.dependencies.len() + resolution.branch_targets.len(),
    );
    for dep in &resolution.dependencies {
        plans.push(planner::plan_executable(dep)?);
    }
    for target in &resolution.branch_targets {
        plans.push(planner::plan_branch(target));
    }

    let artifact = assembler::assemble(root_plan, plans)?;

    tracing::info!(
        root = %root.name(),
        steps = artifact.execution_plan.len(),
        dependencies = artifact.dependencies.len(),
        "compiled"
    );

    Ok(artifact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parser::{into_executable, parse_source};

    fn load(yaml: &str) -> Executable {
        into_executable(&parse_source(yaml, "test").unwrap(), "test").unwrap()
    }

    const ROOT: &str = r#"
namespace: loops.parallel_loop
flow:
  name: parallel_loop_aggregate
  inputs:
    - name: values
  workflow:
    - name: print_values
      do: print_branch
      parallel_loop: {for: value, in: values}
      inputs:
        - name: ID
          value: ${value}
      publish:
        - {name: name, value: "${name}"}
        - {name: number, value: "${ int_output }"}
      aggregate:
        - {name: name_list, value: "${ map(lambda x:str(x['name']), branches_context) }"}
        - {name: number_from_last_branch, value: "${ branches_context[-1]['number'] }"}
      navigate:
        SUCCESS: print_list
    - name: print_list
      do: print_list
"#;

    const BRANCH_OP: &str = r#"
namespace: loops.parallel_loop
operation:
  name: print_branch
  inputs: [{name: ID}]
  outputs:
    - {name: name, value: "${name}"}
    - {name: int_output, value: "${int_output}"}
  action:
    script: "name = 'branch ' + ID"
"#;

    const LIST_OP: &str = r#"
namespace: loops.parallel_loop
operation:
  name: print_list
  action:
    class_name: io.flows.Print
    method_name: execute
"#;

    fn candidates() -> SourceSet {
        SourceSet::from_executables([load(BRANCH_OP), load(LIST_OP)]).unwrap()
    }

    #[test]
    fn test_compile_parallel_loop_flow() {
        let artifact = compile(&load(ROOT), &candidates()).unwrap();
        let plan = &artifact.execution_plan;

        assert_eq!(plan.plan_id, "loops.parallel_loop.parallel_loop_aggregate");
        assert_eq!(plan.steps.keys().copied().collect::<Vec<_>>(), vec![1, 2, 3, 4, 5, 6]);
        assert!(plan.step(2).unwrap().is_split_step());

        let keys: Vec<&str> = artifact.dependencies.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec![
                "branch:loops.parallel_loop.print_branch",
                "loops.parallel_loop.print_branch",
                "loops.parallel_loop.print_list",
            ]
        );
        let branch = &artifact.dependencies["branch:loops.parallel_loop.print_branch"];
        assert_eq!(branch.len(), 2);
    }

    #[test]
    fn test_compile_is_deterministic() {
        let root = load(ROOT);
        let first = compile(&root, &candidates()).unwrap();
        let second = compile(&root, &candidates()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_callable_returns_no_artifact() {
        let candidates = SourceSet::from_executables([load(BRANCH_OP)]).unwrap();
        let err = compile(&load(ROOT), &candidates).unwrap_err();
        assert!(matches!(err, CompileError::UnresolvedReference { ref reference, .. }
            if reference == "loops.parallel_loop.print_list"));
    }

    #[test]
    fn test_error_in_dependency_flow_aborts() {
        let sub = r#"
namespace: loops.parallel_loop
flow:
  name: print_list
  workflow:
    - name: bad
      do: print_branch
      navigate: {SUCCESS: nowhere}
"#;
        let candidates = SourceSet::from_executables([load(BRANCH_OP), load(sub)]).unwrap();
        let err = compile(&load(ROOT), &candidates).unwrap_err();
        assert!(matches!(err, CompileError::UnresolvedNavigation { ref flow, .. }
            if flow == "loops.parallel_loop.print_list"));
    }

    #[test]
    fn test_shared_branch_target_yields_one_branch_plan() {
        let root = r#"
namespace: loops.parallel_loop
flow:
  name: twice
  workflow:
    - name: first
      do: print_branch
      parallel_loop: {for: v, in: values}
    - name: second
      do: print_branch
      parallel_loop: {for: v, in: values}
"#;
        let artifact = compile(&load(root), &candidates()).unwrap();
        assert_eq!(artifact.execution_plan.len(), 9);
        let branch_plans = artifact
            .dependencies
            .values()
            .filter(|p| p.kind == PlanKind::Branch)
            .count();
        assert_eq!(branch_plans, 1);
    }

    #[test]
    fn test_compile_operation_root() {
        let artifact = compile(&load(BRANCH_OP), &SourceSet::new()).unwrap();
        assert_eq!(artifact.execution_plan.kind, PlanKind::Operation);
        assert!(artifact.dependencies.is_empty());
    }

    #[test]
    fn test_recursive_flow_compiles() {
        let root = r#"
namespace: app
flow:
  name: retry
  workflow:
    - name: again
      do: retry
"#;
        let artifact = compile(&load(root), &SourceSet::new()).unwrap();
        assert!(artifact.dependencies.is_empty());
        assert_eq!(
            artifact.execution_plan.step(2).unwrap().references(),
            vec!["app.retry"]
        );
    }
}
