//! Reference resolution: discover every executable a root transitively calls.
//!
//! Breadth-first worklist over qualified names with a visited set. Cycles
//! (including a flow calling itself) are legal and simply stop the walk.

use super::error::CompileError;
use super::types::*;
use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use std::collections::{BTreeSet, VecDeque};

/// Candidate executables available to satisfy references, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct SourceSet {
    executables: IndexMap<QualifiedName, Executable>,
}

impl SourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set, rejecting two candidates with the same qualified name.
    pub fn from_executables(
        executables: impl IntoIterator<Item = Executable>,
    ) -> Result<Self, CompileError> {
        let mut set = Self::new();
        for exec in executables {
            set.insert(exec)?;
        }
        Ok(set)
    }

    pub fn insert(&mut self, exec: Executable) -> Result<(), CompileError> {
        let name = exec.name().clone();
        if self.executables.contains_key(&name) {
            return Err(CompileError::DuplicateExecutable {
                name: name.to_string(),
            });
        }
        self.executables.insert(name, exec);
        Ok(())
    }

    pub fn get(&self, name: &QualifiedName) -> Option<&Executable> {
        self.executables.get(name)
    }

    pub fn len(&self) -> usize {
        self.executables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executables.is_empty()
    }
}

/// Outcome of resolving one root.
#[derive(Debug)]
pub struct Resolution<'a> {
    pub root: &'a Executable,

    /// Every reachable executable except the root, in discovery order
    pub dependencies: Vec<&'a Executable>,

    /// Distinct callables used as parallel-loop branch bodies
    pub branch_targets: BTreeSet<QualifiedName>,
}

/// Resolve the dependency closure of `root` against `candidates`.
pub fn resolve<'a>(
    root: &'a Executable,
    candidates: &'a SourceSet,
) -> Result<Resolution<'a>, CompileError> {
    let mut visited: FxHashSet<&QualifiedName> = FxHashSet::default();
    visited.insert(root.name());

    let mut queue: VecDeque<&Executable> = VecDeque::new();
    queue.push_back(root);

    let mut dependencies = Vec::new();
    let mut branch_targets = BTreeSet::new();

    while let Some(current) = queue.pop_front() {
        let Some(workflow) = current.workflow() else {
            continue;
        };

        for step in workflow.all_steps() {
            if step.parallel_loop.is_some() {
                branch_targets.insert(step.reference.clone());
            }
            if visited.contains(&step.reference) {
                continue;
            }

            let dep = candidates
                .get(&step.reference)
                .ok_or_else(|| CompileError::UnresolvedReference {
                    flow: current.name().to_string(),
                    step: step.name.clone(),
                    reference: step.reference.to_string(),
                })?;

            tracing::debug!(from = %current.name(), dependency = %dep.name(), "resolved dependency");
            visited.insert(dep.name());
            dependencies.push(dep);
            queue.push_back(dep);
        }
    }

    Ok(Resolution {
        root,
        dependencies,
        branch_targets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qn(s: &str) -> QualifiedName {
        s.parse().unwrap()
    }

    fn op(name: &str) -> Executable {
        Executable::Operation(Operation {
            name: qn(name),
            inputs: vec![],
            outputs: vec![],
            results: vec![],
            action: Action::Script {
                script: "pass".into(),
            },
        })
    }

    fn flow(name: &str, calls: &[&str]) -> Executable {
        let steps = calls
            .iter()
            .enumerate()
            .map(|(i, c)| Step::new(&format!("s{}", i), qn(c)))
            .collect();
        Executable::Flow(Flow {
            name: qn(name),
            inputs: vec![],
            outputs: vec![],
            workflow: Workflow::new(steps),
        })
    }

    fn names(resolution: &Resolution<'_>) -> Vec<String> {
        resolution
            .dependencies
            .iter()
            .map(|e| e.name().to_string())
            .collect()
    }

    #[test]
    fn test_resolve_transitive_closure() {
        let root = flow("app.main", &["app.sub", "app.op_a"]);
        let candidates = SourceSet::from_executables([
            flow("app.sub", &["app.op_b", "app.op_a"]),
            op("app.op_a"),
            op("app.op_b"),
            op("app.unused"),
        ])
        .unwrap();

        let resolution = resolve(&root, &candidates).unwrap();
        assert_eq!(names(&resolution), vec!["app.sub", "app.op_a", "app.op_b"]);
        assert!(resolution.branch_targets.is_empty());
        assert_eq!(resolution.root.name(), root.name());
    }

    #[test]
    fn test_unresolved_reference() {
        let root = flow("app.main", &["app.missing"]);
        let err = resolve(&root, &SourceSet::new()).unwrap_err();
        assert_eq!(
            err,
            CompileError::UnresolvedReference {
                flow: "app.main".into(),
                step: "s0".into(),
                reference: "app.missing".into(),
            }
        );
    }

    #[test]
    fn test_unresolved_reference_in_nested_flow() {
        let root = flow("app.main", &["app.sub"]);
        let candidates = SourceSet::from_executables([flow("app.sub", &["app.gone"])]).unwrap();
        let err = resolve(&root, &candidates).unwrap_err();
        assert!(matches!(err, CompileError::UnresolvedReference { ref flow, .. } if flow == "app.sub"));
    }

    #[test]
    fn test_self_recursion_is_allowed() {
        let root = flow("app.loop", &["app.loop"]);
        let candidates = SourceSet::new();
        let resolution = resolve(&root, &candidates).unwrap();
        assert!(resolution.dependencies.is_empty());
    }

    #[test]
    fn test_mutual_recursion_terminates() {
        let root = flow("app.a", &["app.b"]);
        let candidates =
            SourceSet::from_executables([flow("app.a", &["app.b"]), flow("app.b", &["app.a"])])
                .unwrap();
        let resolution = resolve(&root, &candidates).unwrap();
        assert_eq!(names(&resolution), vec!["app.b"]);
    }

    #[test]
    fn test_branch_targets_are_distinct() {
        let mut root = flow("app.main", &["app.branch", "app.branch"]);
        if let Executable::Flow(f) = &mut root {
            for step in &mut f.workflow.steps {
                step.parallel_loop = Some(ParallelLoopStatement {
                    var_name: "v".into(),
                    expression: "vs".into(),
                });
                step.is_async = true;
            }
        }
        let candidates = SourceSet::from_executables([op("app.branch")]).unwrap();
        let resolution = resolve(&root, &candidates).unwrap();
        assert_eq!(resolution.branch_targets.len(), 1);
        assert_eq!(names(&resolution), vec!["app.branch"]);
    }

    #[test]
    fn test_on_failure_reference_is_resolved() {
        let mut root = flow("app.main", &["app.op"]);
        if let Executable::Flow(f) = &mut root {
            f.workflow.on_failure = Some(Step::new("cleanup", qn("app.cleanup")));
        }
        let candidates = SourceSet::from_executables([op("app.op"), op("app.cleanup")]).unwrap();
        let resolution = resolve(&root, &candidates).unwrap();
        assert_eq!(names(&resolution), vec!["app.op", "app.cleanup"]);
    }

    #[test]
    fn test_operation_root_has_no_dependencies() {
        let root = op("app.op");
        let candidates = SourceSet::new();
        let resolution = resolve(&root, &candidates).unwrap();
        assert!(resolution.dependencies.is_empty());
    }

    #[test]
    fn test_duplicate_candidate_rejected() {
        let err = SourceSet::from_executables([op("app.op"), op("app.op")]).unwrap_err();
        assert_eq!(
            err,
            CompileError::DuplicateExecutable {
                name: "app.op".into()
            }
        );
    }
}
