//! Plan assembly: bundle the root plan and every dependency plan into one
//! artifact, then prove the bundle is closed.

use super::error::CompileError;
use super::types::*;
use std::collections::BTreeMap;

/// Assemble an artifact from a lowered root and its lowered dependencies.
///
/// Fails on a repeated dependency key, and on any instruction (in any plan)
/// that references a name which is neither a dependency key nor the root.
pub fn assemble(
    root: ExecutionPlan,
    dependencies: impl IntoIterator<Item = ExecutionPlan>,
) -> Result<CompilationArtifact, CompileError> {
    let mut map = BTreeMap::new();
    for plan in dependencies {
        if plan.plan_id == root.plan_id || map.contains_key(&plan.plan_id) {
            return Err(CompileError::DuplicateDependency {
                name: plan.plan_id,
            });
        }
        map.insert(plan.plan_id.clone(), plan);
    }

    let artifact = CompilationArtifact {
        execution_plan: root,
        dependencies: map,
    };
    check_closure(&artifact)?;
    Ok(artifact)
}

/// Every referenced name must have a plan in the artifact.
pub fn check_closure(artifact: &CompilationArtifact) -> Result<(), CompileError> {
    for plan in artifact.plans() {
        for step in plan.steps.values() {
            for reference in step.references() {
                if artifact.plan(&reference).is_none() {
                    return Err(CompileError::IncompleteDependencyClosure {
                        plan: plan.plan_id.clone(),
                        step_id: step.step_id,
                        reference,
                    });
                }
            }
        }
    }
    Ok(())
}
